//! The canonical topic inventory.
//!
//! Topic fragments follow the gateway conventions: `I` for inbound
//! intents, `S` for statuses, `S/intended/...` for intent echoes,
//! `S/DIT/...` for the currently installed bridges, `E/...` for events.

use crate::relay::SubscriptionKind;
use crate::CallerId;
use crate::ProtocolError;
use mqtt_bus::Topic;
use mqtt_bus::TopicFilter;
use std::fmt;
use std::str::FromStr;

pub const HOSTS_TOPIC_BASE: &str = "Anki/Hosts/U";
pub const VEHICLES_TOPIC_BASE: &str = "Anki/Vehicles/U";

fn check_id(id: &str) -> Result<(), ProtocolError> {
    if id.is_empty() || id.contains(['/', '+', '#']) {
        return Err(ProtocolError::InvalidId { id: id.into() });
    }
    Ok(())
}

/// An Anki gateway host
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Host {
    id: String,
}

impl Host {
    pub fn new(id: &str) -> Result<Host, ProtocolError> {
        check_id(id)?;
        Ok(Host { id: id.into() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `Anki/Hosts/U/{hostID}/I/{callerID}`
    pub fn intent_topic(&self, caller: &CallerId) -> Topic {
        Topic::new_unchecked(&format!("{HOSTS_TOPIC_BASE}/{}/I/{caller}", self.id))
    }

    /// `Anki/Hosts/U/I`: an intent addressed to every host
    pub fn intent_topic_all() -> Topic {
        Topic::new_unchecked(&format!("{HOSTS_TOPIC_BASE}/I"))
    }

    /// `Anki/Hosts/U/{hostID}/E/scanning`
    pub fn scanning_event_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("{HOSTS_TOPIC_BASE}/{}/E/scanning", self.id))
    }

    /// `Anki/Hosts/U/{hostID}/E/vehicle/discovered/{vehicleID}`
    pub fn vehicle_discovered_topic(&self, vehicle: &VehicleId) -> Topic {
        Topic::new_unchecked(&format!(
            "{HOSTS_TOPIC_BASE}/{}/E/vehicle/discovered/{vehicle}",
            self.id
        ))
    }

    /// The discovered events of all the vehicles of this host
    pub fn vehicle_discovered_filter(&self) -> TopicFilter {
        TopicFilter::new_unchecked(&format!(
            "{HOSTS_TOPIC_BASE}/{}/E/vehicle/discovered/+",
            self.id
        ))
    }

    /// `Anki/Hosts/U/{hostID}/S/DIT/{kind}Subscription`
    pub fn dit_topic(&self, kind: SubscriptionKind) -> Topic {
        Topic::new_unchecked(&format!(
            "{HOSTS_TOPIC_BASE}/{}/S/DIT/{}",
            self.id,
            kind.type_str()
        ))
    }
}

impl Default for Host {
    fn default() -> Self {
        Host {
            id: "hyperdrive".into(),
        }
    }
}

/// The stable identifier a vehicle is discovered under
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the vehicle id from a `.../E/vehicle/discovered/{id}` topic.
    pub fn from_discovered_topic(topic: &Topic) -> Option<VehicleId> {
        let (prefix, id) = topic.name.rsplit_once('/')?;
        if !prefix.ends_with("/E/vehicle/discovered") {
            return None;
        }
        id.trim().parse().ok()
    }
}

impl FromStr for VehicleId {
    type Err = ProtocolError;

    fn from_str(id: &str) -> Result<VehicleId, ProtocolError> {
        check_id(id)?;
        Ok(VehicleId(id.into()))
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Topic factory for one vehicle
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Vehicle {
    id: VehicleId,
}

impl Vehicle {
    pub fn new(id: VehicleId) -> Vehicle {
        Vehicle { id }
    }

    pub fn id(&self) -> &VehicleId {
        &self.id
    }

    /// `Anki/Vehicles/U/{vehicleID}/I/{callerID}`
    pub fn intent_topic(&self, caller: &CallerId) -> Topic {
        Topic::new_unchecked(&format!("{VEHICLES_TOPIC_BASE}/{}/I/{caller}", self.id))
    }

    /// `Anki/Vehicles/U/I`: an intent addressed to every vehicle
    pub fn intent_topic_all() -> Topic {
        Topic::new_unchecked(&format!("{VEHICLES_TOPIC_BASE}/I"))
    }

    /// `Anki/Vehicles/U/{vehicleID}/E/track`: tile-crossing events
    pub fn track_event_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("{VEHICLES_TOPIC_BASE}/{}/E/track", self.id))
    }

    /// The tile-crossing events of any vehicle
    pub fn track_event_filter_any() -> TopicFilter {
        TopicFilter::new_unchecked(&format!("{VEHICLES_TOPIC_BASE}/+/E/track"))
    }

    /// Extract the vehicle id from a `Anki/Vehicles/U/{id}/E/track` topic.
    pub fn id_from_track_topic(topic: &Topic) -> Option<VehicleId> {
        let suffix = topic.name.strip_prefix(VEHICLES_TOPIC_BASE)?;
        let id = suffix.strip_prefix('/')?.strip_suffix("/E/track")?;
        id.parse().ok()
    }

    /// `Anki/Vehicles/U/{vehicleID}/S/DIT/{kind}Subscription`
    pub fn dit_topic(&self, kind: SubscriptionKind) -> Topic {
        Topic::new_unchecked(&format!(
            "{VEHICLES_TOPIC_BASE}/{}/S/DIT/{}",
            self.id,
            kind.type_str()
        ))
    }

    /// `Anki/Vehicles/U/{vehicleID}/S/intended/{kind}`
    pub fn intended_topic(&self, kind: ControlKind) -> Topic {
        Topic::new_unchecked(&format!(
            "{VEHICLES_TOPIC_BASE}/{}/S/intended/{}",
            self.id,
            kind.as_str()
        ))
    }
}

/// The per-vehicle control channels of the remote controller
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ControlKind {
    Connect,
    Speed,
    Lane,
    CancelLane,
    Lights,
}

impl ControlKind {
    pub const ALL: [ControlKind; 5] = [
        ControlKind::Connect,
        ControlKind::Speed,
        ControlKind::Lane,
        ControlKind::CancelLane,
        ControlKind::Lights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Connect => "connect",
            ControlKind::Speed => "speed",
            ControlKind::Lane => "lane",
            ControlKind::CancelLane => "cancelLane",
            ControlKind::Lights => "lights",
        }
    }
}

impl FromStr for ControlKind {
    type Err = ProtocolError;

    fn from_str(kind: &str) -> Result<ControlKind, ProtocolError> {
        match kind {
            "connect" => Ok(ControlKind::Connect),
            "speed" => Ok(ControlKind::Speed),
            "lane" => Ok(ControlKind::Lane),
            "cancelLane" => Ok(ControlKind::CancelLane),
            "lights" => Ok(ControlKind::Lights),
            _ => Err(ProtocolError::InvalidId { id: kind.into() }),
        }
    }
}

/// Topic factory of the remote controller surface
pub struct RemoteControl;

impl RemoteControl {
    const BASE: &'static str = "RemoteControl/U/E";

    /// `RemoteControl/U/E/hosts/discover`: scan trigger
    pub fn discover_topic() -> Topic {
        Topic::new_unchecked(&format!("{}/hosts/discover", Self::BASE))
    }

    /// `RemoteControl/U/E/vehicles/{vehicleID}/{kind}`
    pub fn vehicle_topic(vehicle: &VehicleId, kind: ControlKind) -> Topic {
        Topic::new_unchecked(&format!(
            "{}/vehicles/{vehicle}/{}",
            Self::BASE,
            kind.as_str()
        ))
    }

    /// Everything published under the remote-control surface
    pub fn wildcard() -> TopicFilter {
        TopicFilter::new_unchecked("RemoteControl/#")
    }

    /// Recognize a `RemoteControl/U/E/vehicles/{id}/{kind}` topic.
    pub fn parse_vehicle_topic(topic: &Topic) -> Option<(VehicleId, ControlKind)> {
        let suffix = topic.name.strip_prefix("RemoteControl/U/E/vehicles/")?;
        let (id, kind) = suffix.split_once('/')?;
        Some((id.parse().ok()?, kind.parse().ok()?))
    }
}

/// Topic factory of the emergency mediator
pub struct Emergency;

impl Emergency {
    /// `Emergency/U/E/stop`: the override stop channel
    pub fn stop_topic() -> Topic {
        Topic::new_unchecked("Emergency/U/E/stop")
    }

    /// `Emergency/U/I/arm`: arming intents from the operator surface
    pub fn arm_topic() -> Topic {
        Topic::new_unchecked("Emergency/U/I/arm")
    }

    /// `Emergency/U/E/mediate/{source topic}`
    pub fn mediate_topic(source: &Topic) -> Topic {
        Topic::new_unchecked(&format!("Emergency/U/E/mediate/{}", source.name))
    }
}

/// Topic factory of the pathfinder namespace
///
/// The namespace isolates one pathfinder instance and its UI from
/// everything else on the bus.
#[derive(Debug, Clone)]
pub struct PathfindTopics {
    ns: String,
}

impl PathfindTopics {
    pub fn new(ns: &str) -> Result<PathfindTopics, ProtocolError> {
        check_id(ns)?;
        Ok(PathfindTopics { ns: ns.into() })
    }

    /// `/{ns}/vehicle/id`: UI designates the vehicle to track
    pub fn vehicle_id_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/id", self.ns))
    }

    /// `/{ns}/vehicle/target`: UI designates the destination tile
    pub fn target_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/target", self.ns))
    }

    /// `/{ns}/vehicle/position`: best-guess position node
    pub fn position_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/position", self.ns))
    }

    /// `/{ns}/vehicle/absolute-position`: tile id of a confirmed observation
    pub fn absolute_position_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/absolute-position", self.ns))
    }

    /// `/{ns}/vehicle/prediction`: tile id of a predicted position
    pub fn prediction_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/prediction", self.ns))
    }

    /// `/{ns}/graph/nextStep`: planner to turn decider
    pub fn next_step_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/graph/nextStep", self.ns))
    }

    /// `/{ns}/graph/arrived`: planner to UI
    pub fn arrived_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/graph/arrived", self.ns))
    }

    /// `/{ns}/vehicle/instruction`: turn decider to lane actuator
    pub fn instruction_topic(&self) -> Topic {
        Topic::new_unchecked(&format!("/{}/vehicle/instruction", self.ns))
    }
}

impl Default for PathfindTopics {
    fn default() -> Self {
        PathfindTopics {
            ns: "hyperdrive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> CallerId {
        CallerId::new("2af1")
    }

    #[test]
    fn host_topics() {
        let host = Host::default();
        assert_eq!(
            host.intent_topic(&caller()).name,
            "Anki/Hosts/U/hyperdrive/I/2af1"
        );
        assert_eq!(Host::intent_topic_all().name, "Anki/Hosts/U/I");
        assert_eq!(
            host.vehicle_discovered_filter().patterns,
            vec!["Anki/Hosts/U/hyperdrive/E/vehicle/discovered/+"]
        );
        assert_eq!(
            host.dit_topic(SubscriptionKind::Discover).name,
            "Anki/Hosts/U/hyperdrive/S/DIT/discoverSubscription"
        );
        assert_eq!(
            host.scanning_event_topic().name,
            "Anki/Hosts/U/hyperdrive/E/scanning"
        );
    }

    #[test]
    fn vehicle_topics() {
        let vehicle = Vehicle::new("DD17".parse().unwrap());
        assert_eq!(
            vehicle.intent_topic(&caller()).name,
            "Anki/Vehicles/U/DD17/I/2af1"
        );
        assert_eq!(Vehicle::intent_topic_all().name, "Anki/Vehicles/U/I");
        assert_eq!(
            vehicle.track_event_topic().name,
            "Anki/Vehicles/U/DD17/E/track"
        );
        assert_eq!(
            vehicle.dit_topic(SubscriptionKind::Speed).name,
            "Anki/Vehicles/U/DD17/S/DIT/speedSubscription"
        );
        assert_eq!(
            vehicle.intended_topic(ControlKind::CancelLane).name,
            "Anki/Vehicles/U/DD17/S/intended/cancelLane"
        );
    }

    #[test]
    fn vehicle_id_from_topics() {
        let topic = Topic::new_unchecked("Anki/Hosts/U/hyperdrive/E/vehicle/discovered/DD17");
        assert_eq!(
            VehicleId::from_discovered_topic(&topic),
            Some("DD17".parse().unwrap())
        );

        let topic = Topic::new_unchecked("Anki/Vehicles/U/DD17/E/track");
        assert_eq!(
            Vehicle::id_from_track_topic(&topic),
            Some("DD17".parse().unwrap())
        );

        let unrelated = Topic::new_unchecked("Anki/Hosts/U/hyperdrive/E/scanning");
        assert_eq!(VehicleId::from_discovered_topic(&unrelated), None);
    }

    #[test]
    fn remote_control_topics() {
        let vid: VehicleId = "DD17".parse().unwrap();
        assert_eq!(
            RemoteControl::vehicle_topic(&vid, ControlKind::CancelLane).name,
            "RemoteControl/U/E/vehicles/DD17/cancelLane"
        );
        assert_eq!(
            RemoteControl::parse_vehicle_topic(&Topic::new_unchecked(
                "RemoteControl/U/E/vehicles/DD17/speed"
            )),
            Some((vid, ControlKind::Speed))
        );
        assert_eq!(
            RemoteControl::parse_vehicle_topic(&Topic::new_unchecked(
                "RemoteControl/U/E/hosts/discover"
            )),
            None
        );
    }

    #[test]
    fn mediate_topic_prefixes_the_source() {
        let source = Topic::new_unchecked("RemoteControl/U/E/vehicles/DD17/speed");
        assert_eq!(
            Emergency::mediate_topic(&source).name,
            "Emergency/U/E/mediate/RemoteControl/U/E/vehicles/DD17/speed"
        );
    }

    #[test]
    fn pathfind_topics_are_namespaced() {
        let topics = PathfindTopics::new("trackA").unwrap();
        assert_eq!(topics.position_topic().name, "/trackA/vehicle/position");
        assert_eq!(topics.next_step_topic().name, "/trackA/graph/nextStep");
        assert_eq!(
            topics.absolute_position_topic().name,
            "/trackA/vehicle/absolute-position"
        );
    }

    #[test]
    fn ids_are_validated() {
        assert!("DD17".parse::<VehicleId>().is_ok());
        assert!("".parse::<VehicleId>().is_err());
        assert!("a/b".parse::<VehicleId>().is_err());
        assert!("#".parse::<VehicleId>().is_err());
    }
}
