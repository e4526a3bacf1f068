//! The discovery flow.
//!
//! 1. Ask the gateway to bridge the scan trigger: a
//!    `discoverSubscription` intent on the all-hosts intent topic.
//! 2. Publish `{"value": true}` on `RemoteControl/U/E/hosts/discover`.
//! 3. Collect `E/vehicle/discovered/{id}` events for a fixed window,
//!    deduplicating by id. Later scans may add vehicles, never remove.

use anki_api::payloads::DiscoverPayload;
use anki_api::payloads::VehicleDiscoveredEvent;
use anki_api::relay::await_bridge_ack;
use anki_api::relay::install_bridge;
use anki_api::relay::SubscriptionKind;
use anki_api::relay::BRIDGE_GRACE;
use anki_api::topics::ControlKind;
use anki_api::topics::Host;
use anki_api::topics::RemoteControl;
use anki_api::topics::Vehicle;
use anki_api::topics::VehicleId;
use anki_api::CallerId;
use anki_api::ProtocolError;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// A vehicle announced by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub host: Host,
    /// How long to collect discovered events after the scan trigger
    pub window: Duration,
    /// Bound on waiting for a bridge acknowledgement
    pub grace: Duration,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        DiscoverConfig {
            host: Host::default(),
            window: Duration::from_secs(2),
            grace: BRIDGE_GRACE,
        }
    }
}

/// Run one discovery scan and return the vehicles seen, by id.
///
/// `discovered_events` is the queue of `E/vehicle/discovered/+` events,
/// `dit_acks` the queue of the host's DIT statuses.
pub async fn discover_vehicles(
    output: &mut impl PubChannel,
    discovered_events: &mut mpsc::UnboundedReceiver<Message>,
    dit_acks: &mut mpsc::UnboundedReceiver<Message>,
    config: &DiscoverConfig,
) -> Result<Vec<VehicleRecord>, ProtocolError> {
    let discover_topic = RemoteControl::discover_topic();

    // The gateway must relay the scan trigger before it can see one
    install_bridge(
        output,
        &Host::intent_topic_all(),
        SubscriptionKind::Discover,
        &discover_topic,
    )
    .await?;
    if !await_bridge_ack(dit_acks, &discover_topic, config.grace).await {
        debug!("Discover bridge not acknowledged, proceeding after grace");
    }

    let scan = serde_json::to_vec(&DiscoverPayload { value: true })?;
    output.publish(Message::new(&discover_topic, scan)).await?;
    info!("Scan triggered on {}", discover_topic.name);

    let mut found: BTreeMap<VehicleId, VehicleRecord> = BTreeMap::new();
    let deadline = Instant::now() + config.window;
    loop {
        match timeout_at(deadline, discovered_events.recv()).await {
            Err(_) | Ok(None) => break,
            Ok(Some(message)) => {
                let Some(id) = VehicleId::from_discovered_topic(&message.topic) else {
                    debug!("Ignoring event on {}", message.topic.name);
                    continue;
                };
                let model = message
                    .payload_str()
                    .ok()
                    .and_then(|payload| VehicleDiscoveredEvent::from_wire(payload).ok())
                    .and_then(|event| event.value.model);
                info!("Vehicle found: {id}");
                found
                    .entry(id.clone())
                    .or_insert(VehicleRecord { id, model });
            }
        }
    }

    Ok(found.into_values().collect())
}

/// Install the five control bridges of a vehicle, so the
/// `RemoteControl/U/E/vehicles/{id}/...` topics reach it.
pub async fn register_vehicle(
    output: &mut impl PubChannel,
    dit_acks: &mut mpsc::UnboundedReceiver<Message>,
    vehicle_id: &VehicleId,
    caller: &CallerId,
    grace: Duration,
) -> Result<(), ProtocolError> {
    let vehicle = Vehicle::new(vehicle_id.clone());
    let intent_topic = vehicle.intent_topic(caller);

    for kind in ControlKind::ALL {
        let source = RemoteControl::vehicle_topic(vehicle_id, kind);
        install_bridge(output, &intent_topic, kind.into(), &source).await?;
        if !await_bridge_ack(dit_acks, &source, grace).await {
            warn!(
                "No acknowledgement for the {} bridge of {vehicle_id}, proceeding",
                kind.as_str()
            );
        }
    }
    Ok(())
}
