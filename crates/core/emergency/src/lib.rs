//! The emergency mediator.
//!
//! The mediator sits between the remote-control surface and the
//! gateway's vehicle intent topics. Disarmed, it mirrors every message
//! published under `RemoteControl/#` onto the matching
//! `Emergency/U/E/mediate/...` topic, which the gateway bridges to the
//! vehicles. Armed, the mirror goes silent and a single stop override
//! is published on `Emergency/U/E/stop`, a topic every vehicle is
//! bridged to as soon as it is first seen, so the stop always lands.
//!
//! Arming and disarming come in as `{"value": bool}` intents on
//! `Emergency/U/I/arm`.
#![forbid(unsafe_code)]

use anki_api::payloads::ArmPayload;
use anki_api::relay::install_bridge;
use anki_api::relay::SubscriptionKind;
use anki_api::topics::ControlKind;
use anki_api::topics::Emergency;
use anki_api::topics::RemoteControl;
use anki_api::topics::Vehicle;
use anki_api::topics::VehicleId;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::QoS;
use mqtt_bus::StreamExt;
use mqtt_bus::Topic;
use mqtt_bus::TopicFilter;
use mqtt_bus::UnboundedReceiver;
use mqtt_bus::UnboundedSender;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// The topics a mediator instance has to subscribe to: the whole
/// remote-control surface, the arming intents, and the gateway's
/// bridge acknowledgements.
pub fn subscriptions() -> TopicFilter {
    let mut filter = RemoteControl::wildcard();
    filter.add_unchecked(&Emergency::arm_topic().name);
    filter.add_unchecked("Anki/Vehicles/U/+/S/DIT/+");
    filter
}

/// A bridge freshly requested from the gateway: mirrored messages are
/// buffered until the gateway acknowledges the bridge on its DIT
/// status, or until the grace deadline passes.
struct PendingBridge {
    deadline: Instant,
    messages: Vec<Message>,
}

/// The mediator task.
pub struct Mediator {
    pub caller: anki_api::CallerId,
    pub qos: QoS,
    pub grace: Duration,
    pub received: UnboundedReceiver<Message>,
    pub output: UnboundedSender<Message>,
    pub shutdown: watch::Receiver<()>,
}

impl Mediator {
    pub async fn run(mut self) {
        let mut armed = false;
        let mut stop_bridged: HashSet<VehicleId> = HashSet::new();
        let mut mediate_bridged: HashSet<(VehicleId, ControlKind)> = HashSet::new();
        let mut pending: HashMap<String, PendingBridge> = HashMap::new();

        loop {
            let deadline = pending
                .values()
                .map(|bridge| bridge.deadline)
                .min()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(message) = self.received.next() => {
                    self.on_message(
                        message,
                        &mut armed,
                        &mut stop_bridged,
                        &mut mediate_bridged,
                        &mut pending,
                    )
                    .await;
                }

                _ = sleep_until(deadline), if !pending.is_empty() => {
                    self.flush_expired(&mut pending, armed).await;
                }
            }
        }
    }

    async fn on_message(
        &mut self,
        message: Message,
        armed: &mut bool,
        stop_bridged: &mut HashSet<VehicleId>,
        mediate_bridged: &mut HashSet<(VehicleId, ControlKind)>,
        pending: &mut HashMap<String, PendingBridge>,
    ) {
        if message.topic == Emergency::arm_topic() {
            self.on_arm(&message, armed, pending).await;
        } else if message.topic.name.contains("/S/DIT/") {
            self.on_bridge_ack(&message, pending, *armed).await;
        } else if RemoteControl::wildcard().accept(&message) {
            self.on_remote_message(message, *armed, stop_bridged, mediate_bridged, pending)
                .await;
        }
    }

    /// Arm or disarm. Arming publishes the stop override exactly once
    /// per false-to-true edge and silences the mirror, dropping
    /// anything still buffered.
    async fn on_arm(
        &mut self,
        message: &Message,
        armed: &mut bool,
        pending: &mut HashMap<String, PendingBridge>,
    ) {
        let value = match message
            .payload_str()
            .ok()
            .and_then(|payload| serde_json::from_str::<ArmPayload>(payload).ok())
        {
            Some(ArmPayload { value }) => value,
            None => {
                warn!("Dropping malformed arm intent");
                return;
            }
        };

        let was_armed = std::mem::replace(armed, value);
        if value && !was_armed {
            self.publish_stop().await;
            for bridge in pending.values_mut() {
                bridge.messages.clear();
            }
            info!("Emergency stop ARMED, mirror silenced");
        } else if !value && was_armed {
            info!("Emergency stop disarmed, mirror resumed");
        }
    }

    async fn publish_stop(&mut self) {
        // The stop path has no failure mode: topic and payload are
        // static, the channel to the sender task never blocks.
        let stop = Message::new(&Emergency::stop_topic(), stop_payload()).with_qos(self.qos);
        if self.output.publish(stop).await.is_err() {
            warn!("Bus connection closed, the stop override could not be sent");
        }
    }

    /// A message from the remote-control surface: mirror it, unless armed.
    async fn on_remote_message(
        &mut self,
        message: Message,
        armed: bool,
        stop_bridged: &mut HashSet<VehicleId>,
        mediate_bridged: &mut HashSet<(VehicleId, ControlKind)>,
        pending: &mut HashMap<String, PendingBridge>,
    ) {
        if armed {
            debug!("STOP active, ignoring remote message on {}", message.topic.name);
            return;
        }

        let mediate_topic = Emergency::mediate_topic(&message.topic);

        if let Some((vehicle_id, kind)) = RemoteControl::parse_vehicle_topic(&message.topic) {
            let vehicle = Vehicle::new(vehicle_id.clone());
            let intent_topic = vehicle.intent_topic(&self.caller);

            if stop_bridged.insert(vehicle_id.clone()) {
                // Every vehicle is wired to the stop override the
                // moment it first shows up on the surface.
                self.install(&intent_topic, SubscriptionKind::Speed, &Emergency::stop_topic())
                    .await;
            }

            if mediate_bridged.insert((vehicle_id, kind)) {
                self.install(&intent_topic, kind.into(), &mediate_topic).await;
                pending.insert(
                    mediate_topic.name.clone(),
                    PendingBridge {
                        deadline: Instant::now() + self.grace,
                        messages: vec![mirror(&message, &mediate_topic, self.qos)],
                    },
                );
                return;
            }
        }

        match pending.get_mut(&mediate_topic.name) {
            Some(bridge) => bridge.messages.push(mirror(&message, &mediate_topic, self.qos)),
            None => {
                if self
                    .output
                    .publish(mirror(&message, &mediate_topic, self.qos))
                    .await
                    .is_err()
                {
                    warn!("Bus connection closed, dropping mirrored message");
                } else {
                    debug!("Forwarded {} -> {}", message.topic.name, mediate_topic.name);
                }
            }
        }
    }

    /// A DIT status from the gateway: flush every pending bridge it lists.
    async fn on_bridge_ack(
        &mut self,
        message: &Message,
        pending: &mut HashMap<String, PendingBridge>,
        armed: bool,
    ) {
        let Ok(listing) = message.payload_str() else {
            return;
        };
        let acked: Vec<String> = pending
            .keys()
            .filter(|topic| listing.contains(*topic))
            .cloned()
            .collect();
        for topic in acked {
            if let Some(bridge) = pending.remove(&topic) {
                debug!("Bridge for {topic} acknowledged");
                self.flush(bridge, armed).await;
            }
        }
    }

    async fn flush_expired(&mut self, pending: &mut HashMap<String, PendingBridge>, armed: bool) {
        let now = Instant::now();
        let expired: Vec<String> = pending
            .iter()
            .filter(|(_, bridge)| bridge.deadline <= now)
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in expired {
            if let Some(bridge) = pending.remove(&topic) {
                debug!("Bridge for {topic} not acknowledged, proceeding after grace");
                self.flush(bridge, armed).await;
            }
        }
    }

    async fn flush(&mut self, bridge: PendingBridge, armed: bool) {
        if armed {
            return;
        }
        for message in bridge.messages {
            if self.output.publish(message).await.is_err() {
                warn!("Bus connection closed, dropping mirrored message");
            }
        }
    }

    async fn install(&mut self, intent_topic: &Topic, kind: SubscriptionKind, source: &Topic) {
        if let Err(err) = install_bridge(&mut self.output, intent_topic, kind, source).await {
            warn!("Could not request a {} bridge: {err}", kind.type_str());
        }
    }
}

/// The stop override on the wire, fixed at compile time so the stop
/// path cannot fail to encode.
pub const STOP_PAYLOAD: &[u8] = br#"{"velocity":0,"acceleration":1000}"#;

fn stop_payload() -> Vec<u8> {
    STOP_PAYLOAD.to_vec()
}

fn mirror(message: &Message, mediate_topic: &Topic, qos: QoS) -> Message {
    // The payload bytes are relayed unchanged
    Message::new(mediate_topic, message.payload.clone()).with_qos(qos)
}
