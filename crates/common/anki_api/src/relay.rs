//! The subscription-relay protocol.
//!
//! The gateway does not let arbitrary topics reach a vehicle: a caller
//! first publishes a `<kind>Subscription` intent asking the gateway to
//! bridge a source topic onto the vehicle's (or host's) intent topic.
//! The gateway acknowledges on the matching `S/DIT/<kind>Subscription`
//! status, listing the source topics currently bridged.
//!
//! A successful publish of the intent is *not* proof the bridge is
//! installed. Callers that need ordering wait for the DIT status, and
//! fall back to a bounded grace period when no acknowledgement comes.

use crate::topics::ControlKind;
use crate::ProtocolError;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::Topic;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout_at;
use tokio::time::Instant;

/// How long to wait for a DIT acknowledgement before trusting the bridge anyway
pub const BRIDGE_GRACE: Duration = Duration::from_secs(1);

/// The bridge kinds the gateway understands
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SubscriptionKind {
    Connect,
    Speed,
    Lane,
    CancelLane,
    Lights,
    Discover,
}

impl SubscriptionKind {
    /// The `type` discriminator on the wire
    pub fn type_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Connect => "connectSubscription",
            SubscriptionKind::Speed => "speedSubscription",
            SubscriptionKind::Lane => "laneSubscription",
            SubscriptionKind::CancelLane => "cancelLaneSubscription",
            SubscriptionKind::Lights => "lightsSubscription",
            SubscriptionKind::Discover => "discoverSubscription",
        }
    }
}

impl From<ControlKind> for SubscriptionKind {
    fn from(kind: ControlKind) -> Self {
        match kind {
            ControlKind::Connect => SubscriptionKind::Connect,
            ControlKind::Speed => SubscriptionKind::Speed,
            ControlKind::Lane => SubscriptionKind::Lane,
            ControlKind::CancelLane => SubscriptionKind::CancelLane,
            ControlKind::Lights => SubscriptionKind::Lights,
        }
    }
}

/// The `{type, payload}` envelope of every gateway intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent<P> {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: P,
}

/// `{"topic": "<filter>", "subscribe": true|false}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionIntent {
    pub topic: String,
    pub subscribe: bool,
}

/// Ask the gateway to bridge `source` onto `intent_topic`.
pub async fn install_bridge(
    output: &mut impl PubChannel,
    intent_topic: &Topic,
    kind: SubscriptionKind,
    source: &Topic,
) -> Result<(), ProtocolError> {
    let intent = Intent {
        kind: kind.type_str().to_string(),
        payload: SubscriptionIntent {
            topic: source.name.clone(),
            subscribe: true,
        },
    };
    let payload = serde_json::to_vec(&intent)?;
    output.publish(Message::new(intent_topic, payload)).await?;
    Ok(())
}

/// Wait until the gateway lists `source` among the active bridges.
///
/// `dit_messages` is a queue of `S/DIT/...` statuses for the bridge
/// being installed. Returns `true` on acknowledgement; `false` when the
/// grace period expires, in which case the caller proceeds anyway (the
/// sleep itself is the fallback bound).
pub async fn await_bridge_ack(
    dit_messages: &mut mpsc::UnboundedReceiver<Message>,
    source: &Topic,
    grace: Duration,
) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match timeout_at(deadline, dit_messages.recv()).await {
            Ok(Some(message)) => {
                let acked = message
                    .payload_str()
                    .map(|listing| listing.contains(&source.name))
                    .unwrap_or(false);
                if acked {
                    return true;
                }
            }
            Ok(None) | Err(_) => return false,
        }
    }
}
