//! The MQTT contract of the hyperdrive control plane.
//!
//! This crate defines the three faces of the bus:
//!
//! * [`topics`]: the canonical topic inventory of the Anki gateway
//!   (`Anki/Hosts/U/...`, `Anki/Vehicles/U/...`), of the remote
//!   controller (`RemoteControl/U/E/...`), of the emergency mediator
//!   (`Emergency/U/...`) and of the pathfinder namespace
//!   (`/{ns}/vehicle/...`, `/{ns}/graph/...`);
//! * [`payloads`]: the JSON payloads exchanged on those topics;
//! * [`relay`]: the subscription-relay protocol instructing the
//!   gateway to bridge a source topic onto an intent topic.
#![forbid(unsafe_code)]

mod caller;
pub mod payloads;
pub mod relay;
pub mod topics;

pub use caller::CallerId;

/// A payload received on the bus does not conform to the contract.
///
/// Protocol errors are never fatal: the offending message is logged
/// and dropped, and the system carries on.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Empty track event batch")]
    EmptyTrackEvent,

    #[error("Invalid identifier {id:?}: must be non-empty without '/', '+' nor '#'")]
    InvalidId { id: String },

    #[error(transparent)]
    InvalidPayloadEncoding(#[from] mqtt_bus::BusError),
}
