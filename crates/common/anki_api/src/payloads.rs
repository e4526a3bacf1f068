//! JSON payloads exchanged on the bus.
//!
//! Key order is irrelevant on the wire and unknown fields are ignored,
//! so older gateways and newer UIs can talk to the same broker.

use crate::ProtocolError;
use serde::Deserialize;
use serde::Serialize;

/// `{"velocity": -100..1000, "acceleration": 0..2000}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedPayload {
    pub velocity: i32,
    pub acceleration: i32,
}

impl SpeedPayload {
    /// The override published on `Emergency/U/E/stop`: full stop,
    /// braking as hard as the firmware accepts.
    pub const STOP: SpeedPayload = SpeedPayload {
        velocity: 0,
        acceleration: 1000,
    };
}

/// `{"velocity", "acceleration", "offset", "offsetFromCenter"}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanePayload {
    pub velocity: i32,
    pub acceleration: i32,
    pub offset: f64,
    pub offset_from_center: f64,
}

/// `{"value": true}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelLanePayload {
    pub value: bool,
}

/// `{"value": true|false}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub value: bool,
}

/// `{"value": true|false}`: trigger or end a vehicle scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverPayload {
    pub value: bool,
}

/// `{"value": true|false}`: arm or disarm the emergency mediator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmPayload {
    pub value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightEffectKind {
    #[default]
    Off,
    Steady,
    Fade,
    Pulse,
    Flash,
    Strobe,
}

/// One light channel: effect plus its 0..15 ramp and 0..255 frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LightEffect {
    pub effect: LightEffectKind,
    pub start: u8,
    pub end: u8,
    pub frequency: u8,
}

impl LightEffect {
    pub fn steady(start: u8, end: u8) -> LightEffect {
        LightEffect {
            effect: LightEffectKind::Steady,
            start,
            end,
            frequency: 0,
        }
    }
}

/// The six light channels of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LightsPayload {
    pub front_green: LightEffect,
    pub front_red: LightEffect,
    pub tail: LightEffect,
    pub engine_red: LightEffect,
    pub engine_green: LightEffect,
    pub engine_blue: LightEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

/// The value of one tile-crossing report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEventValue {
    #[serde(rename = "trackID")]
    pub track_id: i32,
    #[serde(rename = "trackLocation")]
    pub track_location: i32,
    pub direction: Direction,
}

/// One tile-crossing event, as reported by a vehicle
///
/// On the wire the vehicle publishes an *array* of events; only the
/// first element matters for tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEvent {
    #[serde(default)]
    pub timestamp: u64,
    pub value: TrackEventValue,
}

impl TrackEvent {
    /// Decode the array-wrapped wire form, keeping the first event.
    pub fn from_wire(payload: &str) -> Result<TrackEvent, ProtocolError> {
        let mut batch: Vec<TrackEvent> = serde_json::from_str(payload)?;
        if batch.is_empty() {
            return Err(ProtocolError::EmptyTrackEvent);
        }
        Ok(batch.remove(0))
    }
}

/// `Anki/Hosts/U/{host}/E/vehicle/discovered/{id}` payload
///
/// Gateways disagree on the exact shape, so every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VehicleDiscoveredEvent {
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub value: DiscoveredValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoveredValue {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

impl VehicleDiscoveredEvent {
    /// Decode a discovered event; gateways publish either a bare
    /// object or a one-element array.
    pub fn from_wire(payload: &str) -> Result<VehicleDiscoveredEvent, ProtocolError> {
        if let Ok(event) = serde_json::from_str::<VehicleDiscoveredEvent>(payload) {
            return Ok(event);
        }
        let mut batch: Vec<VehicleDiscoveredEvent> = serde_json::from_str(payload)?;
        match batch.is_empty() {
            true => Ok(VehicleDiscoveredEvent::default()),
            false => Ok(batch.remove(0)),
        }
    }
}

/// `{"id": int}`: a tile, for targets and absolute positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePayload {
    pub id: i32,
}

/// `{"id": "TT.shape.segment"}`: a position node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPayload {
    pub id: String,
}

/// `{"id": string}`: the vehicle the pathfinder should track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleIdPayload {
    pub id: String,
}

/// `{"next_step": "TT.shape.segment"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStepPayload {
    pub next_step: String,
}

/// `{"arrived": true}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivedPayload {
    pub arrived: bool,
}

/// Which way the vehicle should shift, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LaneShift {
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[serde(rename = "")]
    #[default]
    None,
}

/// The turn decider's instruction to the lane actuator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneChangeMessage {
    #[serde(rename = "ID")]
    pub id: String,
    pub lane_change: LaneShift,
    pub forward: bool,
}
