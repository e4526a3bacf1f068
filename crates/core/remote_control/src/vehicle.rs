//! The typed control surface of one vehicle.
//!
//! Every method maps to a payload on the matching
//! `RemoteControl/U/E/vehicles/{id}/{kind}` topic. Values are clamped
//! to the ranges the firmware accepts.

use anki_api::payloads::CancelLanePayload;
use anki_api::payloads::ConnectPayload;
use anki_api::payloads::LanePayload;
use anki_api::payloads::LightsPayload;
use anki_api::payloads::SpeedPayload;
use anki_api::topics::ControlKind;
use anki_api::topics::RemoteControl;
use anki_api::topics::VehicleId;
use anki_api::ProtocolError;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::QoS;
use mqtt_bus::UnboundedSender;
use serde::Serialize;
use tracing::debug;

pub const VELOCITY_RANGE: std::ops::RangeInclusive<i32> = -100..=1000;
pub const ACCELERATION_RANGE: std::ops::RangeInclusive<i32> = 0..=2000;
pub const OFFSET_RANGE: std::ops::RangeInclusive<f64> = -100.0..=100.0;

/// A per-vehicle publisher bound to the bus
#[derive(Clone)]
pub struct VehicleHandle {
    vehicle: VehicleId,
    qos: QoS,
    output: UnboundedSender<Message>,
}

impl VehicleHandle {
    pub fn new(vehicle: VehicleId, output: UnboundedSender<Message>) -> VehicleHandle {
        VehicleHandle {
            vehicle,
            qos: QoS::AtLeastOnce,
            output,
        }
    }

    pub fn with_qos(self, qos: QoS) -> Self {
        Self { qos, ..self }
    }

    pub fn id(&self) -> &VehicleId {
        &self.vehicle
    }

    /// Connect or disconnect the vehicle radio
    pub async fn connect(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.send(ControlKind::Connect, &ConnectPayload { value })
            .await
    }

    /// Set the forward velocity and how hard to reach it
    pub async fn speed(&mut self, velocity: i32, acceleration: i32) -> Result<(), ProtocolError> {
        let payload = SpeedPayload {
            velocity: clamp(velocity, VELOCITY_RANGE),
            acceleration: clamp(acceleration, ACCELERATION_RANGE),
        };
        self.send(ControlKind::Speed, &payload).await
    }

    /// Shift towards an offset from the track center
    pub async fn lane(
        &mut self,
        velocity: i32,
        acceleration: i32,
        offset: f64,
        offset_from_center: f64,
    ) -> Result<(), ProtocolError> {
        let payload = LanePayload {
            velocity: clamp(velocity, VELOCITY_RANGE),
            acceleration: clamp(acceleration, ACCELERATION_RANGE),
            offset: clamp(offset, OFFSET_RANGE),
            offset_from_center: clamp(offset_from_center, OFFSET_RANGE),
        };
        self.send(ControlKind::Lane, &payload).await
    }

    /// Abort the lane change in progress
    pub async fn cancel_lane(&mut self) -> Result<(), ProtocolError> {
        self.send(ControlKind::CancelLane, &CancelLanePayload { value: true })
            .await
    }

    /// Drive the six light channels
    pub async fn lights(&mut self, lights: LightsPayload) -> Result<(), ProtocolError> {
        self.send(ControlKind::Lights, &lights).await
    }

    async fn send<T: Serialize>(
        &mut self,
        kind: ControlKind,
        payload: &T,
    ) -> Result<(), ProtocolError> {
        let topic = RemoteControl::vehicle_topic(&self.vehicle, kind);
        let bytes = serde_json::to_vec(payload)?;
        debug!("Sending {} on {}", kind.as_str(), topic.name);
        self.output
            .publish(Message::new(&topic, bytes).with_qos(self.qos))
            .await?;
        Ok(())
    }
}

fn clamp<T: PartialOrd + Copy>(value: T, range: std::ops::RangeInclusive<T>) -> T {
    if value < *range.start() {
        *range.start()
    } else if value > *range.end() {
        *range.end()
    } else {
        value
    }
}
