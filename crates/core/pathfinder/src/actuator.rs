//! The lane-change actuator.
//!
//! Converts abstract instructions into the physical command payloads
//! of the remote-control surface: a lateral shift becomes a lane
//! command with a fixed offset from the track center, a reverse
//! instruction becomes a negative-velocity speed command.

use anki_api::payloads::LaneChangeMessage;
use anki_api::payloads::LanePayload;
use anki_api::payloads::LaneShift;
use anki_api::payloads::SpeedPayload;
use anki_api::topics::ControlKind;
use anki_api::topics::RemoteControl;
use anki_api::topics::VehicleId;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::UnboundedSender;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

/// Lateral distance of one lane change, in track units
const LANE_OFFSET: f64 = 68.0;
const LANE_VELOCITY: i32 = 300;
const LANE_ACCELERATION: i32 = 300;
const REVERSE_VELOCITY: i32 = -100;

/// The lane actuator task.
pub struct LaneActuator {
    pub instructions: mpsc::UnboundedReceiver<Message>,
    pub output: UnboundedSender<Message>,
    pub shutdown: watch::Receiver<()>,
}

impl LaneActuator {
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(message) = self.instructions.recv() => {
                    self.on_instruction(&message).await;
                }
            }
        }
    }

    async fn on_instruction(&mut self, message: &Message) {
        let instruction: LaneChangeMessage = match message
            .payload_str()
            .map_err(anki_api::ProtocolError::from)
            .and_then(|payload| Ok(serde_json::from_str(payload)?))
        {
            Ok(instruction) => instruction,
            Err(err) => {
                warn!("Dropping instruction: {err}");
                return;
            }
        };
        let vehicle: VehicleId = match instruction.id.parse() {
            Ok(vehicle) => vehicle,
            Err(err) => {
                warn!("Dropping instruction: {err}");
                return;
            }
        };

        if !instruction.forward {
            // Reverse: back out of the current segment
            let topic = RemoteControl::vehicle_topic(&vehicle, ControlKind::Speed);
            let payload = SpeedPayload {
                velocity: REVERSE_VELOCITY,
                acceleration: LANE_ACCELERATION,
            };
            debug!("Reversing {vehicle}");
            self.send_json(&topic, &payload).await;
            return;
        }

        let offset_from_center = match instruction.lane_change {
            LaneShift::Left => -LANE_OFFSET,
            LaneShift::Right => LANE_OFFSET,
            LaneShift::None => return,
        };

        let topic = RemoteControl::vehicle_topic(&vehicle, ControlKind::Lane);
        let payload = LanePayload {
            velocity: LANE_VELOCITY,
            acceleration: LANE_ACCELERATION,
            offset: 0.0,
            offset_from_center,
        };
        debug!("Shifting {vehicle} {:?}", instruction.lane_change);
        self.send_json(&topic, &payload).await;
    }

    async fn send_json<T: Serialize>(&mut self, topic: &mqtt_bus::Topic, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => {
                if self.output.publish(Message::new(topic, bytes)).await.is_err() {
                    warn!("Bus connection closed, dropping command for {}", topic.name);
                }
            }
            Err(err) => warn!("Failed to encode command for {}: {err}", topic.name),
        }
    }
}
