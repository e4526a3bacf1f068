//! The turn decider.
//!
//! Converts the planner's "next graph node" into a lane-change
//! instruction for the actuator. A lateral command is only meaningful
//! when the next step stays on the current tile: crossing to another
//! tile is just driving forward.

use crate::position::PositionNode;
use anki_api::payloads::LaneChangeMessage;
use anki_api::payloads::LaneShift;
use anki_api::payloads::NextStepPayload;
use anki_api::payloads::PositionPayload;
use anki_api::payloads::VehicleIdPayload;
use anki_api::topics::PathfindTopics;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::UnboundedSender;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

fn is_upper(segment: &str) -> bool {
    segment == "top" || segment == "high"
}

fn is_lower(segment: &str) -> bool {
    segment == "bottom"
}

/// The lateral command taking `current` to `next`, if any.
///
/// Shifting from the bottom segment to a top one is a right turn, the
/// opposite a left turn. Anything else, including every transition to
/// another tile, keeps the vehicle in its lane.
pub fn lateral_shift(current: &PositionNode, next: &PositionNode) -> LaneShift {
    if !current.same_tile(next) {
        return LaneShift::None;
    }
    if is_lower(current.segment()) && is_upper(next.segment()) {
        LaneShift::Right
    } else if is_upper(current.segment()) && is_lower(next.segment()) {
        LaneShift::Left
    } else {
        LaneShift::None
    }
}

/// The turn decider task.
pub struct TurnDecider {
    pub topics: PathfindTopics,
    pub vehicle_ids: mpsc::UnboundedReceiver<Message>,
    pub next_steps: mpsc::UnboundedReceiver<Message>,
    pub positions: mpsc::UnboundedReceiver<Message>,
    pub output: UnboundedSender<Message>,
    pub shutdown: watch::Receiver<()>,
}

impl TurnDecider {
    pub async fn run(mut self) {
        let mut vehicle: Option<String> = None;
        let mut current: Option<PositionNode> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(message) = self.vehicle_ids.recv() => {
                    if let Some(id) = decode_json::<VehicleIdPayload>(&message) {
                        vehicle = Some(id.id);
                    }
                }

                Some(message) = self.positions.recv() => {
                    if let Some(position) = decode_json::<PositionPayload>(&message) {
                        current = Some(PositionNode::new(position.id));
                    }
                }

                Some(message) = self.next_steps.recv() => {
                    if let Some(step) = decode_json::<NextStepPayload>(&message) {
                        self.decide(&vehicle, &current, &step.next_step).await;
                    }
                }
            }
        }
    }

    async fn decide(
        &mut self,
        vehicle: &Option<String>,
        current: &Option<PositionNode>,
        next_step: &str,
    ) {
        let (Some(vehicle), Some(current)) = (vehicle, current) else {
            // Nothing to steer yet
            return;
        };
        if next_step.is_empty() {
            return;
        }

        let next = PositionNode::new(next_step);
        let instruction = LaneChangeMessage {
            id: vehicle.clone(),
            lane_change: lateral_shift(current, &next),
            forward: true,
        };
        debug!("To go from {current} to {next}: {instruction:?}");

        match serde_json::to_vec(&instruction) {
            Ok(bytes) => {
                let topic = self.topics.instruction_topic();
                if self.output.publish(Message::new(&topic, bytes)).await.is_err() {
                    warn!("Bus connection closed, dropping instruction");
                }
            }
            Err(err) => warn!("Failed to encode instruction: {err}"),
        }
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(message: &Message) -> Option<T> {
    let payload = message.payload_str().ok()?;
    serde_json::from_str(payload)
        .map_err(|err| warn!("Dropping message on {}: {err}", message.topic.name))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as futures_mpsc;
    use futures::StreamExt;
    use test_case::test_case;

    #[test_case("05.intersection.bottom", "05.intersection.high", LaneShift::Right; "bottom to high is right")]
    #[test_case("20.straight.bottom", "20.straight.top", LaneShift::Right; "bottom to top is right")]
    #[test_case("20.straight.top", "20.straight.bottom", LaneShift::Left; "top to bottom is left")]
    #[test_case("05.intersection.high", "06.intersection.low", LaneShift::None; "another tile is forward")]
    #[test_case("05.intersection.low", "05.intersection.high", LaneShift::None; "low to high is no shift")]
    #[test_case("13.curve.inner", "13.curve.outer", LaneShift::None; "curve lanes have no vertical order")]
    fn lateral_shift_mapping(current: &str, next: &str, expected: LaneShift) {
        assert_eq!(
            lateral_shift(&PositionNode::new(current), &PositionNode::new(next)),
            expected
        );
    }

    struct DeciderHarness {
        vehicle_ids: mpsc::UnboundedSender<Message>,
        next_steps: mpsc::UnboundedSender<Message>,
        positions: mpsc::UnboundedSender<Message>,
        output: futures_mpsc::UnboundedReceiver<Message>,
        _shutdown: watch::Sender<()>,
    }

    fn spawn_decider() -> DeciderHarness {
        let (vehicle_ids_tx, vehicle_ids) = mpsc::unbounded_channel();
        let (next_steps_tx, next_steps) = mpsc::unbounded_channel();
        let (positions_tx, positions) = mpsc::unbounded_channel();
        let (output_tx, output) = futures_mpsc::unbounded();
        let (shutdown_tx, shutdown) = watch::channel(());

        let decider = TurnDecider {
            topics: PathfindTopics::default(),
            vehicle_ids,
            next_steps,
            positions,
            output: output_tx,
            shutdown,
        };
        tokio::spawn(decider.run());

        DeciderHarness {
            vehicle_ids: vehicle_ids_tx,
            next_steps: next_steps_tx,
            positions: positions_tx,
            output,
            _shutdown: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn emits_an_instruction_on_next_step() {
        let mut harness = spawn_decider();
        let topics = PathfindTopics::default();

        harness
            .vehicle_ids
            .send(Message::new(&topics.vehicle_id_topic(), r#"{"id": "DD17"}"#))
            .unwrap();
        harness
            .positions
            .send(Message::new(
                &topics.position_topic(),
                r#"{"id": "05.intersection.bottom"}"#,
            ))
            .unwrap();
        harness
            .next_steps
            .send(Message::new(
                &topics.next_step_topic(),
                r#"{"next_step": "05.intersection.high"}"#,
            ))
            .unwrap();

        let message = harness.output.next().await.unwrap();
        assert_eq!(message.topic.name, "/hyperdrive/vehicle/instruction");
        assert_eq!(
            message.payload_str().unwrap(),
            r#"{"ID":"DD17","lane_change":"right","forward":true}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn next_step_without_a_position_is_ignored() {
        let mut harness = spawn_decider();
        let topics = PathfindTopics::default();

        harness
            .vehicle_ids
            .send(Message::new(&topics.vehicle_id_topic(), r#"{"id": "DD17"}"#))
            .unwrap();
        harness
            .next_steps
            .send(Message::new(
                &topics.next_step_topic(),
                r#"{"next_step": "05.intersection.high"}"#,
            ))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(harness.output.try_next().is_err(), "no position, no instruction");

        harness
            .positions
            .send(Message::new(
                &topics.position_topic(),
                r#"{"id": "05.intersection.high"}"#,
            ))
            .unwrap();
        harness
            .next_steps
            .send(Message::new(
                &topics.next_step_topic(),
                r#"{"next_step": "06.intersection.low"}"#,
            ))
            .unwrap();

        let message = harness.output.next().await.unwrap();
        assert_eq!(
            message.payload_str().unwrap(),
            r#"{"ID":"DD17","lane_change":"","forward":true}"#
        );
    }
}
