//! The path planner.
//!
//! Holds the latest `(target, position)` pair and recomputes the
//! shortest path whenever either changes. The planner only ever emits
//! the *next* step: re-planning on every position update makes the
//! route self-correcting when the estimator guesses wrong.

use crate::graph::TrackGraph;
use crate::position::stop_target;
use crate::position::PositionNode;
use anki_api::payloads::ArrivedPayload;
use anki_api::payloads::NextStepPayload;
use anki_api::payloads::PositionPayload;
use anki_api::payloads::TilePayload;
use anki_api::topics::PathfindTopics;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::UnboundedSender;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// The planner task: a queue of targets, a queue of positions.
pub struct Planner {
    pub graph: Arc<TrackGraph>,
    pub topics: PathfindTopics,
    pub targets: mpsc::UnboundedReceiver<Message>,
    pub positions: mpsc::UnboundedReceiver<Message>,
    pub output: UnboundedSender<Message>,
    pub shutdown: watch::Receiver<()>,
}

impl Planner {
    pub async fn run(mut self) {
        let mut target: Option<PositionNode> = None;
        let mut current: Option<PositionNode> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(message) = self.targets.recv() => {
                    if let Some(node) = decode_target(&message) {
                        info!("New target: {node}");
                        target = Some(node);
                        self.replan(&current, &target).await;
                    }
                }

                Some(message) = self.positions.recv() => {
                    if let Some(node) = decode_position(&message) {
                        current = Some(node);
                        self.replan(&current, &target).await;
                    }
                }
            }
        }
    }

    async fn replan(&mut self, current: &Option<PositionNode>, target: &Option<PositionNode>) {
        let (Some(current), Some(target)) = (current, target) else {
            return;
        };

        let Some(path) = self.graph.shortest_path(current.as_str(), target.as_str()) else {
            warn!("No path from {current} to {target}");
            return;
        };

        if path.len() <= 1 {
            info!("Arrived at {target}");
            let arrived = self.topics.arrived_topic();
            self.send_json(&arrived, &ArrivedPayload { arrived: true }).await;
        } else {
            debug!("Path to {target}: {path:?}");
            let next_step = self.topics.next_step_topic();
            self.send_json(
                &next_step,
                &NextStepPayload {
                    next_step: path[1].to_string(),
                },
            )
            .await;
        }
    }

    async fn send_json<T: Serialize>(&mut self, topic: &mqtt_bus::Topic, payload: &T) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => {
                if self.output.publish(Message::new(topic, bytes)).await.is_err() {
                    warn!("Bus connection closed, dropping message for {}", topic.name);
                }
            }
            Err(err) => warn!("Failed to encode payload for {}: {err}", topic.name),
        }
    }
}

fn decode_target(message: &Message) -> Option<PositionNode> {
    let payload = message.payload_str().ok()?;
    let TilePayload { id } = serde_json::from_str(payload)
        .map_err(|err| warn!("Dropping target: {err}"))
        .ok()?;
    Some(stop_target(id))
}

fn decode_position(message: &Message) -> Option<PositionNode> {
    let payload = message.payload_str().ok()?;
    let PositionPayload { id } = serde_json::from_str(payload)
        .map_err(|err| warn!("Dropping position: {err}"))
        .ok()?;
    Some(PositionNode::new(id))
}
