//! The vehicle position estimator.
//!
//! Tile-crossing reports are sparse: curves and intersections are
//! routinely missed. The estimator keeps a short history of confirmed
//! nodes and, whenever the sensors stay silent for a full timeout,
//! predicts the next node from the graph topology and publishes it as
//! if observed. Predictions chain until a real report arrives.

use crate::graph::TrackGraph;
use crate::position::encode;
use crate::position::non_detection_rank;
use crate::position::PositionNode;
use anki_api::payloads::PositionPayload;
use anki_api::payloads::TilePayload;
use anki_api::payloads::TrackEvent;
use anki_api::payloads::VehicleIdPayload;
use anki_api::topics::PathfindTopics;
use anki_api::topics::Vehicle;
use anki_api::topics::VehicleId;
use mqtt_bus::Message;
use mqtt_bus::PubChannel;
use mqtt_bus::UnboundedSender;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// How long without a report before the estimator predicts ahead
pub const DEFAULT_PREDICTION_TIMEOUT: Duration = Duration::from_secs(1);

/// The history keeps the last few nodes only: enough to rule out
/// immediate backtracking, short enough to recover from a bad guess.
pub const HISTORY_CAPACITY: usize = 4;

/// The bounded ring of the most recent position nodes, most recent last.
///
/// Adjacent duplicates are collapsed, so two consecutive entries are
/// never equal.
#[derive(Debug, Default)]
pub struct History {
    nodes: VecDeque<PositionNode>,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    /// Append a node, evicting the oldest entry at capacity.
    /// A node equal to the current tail is dropped.
    pub fn push(&mut self, node: PositionNode) -> bool {
        if self.nodes.back() == Some(&node) {
            return false;
        }
        if self.nodes.len() >= HISTORY_CAPACITY {
            self.nodes.pop_front();
        }
        self.nodes.push_back(node);
        true
    }

    pub fn tail(&self) -> Option<&PositionNode> {
        self.nodes.back()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|node| node.as_str() == name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionNode> {
        self.nodes.iter()
    }
}

/// Predict the node the vehicle most plausibly moved to, given that
/// the sensors reported nothing.
///
/// Successors on the same tile are excluded (a silent lane change is
/// not a plausible miss), as are nodes already in the history (no
/// immediate backtracking). The remaining candidates are ranked by
/// non-detection probability, ties broken by node name, so the
/// function is pure: same graph and history, same prediction.
pub fn predict(graph: &TrackGraph, history: &History) -> Option<PositionNode> {
    let current = history.tail()?;
    let mut candidates: Vec<&str> = graph
        .successors(current.as_str())
        .filter(|next| next.get(..2) != Some(current.tile_prefix()))
        .filter(|next| !history.contains(next))
        .collect();
    candidates.sort_by_key(|next| (non_detection_rank(next), *next));
    candidates.first().map(|next| PositionNode::new(*next))
}

/// The estimator task: one queue of raw track events, one timer.
pub struct Estimator {
    pub graph: Arc<TrackGraph>,
    pub topics: PathfindTopics,
    pub vehicle_ids: mpsc::UnboundedReceiver<Message>,
    pub track_events: mpsc::UnboundedReceiver<Message>,
    pub output: UnboundedSender<Message>,
    pub shutdown: watch::Receiver<()>,
    pub prediction_timeout: Duration,
}

impl Estimator {
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval_at(
            Instant::now() + self.prediction_timeout,
            self.prediction_timeout,
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut history = History::new();
        let mut tracked: Option<VehicleId> = None;

        loop {
            tokio::select! {
                // Pending messages beat a due timer tick
                biased;

                _ = self.shutdown.changed() => break,

                Some(message) = self.vehicle_ids.recv() => {
                    if let Some(vehicle) = decode_vehicle_id(&message) {
                        info!("Tracking vehicle {vehicle}");
                        tracked = Some(vehicle);
                        history.clear();
                    }
                }

                Some(message) = self.track_events.recv() => {
                    if self.on_track_event(&message, &tracked, &mut history).await {
                        timer.reset();
                    }
                }

                _ = timer.tick() => {
                    self.on_prediction_tick(&mut history).await;
                }
            }
        }
    }

    /// Handle one raw report; returns `true` when the prediction timer
    /// must be rearmed (i.e. the report was valid for the tracked vehicle).
    async fn on_track_event(
        &mut self,
        message: &Message,
        tracked: &Option<VehicleId>,
        history: &mut History,
    ) -> bool {
        let Some(tracked) = tracked else {
            return false;
        };
        if Vehicle::id_from_track_topic(&message.topic).as_ref() != Some(tracked) {
            return false;
        }

        let event = match message.payload_str().map_err(anki_api::ProtocolError::from) {
            Ok(payload) => match TrackEvent::from_wire(payload) {
                Ok(event) => event,
                Err(err) => {
                    warn!("Dropping track event: {err}");
                    return false;
                }
            },
            Err(err) => {
                warn!("Dropping track event: {err}");
                return false;
            }
        };

        if event.value.track_id == 0 {
            debug!("Ignoring report from the crossing (trackID 0)");
            return false;
        }

        let node = encode(event.value.track_id, event.value.track_location);
        if !self.graph.contains(node.as_str()) {
            warn!("Observed node {node} is not on the track graph");
            return false;
        }

        history.push(node.clone());
        debug!("Track update, history: {:?}", history);

        let absolute = self.topics.absolute_position_topic();
        self.send_json(&absolute, &TilePayload { id: event.value.track_id }).await;
        let position = self.topics.position_topic();
        self.send_json(&position, &PositionPayload { id: node.as_str().into() }).await;
        true
    }

    async fn on_prediction_tick(&mut self, history: &mut History) {
        if history.is_empty() {
            // No observation yet: nothing to predict from
            return;
        }

        let Some(predicted) = predict(&self.graph, history) else {
            debug!("Could not predict the next node");
            return;
        };

        debug!("Predicted {predicted}, history: {:?}", history);
        history.push(predicted.clone());

        if let Some(tile) = predicted.tile() {
            let prediction = self.topics.prediction_topic();
            self.send_json(&prediction, &TilePayload { id: tile }).await;
        }
        let position = self.topics.position_topic();
        self.send_json(&position, &PositionPayload { id: predicted.as_str().into() })
            .await;
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

fn decode_vehicle_id(message: &Message) -> Option<VehicleId> {
    let payload = message.payload_str().ok()?;
    let VehicleIdPayload { id } = serde_json::from_str(payload).ok()?;
    id.parse().ok()
}
