//! The directed graph of position nodes.
//!
//! Nodes are `TT.shape.segment` names; edges are the physically
//! reachable transitions between lane regions, including lane changes
//! within a tile. Edges are unweighted. The graph is built once from
//! the YAML track description and never mutated, so it can be shared
//! freely behind an `Arc`.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;

/// The YAML track description
///
/// ```yaml
/// shapes:
///   curve:
///     lanes:
///       - {name: inner, from: 1, to: 8}
///       - {name: outer, from: 9, to: 16}
/// edges:
///   - {source: 13.curve.outer, target: 20.straight.top}
/// ```
#[derive(Debug, Deserialize)]
pub struct TrackConfig {
    #[serde(default)]
    pub shapes: HashMap<String, ShapeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgePair>,
}

#[derive(Debug, Deserialize)]
pub struct ShapeDefinition {
    pub lanes: Vec<LaneSegment>,
}

/// A named lane region within a shape, spanning lanes `from..=to`
#[derive(Debug, Deserialize)]
pub struct LaneSegment {
    pub name: String,
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Deserialize)]
pub struct EdgePair {
    pub source: String,
    pub target: String,
}

/// The track topology, in an arena layout: interned node names plus
/// an adjacency list of node indices.
#[derive(Debug)]
pub struct TrackGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl TrackGraph {
    /// Load the graph from a YAML track description.
    pub fn load(path: impl AsRef<Path>) -> Result<TrackGraph, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::TrackFileUnreadable {
                path: path.into(),
                source,
            })?;
        let config: TrackConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::TrackFileInvalid {
                path: path.into(),
                source,
            })?;
        if config.edges.is_empty() {
            return Err(ConfigError::EmptyTrack { path: path.into() });
        }
        Ok(TrackGraph::from_edges(
            config.edges.iter().map(|e| (&*e.source, &*e.target)),
        ))
    }

    /// Build the graph from explicit edges; the node set is the union
    /// of all edge endpoints.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> TrackGraph {
        let mut graph = TrackGraph {
            nodes: Vec::new(),
            index: HashMap::new(),
            adjacency: Vec::new(),
        };
        for (source, target) in edges {
            let source = graph.intern(source);
            let target = graph.intern(target);
            if !graph.adjacency[source].contains(&target) {
                graph.adjacency[source].push(target);
            }
        }
        graph
    }

    fn intern(&mut self, node: &str) -> usize {
        match self.index.get(node) {
            Some(&i) => i,
            None => {
                let i = self.nodes.len();
                self.nodes.push(node.to_string());
                self.index.insert(node.to_string(), i);
                self.adjacency.push(Vec::new());
                i
            }
        }
    }

    pub fn contains(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.as_str())
    }

    /// The direct successors of a node; empty for an unknown node.
    pub fn successors(&self, node: &str) -> impl Iterator<Item = &str> {
        self.index
            .get(node)
            .map(|&i| self.adjacency[i].as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&i| self.nodes[i].as_str())
    }

    /// Breadth-first shortest path over the unit-weight edges,
    /// including both endpoints. `None` when `to` is unreachable.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<&str>> {
        let from = *self.index.get(from)?;
        let to = *self.index.get(to)?;

        let mut predecessor: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        visited[from] = true;
        queue.push_back(from);

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut step = to;
                while let Some(previous) = predecessor[step] {
                    path.push(previous);
                    step = previous;
                }
                path.reverse();
                return Some(path.into_iter().map(|i| self.nodes[i].as_str()).collect());
            }
            for &next in &self.adjacency[node] {
                if !visited[next] {
                    visited[next] = true;
                    predecessor[next] = Some(node);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}
