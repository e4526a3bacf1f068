//! The tracking-routing-actuation loop of the hyperdrive control plane.
//!
//! Four cooperating tasks share an immutable track graph:
//!
//! * the [`estimator`] fuses sparse tile-crossing reports with the
//!   graph topology into a best-guess position node, predicting ahead
//!   when the sensors stay silent;
//! * the [`planner`] recomputes the shortest path to the operator's
//!   target tile on every position change;
//! * the [`turn`] decider converts "next graph node" into a
//!   lane-change instruction;
//! * the [`actuator`] converts instructions into the physical lane and
//!   speed commands of the remote-control surface.
//!
//! Tasks never share mutable state: the bus dispatcher feeds each one
//! through its own queue, and outputs go back through the bus.
#![forbid(unsafe_code)]

pub mod actuator;
pub mod error;
pub mod estimator;
pub mod graph;
pub mod planner;
pub mod position;
pub mod turn;

pub use error::ConfigError;
pub use graph::TrackGraph;
pub use position::PositionNode;
