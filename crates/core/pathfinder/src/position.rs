//! Position nodes and the tile-report encoder.
//!
//! A raw sensor observation `{trackID, trackLocation}` is turned into
//! the `TT.shape.segment` node the vehicle is driving through. Tile
//! shapes are fixed by the track hardware; the lane number selects the
//! segment within the tile.

use std::fmt;

/// The tile ids that are curves; intersections below; everything else
/// is a straight.
const CURVE_TILES: [i32; 4] = [13, 14, 15, 16];
const INTERSECTION_TILES: [i32; 10] = [1, 2, 3, 4, 5, 6, 9, 12, 18, 19];

/// Tiles 0 and 17 are the central crossing: vehicles may drive through
/// but must not stop there.
pub const CROSSING_TILES: [i32; 2] = [0, 17];

/// The tile a stop target is clamped to when the crossing is selected.
pub const FALLBACK_STOP_TILE: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Curve,
    Straight,
    Intersection,
}

impl Shape {
    pub fn of_tile(track_id: i32) -> Shape {
        if CURVE_TILES.contains(&track_id) {
            Shape::Curve
        } else if INTERSECTION_TILES.contains(&track_id) {
            Shape::Intersection
        } else {
            Shape::Straight
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Curve => "curve",
            Shape::Straight => "straight",
            Shape::Intersection => "intersection",
        }
    }
}

/// A `TT.shape.segment` graph node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionNode {
    name: String,
}

impl PositionNode {
    pub fn new(name: impl Into<String>) -> PositionNode {
        PositionNode { name: name.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The two-digit tile prefix, e.g. `"13"`
    pub fn tile_prefix(&self) -> &str {
        self.name.get(..2).unwrap_or(&self.name)
    }

    /// The tile id, when the prefix is numeric
    pub fn tile(&self) -> Option<i32> {
        self.tile_prefix().parse().ok()
    }

    /// The segment name, after the last `.`
    pub fn segment(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or("")
    }

    /// Whether the two nodes belong to the same physical tile
    pub fn same_tile(&self, other: &PositionNode) -> bool {
        self.tile_prefix() == other.tile_prefix()
    }
}

impl fmt::Display for PositionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// Encode a raw tile report into its position node.
///
/// The lane number (the `trackLocation` of the report) selects the
/// segment: curves split at lane 9 into inner/outer, straights into
/// bottom/top, intersections into low (< 5), high (< 9) and bottom.
pub fn encode(track_id: i32, lane: i32) -> PositionNode {
    let shape = Shape::of_tile(track_id);
    let segment = match shape {
        Shape::Curve => {
            if lane < 9 {
                "inner"
            } else {
                "outer"
            }
        }
        Shape::Straight => {
            if lane < 9 {
                "bottom"
            } else {
                "top"
            }
        }
        Shape::Intersection => {
            if lane < 5 {
                "low"
            } else if lane < 9 {
                "high"
            } else {
                "bottom"
            }
        }
    };
    PositionNode::new(format!("{:02}.{}.{}", track_id, shape.as_str(), segment))
}

/// The canonical node for stopping on a tile: the outer lane of a
/// curve, the top of a straight, the bottom of an intersection.
/// The crossing tiles are not stoppable and clamp to the fallback.
pub fn stop_target(tile: i32) -> PositionNode {
    let tile = if CROSSING_TILES.contains(&tile) {
        FALLBACK_STOP_TILE
    } else {
        tile
    };
    let shape = Shape::of_tile(tile);
    let segment = match shape {
        Shape::Curve => "outer",
        Shape::Straight => "top",
        Shape::Intersection => "bottom",
    };
    PositionNode::new(format!("{:02}.{}.{}", tile, shape.as_str(), segment))
}

/// Rank a node by how likely the sensors are to miss it, most-likely
/// -missed first. Predictions prefer the neighbour the vehicle could
/// have crossed without a report.
pub fn non_detection_rank(node: &str) -> u8 {
    if node.contains("curve.inner") {
        1
    } else if node.contains("intersection.low") || node.contains("intersection.high") {
        2
    } else if node.contains("intersection.bottom") {
        3
    } else if node.contains("curve.outer") {
        4
    } else if node.contains("straight") {
        5
    } else {
        0
    }
}
