//! Grid geometry: cells, footprints, rotations and cell edges.
//!
//! The grid uses screen orientation: `x` grows east, `y` grows south, and
//! rotations are clockwise. A device's origin is the top-left cell of its
//! rotated footprint.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cells and footprints
// ---------------------------------------------------------------------------

/// A cell on the lot grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub y: i32,
}

impl CellPos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell across `edge`.
    pub fn step(self, edge: Edge) -> Self {
        let (dx, dy) = edge.offset();
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Width and height of a device in cells, before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A 1x1 device.
    pub fn single() -> Self {
        Self::new(1, 1)
    }

    /// For 90/270 degrees, width and height are swapped.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::R0 | Rotation::R180 => *self,
            Rotation::R90 | Rotation::R270 => Self::new(self.height, self.width),
        }
    }

    pub fn contains_local(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Iterate over all cells covered by this footprint at `origin`.
    pub fn cells(&self, origin: CellPos) -> impl Iterator<Item = CellPos> {
        let w = self.width as i32;
        let h = self.height as i32;
        (0..h).flat_map(move |dy| (0..w).map(move |dx| CellPos::new(origin.x + dx, origin.y + dy)))
    }
}

/// Axis-aligned rectangle of cells, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub min: CellPos,
    pub max: CellPos,
}

impl CellRect {
    pub fn from_footprint(origin: CellPos, footprint: Footprint) -> Self {
        Self {
            min: origin,
            max: CellPos::new(
                origin.x + footprint.width as i32 - 1,
                origin.y + footprint.height as i32 - 1,
            ),
        }
    }

    /// Grow the rectangle by `by` cells on every side.
    pub fn expanded(&self, by: u32) -> Self {
        let by = by as i32;
        Self {
            min: CellPos::new(self.min.x - by, self.min.y - by),
            max: CellPos::new(self.max.x + by, self.max.y + by),
        }
    }

    pub fn intersects(&self, other: &CellRect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Every cell of the rectangle, row by row.
    pub fn cells(&self) -> impl Iterator<Item = CellPos> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| CellPos::new(x, y)))
    }

    /// True when the rectangle lies inside a `size`x`size` lot at the origin.
    pub fn within_lot(&self, size: u32) -> bool {
        let size = size as i32;
        self.min.x >= 0 && self.min.y >= 0 && self.max.x < size && self.max.y < size
    }
}

// ---------------------------------------------------------------------------
// Rotation and edges
// ---------------------------------------------------------------------------

/// Clockwise rotation applied to a placed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Number of quarter turns clockwise.
    fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    /// Rotate a local cell of an unrotated `footprint` into the rotated frame.
    pub fn apply_to_cell(self, x: u32, y: u32, footprint: Footprint) -> (u32, u32) {
        let w = footprint.width;
        let h = footprint.height;
        match self {
            Rotation::R0 => (x, y),
            Rotation::R90 => (h - 1 - y, x),
            Rotation::R180 => (w - 1 - x, h - 1 - y),
            Rotation::R270 => (y, w - 1 - x),
        }
    }
}

/// A side of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Edge {
    North,
    East,
    South,
    West,
}

/// Orientation of travel across an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// North/south travel.
    Vertical,
    /// East/west travel.
    Horizontal,
}

impl Edge {
    pub fn all() -> [Edge; 4] {
        [Edge::North, Edge::East, Edge::South, Edge::West]
    }

    /// Cell offset of the neighbour across this edge.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Edge::North => (0, -1),
            Edge::East => (1, 0),
            Edge::South => (0, 1),
            Edge::West => (-1, 0),
        }
    }

    pub fn opposite(self) -> Edge {
        match self {
            Edge::North => Edge::South,
            Edge::East => Edge::West,
            Edge::South => Edge::North,
            Edge::West => Edge::East,
        }
    }

    pub fn rotate_cw(self) -> Edge {
        match self {
            Edge::North => Edge::East,
            Edge::East => Edge::South,
            Edge::South => Edge::West,
            Edge::West => Edge::North,
        }
    }

    pub fn rotated(self, rotation: Rotation) -> Edge {
        (0..rotation.quarter_turns()).fold(self, |edge, _| edge.rotate_cw())
    }

    /// Axis of travel for an item crossing this edge.
    pub fn axis(self) -> Axis {
        match self {
            Edge::North | Edge::South => Axis::Vertical,
            Edge::East | Edge::West => Axis::Horizontal,
        }
    }

    /// Whether this edge lies on the outer boundary of `footprint` at the local cell.
    pub fn is_outer(self, x: u32, y: u32, footprint: Footprint) -> bool {
        match self {
            Edge::North => y == 0,
            Edge::South => y + 1 == footprint.height,
            Edge::West => x == 0,
            Edge::East => x + 1 == footprint.width,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared cell boundaries
// ---------------------------------------------------------------------------

/// Canonical name of the boundary between two orthogonally adjacent cells.
///
/// `(cell, East)` and `(cell + (1, 0), West)` produce the same key, as do
/// `(cell, South)` and `(cell + (0, 1), North)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryKey {
    pub x: i32,
    pub y: i32,
    /// True for the line between `x` and `x + 1`; false for the line between
    /// `y` and `y + 1`.
    pub vertical_line: bool,
}

impl BoundaryKey {
    pub fn of(cell: CellPos, edge: Edge) -> Self {
        match edge {
            Edge::East => Self { x: cell.x, y: cell.y, vertical_line: true },
            Edge::West => Self { x: cell.x - 1, y: cell.y, vertical_line: true },
            Edge::South => Self { x: cell.x, y: cell.y, vertical_line: false },
            Edge::North => Self { x: cell.x, y: cell.y - 1, vertical_line: false },
        }
    }
}
