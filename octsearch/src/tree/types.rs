//! Node and octant reference types
use crate::bounds::TreeBoundBox;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Reference stored in each of a node's 8 octant slots
///
/// This is serialized as a [`PackedIndex`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "PackedIndex", into = "PackedIndex")]
pub enum OctantRef {
    /// Index of a child node
    Node(usize),
    /// Index of a content bucket
    Content(usize),
    /// No shape overlaps this octant
    #[default]
    Empty,
}

impl OctantRef {
    /// Checks whether this is a [`OctantRef::Node`]
    pub fn is_node(&self) -> bool {
        matches!(self, OctantRef::Node(..))
    }
    /// Checks whether this is a [`OctantRef::Content`]
    pub fn is_content(&self) -> bool {
        matches!(self, OctantRef::Content(..))
    }
    /// Checks whether this is [`OctantRef::Empty`]
    pub fn is_empty(&self) -> bool {
        matches!(self, OctantRef::Empty)
    }
}

/// Raw octant reference, packed into a single signed integer
///
/// Positive values are node indices (offset by one), negative values are
/// content indices (offset by one and negated), and zero is empty.
///
/// Unpack to an [`OctantRef`] to actually use it
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PackedIndex(i64);

impl PackedIndex {
    /// Wraps a raw packed value
    pub fn new(i: i64) -> Self {
        Self(i)
    }
    /// Returns the raw packed value
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<OctantRef> for PackedIndex {
    fn from(r: OctantRef) -> Self {
        let i = match r {
            OctantRef::Empty => 0,
            OctantRef::Node(i) => {
                debug_assert!(i < i64::MAX as usize);
                i as i64 + 1
            }
            OctantRef::Content(i) => {
                debug_assert!(i < i64::MAX as usize);
                -(i as i64) - 1
            }
        };
        PackedIndex(i)
    }
}

impl From<PackedIndex> for OctantRef {
    fn from(p: PackedIndex) -> Self {
        match p.0 {
            0 => OctantRef::Empty,
            i if i > 0 => OctantRef::Node((i - 1) as usize),
            i => OctantRef::Content((-i - 1) as usize),
        }
    }
}

static_assertions::const_assert!(
    std::mem::size_of::<usize>() <= std::mem::size_of::<i64>()
);

////////////////////////////////////////////////////////////////////////////////

/// A single materialized tree node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Bounds of this node
    pub bb: TreeBoundBox,
    /// Index of the parent node, or `None` for the root
    pub parent: Option<usize>,
    /// Per-octant references
    pub children: [OctantRef; 8],
}

/// Result of a successful point query
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hit {
    /// Index of the shape that was hit
    pub index: usize,
    /// Hit location on that shape
    pub point: Point3<f64>,
}

/// Result of a successful nearest-to-line query
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LineHit {
    /// Index of the nearest shape
    pub index: usize,
    /// Nearest point on the shape
    pub point: Point3<f64>,
    /// Nearest point on the line
    pub line_point: Point3<f64>,
}
