//! Array-indexed octree over an arbitrary [`Shapes`] collection
//!
//! The tree is stored as two flat arenas: a list of [`Node`]s (node 0 is the
//! root, covering the whole search bound) and a list of content buckets, each
//! of which is a list of shape indices.  Each node has 8 octant slots, which
//! are [`OctantRef`]s to either a child node, a content bucket, or nothing.
//!
//! A shape which straddles an octant boundary is referenced from every
//! bucket whose octant it overlaps.
use crate::{
    bounds::{Octant, SMALL, TreeBoundBox},
    shapes::{Contains, Shapes},
    Error,
};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

mod build;
mod io;
mod line;
mod nearest;
mod range;
mod types;
mod volume;

pub use types::{Hit, LineHit, Node, OctantRef, PackedIndex};
pub use volume::{VolumeType, get_side};

/// Settings when building an octree
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum depth of the tree (including the root level)
    pub max_levels: usize,

    /// Buckets with more than this many shapes are subdivided
    pub max_leaf_ratio: f64,

    /// Subdivision stops once the average number of bucket references per
    /// shape exceeds this value
    pub max_duplicity: f64,

    /// Relative distance (as a fraction of the local box span) used to push
    /// points away from box faces during line walks
    pub perturb_tol: f64,

    /// Maximum number of octants visited by a single line walk
    pub max_walk_steps: usize,

    /// Panic (instead of logging a warning) if a line walk gets stuck
    pub strict: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_levels: 8,
            max_leaf_ratio: 10.0,
            max_duplicity: 3.0,
            perturb_tol: 10.0 * SMALL,
            max_walk_steps: 100_000,
            strict: false,
        }
    }
}

impl Settings {
    /// Checks that the settings are in range
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_levels == 0 {
            Err(Error::BadSettings("max_levels must be at least 1"))
        } else if !(self.max_leaf_ratio > 0.0) {
            Err(Error::BadSettings("max_leaf_ratio must be positive"))
        } else if !(self.max_duplicity > 0.0) {
            Err(Error::BadSettings("max_duplicity must be positive"))
        } else if !(self.perturb_tol > 0.0) {
            Err(Error::BadSettings("perturb_tol must be positive"))
        } else if self.max_walk_steps == 0 {
            Err(Error::BadSettings("max_walk_steps must be at least 1"))
        } else {
            Ok(())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Octree spatial index
///
/// The tree owns its shape adapter (which will typically borrow the actual
/// geometry) and is immutable after construction, apart from the lazily
/// computed inside/outside cache; see [`Octree::ensure_classified`].
#[derive(Debug)]
pub struct Octree<S> {
    shapes: S,
    settings: Settings,
    nodes: Vec<Node>,
    contents: Vec<Vec<usize>>,

    /// Per-(node, octant) volume type, indexed by `node * 8 + octant`
    volume_types: OnceLock<Vec<VolumeType>>,
}

impl<S> Octree<S> {
    /// Builds an empty tree, which reports a miss for every query
    pub fn empty(shapes: S, settings: Settings) -> Self {
        Self {
            shapes,
            settings,
            nodes: vec![],
            contents: vec![],
            volume_types: OnceLock::new(),
        }
    }

    /// Returns the shape adapter
    pub fn shapes(&self) -> &S {
        &self.shapes
    }

    /// Returns the tree's settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the node arena
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the content bucket arena
    pub fn contents(&self) -> &[Vec<usize>] {
        &self.contents
    }

    /// Checks whether the tree has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the bounds of the root node
    ///
    /// # Panics
    /// If the tree is empty
    pub fn bounds(&self) -> &TreeBoundBox {
        match self.nodes.first() {
            Some(n) => &n.bb,
            None => panic!("bounds requested for an empty tree"),
        }
    }

    /// Returns the bounds of a node's octant
    ///
    /// For child nodes this is the stored box of that node; otherwise it is
    /// derived from the parent's box.
    pub fn sub_bounds(&self, node: usize, octant: Octant) -> TreeBoundBox {
        let n = &self.nodes[node];
        match n.children[octant.index()] {
            OctantRef::Node(i) => self.nodes[i].bb,
            _ => n.bb.sub_box(octant),
        }
    }

    /// Returns the deepest node and octant containing the sample
    ///
    /// Returns `None` if the tree is empty.  The sample is assumed to be
    /// inside the root bounds; points outside are clamped to the nearest
    /// octant.
    pub fn find_node(&self, sample: &Point3<f64>) -> Option<(usize, Octant)> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(self.find_node_from(0, sample))
    }

    pub(crate) fn find_node_from(
        &self,
        mut node: usize,
        sample: &Point3<f64>,
    ) -> (usize, Octant) {
        loop {
            let n = &self.nodes[node];
            let octant = n.bb.sub_octant(sample);
            match n.children[octant.index()] {
                OctantRef::Node(i) => node = i,
                _ => return (node, octant),
            }
        }
    }

    /// Returns the bucket containing the sample, or an empty slice
    pub fn find_indices(&self, sample: &Point3<f64>) -> &[usize] {
        match self.find_node(sample) {
            Some((node, octant)) => {
                match self.nodes[node].children[octant.index()] {
                    OctantRef::Content(c) => &self.contents[c],
                    _ => &[],
                }
            }
            None => &[],
        }
    }

    /// Counts the bucket entries beneath an octant reference
    ///
    /// Shapes referenced from several buckets are counted once per bucket.
    pub fn count_elements(&self, r: OctantRef) -> usize {
        match r {
            OctantRef::Node(i) => self.nodes[i]
                .children
                .iter()
                .map(|c| self.count_elements(*c))
                .sum(),
            OctantRef::Content(c) => self.contents[c].len(),
            OctantRef::Empty => 0,
        }
    }

    /// Writes an indented, human-readable dump of the tree
    pub fn print<W: std::io::Write>(
        &self,
        w: &mut W,
        print_contents: bool,
    ) -> std::io::Result<()> {
        if self.nodes.is_empty() {
            return writeln!(w, "empty tree");
        }
        self.print_node(w, print_contents, 0, "")
    }

    fn print_node<W: std::io::Write>(
        &self,
        w: &mut W,
        print_contents: bool,
        node: usize,
        prefix: &str,
    ) -> std::io::Result<()> {
        let n = &self.nodes[node];
        writeln!(w, "{prefix}node:{node} bb:{}", n.bb)?;
        match n.parent {
            Some(p) => writeln!(w, "{prefix}parent:{p}")?,
            None => writeln!(w, "{prefix}parent:-1")?,
        }
        writeln!(
            w,
            "{prefix}n:{}",
            self.count_elements(OctantRef::Node(node))
        )?;

        for octant in Octant::iter() {
            let sub = n.bb.sub_box(octant);
            match n.children[octant.index()] {
                r @ OctantRef::Node(i) => {
                    writeln!(
                        w,
                        "{prefix}octant:{octant} node: n:{} bb:{sub}",
                        self.count_elements(r)
                    )?;
                    let inner = format!("{prefix}  ");
                    self.print_node(w, print_contents, i, &inner)?;
                }
                OctantRef::Content(c) => {
                    let indices = &self.contents[c];
                    write!(
                        w,
                        "{prefix}octant:{octant} content: n:{} bb:{sub}",
                        indices.len()
                    )?;
                    if print_contents {
                        write!(w, " contents:")?;
                        for i in indices {
                            write!(w, " {i}")?;
                        }
                    }
                    writeln!(w)?;
                }
                OctantRef::Empty => {
                    writeln!(w, "{prefix}octant:{octant} empty:{sub}")?;
                }
            }
        }
        Ok(())
    }
}

impl<S: Contains> Octree<S> {
    /// Returns the first shape in the sample's bucket that contains it
    pub fn find_inside(&self, sample: &Point3<f64>) -> Option<usize> {
        self.find_indices(sample)
            .iter()
            .copied()
            .find(|&i| self.shapes.contains(i, sample))
    }
}

impl<S: Shapes> Octree<S> {
    /// Returns the number of shapes in the underlying collection
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }
}
