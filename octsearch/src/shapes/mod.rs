//! Shape collections that an [`Octree`](crate::Octree) can be built over
//!
//! The tree never touches shape geometry directly: every leaf-level test goes
//! through the [`Shapes`] trait (and its optional extensions), so the same
//! tree code serves point clouds, edge sets and polygonal surfaces.
use crate::{
    bounds::TreeBoundBox,
    tree::{Hit, LineHit, Octree, VolumeType},
};
use nalgebra::{Point3, Vector3};

mod edge;
pub mod geom;
mod patch;
mod point;

pub use edge::EdgeShapes;
pub use geom::Segment;
pub use patch::PatchShapes;
pub use point::PointShapes;

/// Running state of a nearest-point search
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nearest {
    /// Squared search radius; shrinks as closer shapes are found
    pub dist_sqr: f64,
    /// Best hit found so far
    pub hit: Option<Hit>,
}

impl Nearest {
    /// Builds a new search state with the given initial radius
    pub fn new(max_dist_sqr: f64) -> Self {
        Self {
            dist_sqr: max_dist_sqr,
            hit: None,
        }
    }

    /// Records a candidate, keeping it only if it is strictly closer
    ///
    /// Returns `true` if the candidate was accepted
    pub fn update(
        &mut self,
        index: usize,
        point: Point3<f64>,
        dist_sqr: f64,
    ) -> bool {
        if dist_sqr < self.dist_sqr {
            self.dist_sqr = dist_sqr;
            self.hit = Some(Hit { index, point });
            true
        } else {
            false
        }
    }
}

/// Returns a box around `line`, grown by `dist` on every side
pub(crate) fn tightest_around(line: &Segment, dist: f64) -> TreeBoundBox {
    let d = Vector3::repeat(dist);
    TreeBoundBox::new(
        line.start.inf(&line.end) - d,
        line.start.sup(&line.end) + d,
    )
}

/// Core contract between the tree and a shape collection
pub trait Shapes {
    /// Number of shapes
    fn len(&self) -> usize;

    /// Checks whether there are no shapes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One representative point per shape
    fn shape_points(&self) -> Vec<Point3<f64>>;

    /// Exact test of whether a shape overlaps a box
    fn overlaps_box(&self, index: usize, bb: &TreeBoundBox) -> bool;

    /// Exact test of whether a shape overlaps a sphere
    fn overlaps_sphere(
        &self,
        index: usize,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> bool;

    /// Default nearest-point operator
    ///
    /// Checks each shape in `indices` and updates `nearest` with any shape
    /// that is closer to `sample` than its current radius.
    fn find_nearest(
        &self,
        indices: &[usize],
        sample: &Point3<f64>,
        nearest: &mut Nearest,
    );
}

/// Shapes that support nearest-point-to-line searches
pub trait NearestToLine: Shapes {
    /// Nearest-to-line operator
    ///
    /// `tightest` is a box around the line that bounds the region in which a
    /// closer shape may still be found; implementations shrink it whenever
    /// `nearest` improves.
    fn find_nearest_to_line(
        &self,
        indices: &[usize],
        line: &Segment,
        tightest: &mut TreeBoundBox,
        nearest: &mut Option<LineHit>,
    );
}

/// Shapes that can be intersected by a line segment
pub trait Intersect: Shapes {
    /// Returns the intersection of the segment `start → end` with a shape
    fn intersect(
        &self,
        index: usize,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Point3<f64>>;
}

/// Closed shapes that can classify points as inside or outside
pub trait Classify: Shapes + Sized {
    /// Classifies a point using the shapes, with the tree available for
    /// accelerated lookups
    fn volume_type(&self, tree: &Octree<Self>, sample: &Point3<f64>)
    -> VolumeType;
}

/// Volumetric shapes that can contain a point
pub trait Contains: Shapes {
    /// Checks whether a shape contains the given point
    fn contains(&self, index: usize, sample: &Point3<f64>) -> bool;
}
