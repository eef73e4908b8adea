use super::{
    Intersect, Nearest, NearestToLine, Segment, Shapes, tightest_around,
};
use crate::{bounds::TreeBoundBox, tree::LineHit};
use nalgebra::Point3;

/// Shape collection where each shape is a straight edge between two points
///
/// Edges are given as pairs of indices into a point list.  As with
/// [`PointShapes`](super::PointShapes), an optional label list selects a
/// subset of the edges.
#[derive(Clone, Debug)]
pub struct EdgeShapes<'a> {
    points: &'a [Point3<f64>],
    edges: &'a [[usize; 2]],
    labels: Option<&'a [usize]>,

    /// Per-shape bounding boxes, for quick rejection
    bbs: Option<Vec<TreeBoundBox>>,

    /// Relative tolerance for segment intersection
    tol: f64,
}

impl<'a> EdgeShapes<'a> {
    /// Default tolerance for segment intersection, relative to edge length
    pub const DEFAULT_TOL: f64 = 1e-9;

    /// Uses every edge
    pub fn new(points: &'a [Point3<f64>], edges: &'a [[usize; 2]]) -> Self {
        Self {
            points,
            edges,
            labels: None,
            bbs: None,
            tol: Self::DEFAULT_TOL,
        }
    }

    /// Uses only the labelled subset of edges
    pub fn subset(
        points: &'a [Point3<f64>],
        edges: &'a [[usize; 2]],
        labels: &'a [usize],
    ) -> Self {
        Self {
            labels: Some(labels),
            ..Self::new(points, edges)
        }
    }

    /// Precomputes a bounding box for every edge
    pub fn with_cached_bounds(mut self) -> Self {
        let bbs = (0..self.len())
            .map(|i| {
                let s = self.segment(i);
                TreeBoundBox::new(s.start.inf(&s.end), s.start.sup(&s.end))
            })
            .collect();
        self.bbs = Some(bbs);
        self
    }

    /// Sets the relative tolerance used by [`Intersect`]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Returns the index into the underlying edge list for a shape
    pub fn edge_label(&self, index: usize) -> usize {
        match self.labels {
            Some(labels) => labels[index],
            None => index,
        }
    }

    /// Returns the segment for a shape
    pub fn segment(&self, index: usize) -> Segment {
        let [a, b] = self.edges[self.edge_label(index)];
        Segment::new(self.points[a], self.points[b])
    }

    fn rejects(&self, index: usize, bb: &TreeBoundBox) -> bool {
        self.bbs.as_ref().is_some_and(|bbs| !bbs[index].overlaps(bb))
    }
}

impl Shapes for EdgeShapes<'_> {
    fn len(&self) -> usize {
        match self.labels {
            Some(labels) => labels.len(),
            None => self.edges.len(),
        }
    }

    fn shape_points(&self) -> Vec<Point3<f64>> {
        (0..self.len()).map(|i| self.segment(i).centre()).collect()
    }

    fn overlaps_box(&self, index: usize, bb: &TreeBoundBox) -> bool {
        if self.rejects(index, bb) {
            return false;
        }
        let s = self.segment(index);
        bb.intersects(&s.start, &s.end).is_some()
    }

    fn overlaps_sphere(
        &self,
        index: usize,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> bool {
        if let Some(bbs) = &self.bbs {
            if !bbs[index].overlaps_sphere(centre, radius_sqr) {
                return false;
            }
        }
        let s = self.segment(index);
        (s.nearest_point(centre) - centre).norm_squared() <= radius_sqr
    }

    fn find_nearest(
        &self,
        indices: &[usize],
        sample: &Point3<f64>,
        nearest: &mut Nearest,
    ) {
        for &i in indices {
            let p = self.segment(i).nearest_point(sample);
            nearest.update(i, p, (p - sample).norm_squared());
        }
    }
}

impl NearestToLine for EdgeShapes<'_> {
    fn find_nearest_to_line(
        &self,
        indices: &[usize],
        line: &Segment,
        tightest: &mut TreeBoundBox,
        nearest: &mut Option<LineHit>,
    ) {
        let mut best = nearest
            .map(|n| (n.line_point - n.point).norm_squared())
            .unwrap_or(f64::INFINITY);

        for &i in indices {
            if self.rejects(i, tightest) {
                continue;
            }
            let (p, q) = self.segment(i).nearest_points(line);
            let d = (q - p).norm_squared();
            if d < best {
                best = d;
                *nearest = Some(LineHit {
                    index: i,
                    point: p,
                    line_point: q,
                });
                *tightest = tightest_around(line, d.sqrt());
            }
        }
    }
}

impl Intersect for EdgeShapes<'_> {
    /// Returns the point where the segment crosses an edge
    ///
    /// Edges have no area, so a crossing is any approach closer than the
    /// relative tolerance times the edge length.  The returned point is on
    /// the query segment.
    fn intersect(
        &self,
        index: usize,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Point3<f64>> {
        let e = self.segment(index);
        let line = Segment::new(*start, *end);
        let (p, q) = e.nearest_points(&line);
        let tol = self.tol * e.vec().norm();
        ((p - q).norm_squared() <= tol * tol).then_some(q)
    }
}
