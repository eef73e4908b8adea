//! Nearest-point and nearest-to-line searches
use super::{Hit, LineHit, OctantRef, Octree};
use crate::{
    bounds::TreeBoundBox,
    shapes::{Nearest, NearestToLine, Segment, Shapes},
};
use nalgebra::Point3;
use rayon::prelude::*;

impl<S: Shapes> Octree<S> {
    /// Finds the shape nearest to `sample`, within a squared radius
    ///
    /// Returns `None` if nothing is closer than `sqrt(max_dist_sqr)`.
    pub fn find_nearest(
        &self,
        sample: &Point3<f64>,
        max_dist_sqr: f64,
    ) -> Option<Hit> {
        self.find_nearest_with(sample, max_dist_sqr, |indices, p, n| {
            self.shapes.find_nearest(indices, p, n)
        })
    }

    /// Finds the nearest shape using a custom nearest-point operator
    ///
    /// The operator is called with each candidate bucket and must update the
    /// [`Nearest`] state if it finds anything closer.
    pub fn find_nearest_with<F>(
        &self,
        sample: &Point3<f64>,
        max_dist_sqr: f64,
        mut op: F,
    ) -> Option<Hit>
    where
        F: FnMut(&[usize], &Point3<f64>, &mut Nearest),
    {
        let mut nearest = Nearest::new(max_dist_sqr);
        if !self.nodes.is_empty() {
            self.find_nearest_recurse(0, sample, &mut nearest, &mut op);
        }
        nearest.hit
    }

    fn find_nearest_recurse<F>(
        &self,
        node: usize,
        sample: &Point3<f64>,
        nearest: &mut Nearest,
        op: &mut F,
    ) where
        F: FnMut(&[usize], &Point3<f64>, &mut Nearest),
    {
        let n = &self.nodes[node];
        for octant in n.bb.search_order(sample) {
            match n.children[octant.index()] {
                OctantRef::Node(i) => {
                    let bb = &self.nodes[i].bb;
                    if bb.overlaps_sphere(sample, nearest.dist_sqr) {
                        self.find_nearest_recurse(i, sample, nearest, op);
                    }
                }
                OctantRef::Content(c) => {
                    let sub = n.bb.sub_box(octant);
                    if sub.overlaps_sphere(sample, nearest.dist_sqr) {
                        op(&self.contents[c], sample, nearest);
                    }
                }
                OctantRef::Empty => (),
            }
        }
    }
}

impl<S: Shapes + Sync> Octree<S> {
    /// Runs [`find_nearest`](Octree::find_nearest) for many samples in
    /// parallel
    pub fn find_nearest_many(
        &self,
        samples: &[Point3<f64>],
        max_dist_sqr: f64,
    ) -> Vec<Option<Hit>> {
        samples
            .par_iter()
            .map(|p| self.find_nearest(p, max_dist_sqr))
            .collect()
    }
}

impl<S: NearestToLine> Octree<S> {
    /// Finds the shape nearest to a line segment
    ///
    /// `tightest` bounds the search region; it is typically initialised to a
    /// box around the segment, and is shrunk as closer shapes are found.
    pub fn find_nearest_line(
        &self,
        line: &Segment,
        tightest: &mut TreeBoundBox,
    ) -> Option<LineHit> {
        self.find_nearest_line_with(line, tightest, |indices, ln, t, n| {
            self.shapes.find_nearest_to_line(indices, ln, t, n)
        })
    }
}

impl<S> Octree<S> {
    /// Finds the nearest shape to a line using a custom operator
    pub fn find_nearest_line_with<F>(
        &self,
        line: &Segment,
        tightest: &mut TreeBoundBox,
        mut op: F,
    ) -> Option<LineHit>
    where
        F: FnMut(&[usize], &Segment, &mut TreeBoundBox, &mut Option<LineHit>),
    {
        let mut nearest = None;
        if !self.nodes.is_empty() {
            let centre = line.centre();
            self.find_nearest_line_recurse(
                0,
                line,
                &centre,
                tightest,
                &mut nearest,
                &mut op,
            );
        }
        nearest
    }

    fn find_nearest_line_recurse<F>(
        &self,
        node: usize,
        line: &Segment,
        centre: &Point3<f64>,
        tightest: &mut TreeBoundBox,
        nearest: &mut Option<LineHit>,
        op: &mut F,
    ) where
        F: FnMut(&[usize], &Segment, &mut TreeBoundBox, &mut Option<LineHit>),
    {
        let n = &self.nodes[node];
        for octant in n.bb.search_order(centre) {
            match n.children[octant.index()] {
                OctantRef::Node(i) => {
                    if self.nodes[i].bb.overlaps(tightest) {
                        self.find_nearest_line_recurse(
                            i, line, centre, tightest, nearest, op,
                        );
                    }
                }
                OctantRef::Content(c) => {
                    if n.bb.sub_box(octant).overlaps(tightest) {
                        op(&self.contents[c], line, tightest, nearest);
                    }
                }
                OctantRef::Empty => (),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{bounds::GREAT, shapes::PointShapes, tree::Settings};

    fn cloud() -> Vec<Point3<f64>> {
        (0..200)
            .map(|i| {
                let a = i as f64 * 0.37;
                Point3::new(a.sin(), a.cos(), (a * 0.3).sin()) * 2.0
            })
            .collect()
    }

    fn bounds(pts: &[Point3<f64>]) -> TreeBoundBox {
        TreeBoundBox::from_points(pts).extend(1e-4)
    }

    #[test]
    fn test_find_nearest_matches_brute_force() {
        let pts = cloud();
        let tree = Octree::build(
            PointShapes::new(&pts),
            bounds(&pts),
            Settings::default(),
        )
        .unwrap();

        for s in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.9, -0.3, 0.2),
            Point3::new(5.0, 5.0, 5.0),
        ] {
            let hit = tree.find_nearest(&s, GREAT).unwrap();
            let best = pts
                .iter()
                .map(|p| (p - s).norm_squared())
                .fold(f64::INFINITY, f64::min);
            assert_eq!((pts[hit.index] - s).norm_squared(), best);
            assert_eq!(hit.point, pts[hit.index]);
        }
    }

    #[test]
    fn test_find_nearest_radius() {
        let pts = cloud();
        let tree = Octree::build(
            PointShapes::new(&pts),
            bounds(&pts),
            Settings::default(),
        )
        .unwrap();
        assert!(tree.find_nearest(&Point3::new(10.0, 0.0, 0.0), 1.0).is_none());

        let many = tree.find_nearest_many(&pts, 1e-12);
        for (i, h) in many.iter().enumerate() {
            assert_eq!(h.unwrap().point, pts[i]);
        }
    }

    #[test]
    fn test_find_nearest_line() {
        let pts = cloud();
        let tree = Octree::build(
            PointShapes::new(&pts),
            bounds(&pts),
            Settings::default(),
        )
        .unwrap();

        let line = Segment::new(
            Point3::new(-3.0, 0.1, 0.0),
            Point3::new(3.0, 0.1, 0.0),
        );
        let mut tightest = TreeBoundBox::great();
        let hit = tree.find_nearest_line(&line, &mut tightest).unwrap();

        let best = pts
            .iter()
            .map(|p| (line.nearest_point(p) - p).norm_squared())
            .fold(f64::INFINITY, f64::min);
        let d = (hit.line_point - hit.point).norm_squared();
        approx::assert_relative_eq!(d, best, epsilon = 1e-12);
    }
}
