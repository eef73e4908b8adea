use super::{Classify, Nearest, NearestToLine, Segment, Shapes, tightest_around};
use crate::{
    bounds::TreeBoundBox,
    tree::{LineHit, Octree, VolumeType},
};
use nalgebra::Point3;

/// Shape collection where each shape is a single point
///
/// Optionally, only a subset of the points (given by their labels) is used;
/// in that case, shape `i` is the point `points[labels[i]]`.
#[derive(Copy, Clone, Debug)]
pub struct PointShapes<'a> {
    points: &'a [Point3<f64>],
    labels: Option<&'a [usize]>,
}

impl<'a> PointShapes<'a> {
    /// Uses every point
    pub fn new(points: &'a [Point3<f64>]) -> Self {
        Self {
            points,
            labels: None,
        }
    }

    /// Uses only the labelled subset of points
    pub fn subset(points: &'a [Point3<f64>], labels: &'a [usize]) -> Self {
        Self {
            points,
            labels: Some(labels),
        }
    }

    /// Returns the index into the underlying point list for a shape
    pub fn point_label(&self, index: usize) -> usize {
        match self.labels {
            Some(labels) => labels[index],
            None => index,
        }
    }

    /// Returns the point for a shape
    pub fn point(&self, index: usize) -> Point3<f64> {
        self.points[self.point_label(index)]
    }
}

impl Shapes for PointShapes<'_> {
    fn len(&self) -> usize {
        match self.labels {
            Some(labels) => labels.len(),
            None => self.points.len(),
        }
    }

    fn shape_points(&self) -> Vec<Point3<f64>> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    fn overlaps_box(&self, index: usize, bb: &TreeBoundBox) -> bool {
        bb.contains(&self.point(index))
    }

    fn overlaps_sphere(
        &self,
        index: usize,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> bool {
        (self.point(index) - centre).norm_squared() <= radius_sqr
    }

    fn find_nearest(
        &self,
        indices: &[usize],
        sample: &Point3<f64>,
        nearest: &mut Nearest,
    ) {
        for &i in indices {
            let p = self.point(i);
            nearest.update(i, p, (p - sample).norm_squared());
        }
    }
}

impl NearestToLine for PointShapes<'_> {
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
            let p = self.point(i);
            if !tightest.contains(&p) {
                continue;
            }
            let q = line.nearest_point(&p);
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

impl Classify for PointShapes<'_> {
    /// Points have no inside, so this is always `Unknown`
    fn volume_type(&self, _: &Octree<Self>, _: &Point3<f64>) -> VolumeType {
        VolumeType::Unknown
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::Settings;

    #[test]
    fn test_subset() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        let labels = [1, 3];
        let shapes = PointShapes::subset(&pts, &labels);
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes.shape_points(), vec![pts[1], pts[3]]);

        let bb = TreeBoundBox::new(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(4.0, 1.0, 1.0),
        );
        let tree = Octree::build(shapes, bb, Settings::default()).unwrap();
        let s = Point3::new(2.1, 0.0, 0.0);
        let hit = tree.find_nearest(&s, 100.0).unwrap();
        assert_eq!(hit.index, 1);
        assert_eq!(hit.point, pts[3]);
        assert_eq!(tree.shapes().point_label(hit.index), 3);
        assert_eq!(tree.classify(&Point3::origin()), VolumeType::Unknown);
    }
}
