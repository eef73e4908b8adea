use super::{
    Classify, Intersect, Nearest, Shapes,
    geom::{
        EdgeAddressing, Segment, Triangle, face_area, face_centre,
        face_intersect, face_nearest, fan_triangles,
    },
};
use crate::{
    bounds::{GREAT, SMALL, TreeBoundBox, VSMALL},
    tree::{Octree, VolumeType, get_side},
};
use nalgebra::{Point3, Vector3};
use std::sync::OnceLock;

/// Edge and normal data for a patch, built on first use
#[derive(Clone, Debug)]
struct Topology {
    edges: EdgeAddressing,
    face_normals: Vec<Vector3<f64>>,
    /// Indexed by point; zero for points not used by any face
    point_normals: Vec<Vector3<f64>>,
}

impl Topology {
    fn new(
        points: &[Point3<f64>],
        faces: &[Vec<usize>],
        areas: &[Vector3<f64>],
    ) -> Self {
        let face_normals: Vec<Vector3<f64>> = areas
            .iter()
            .map(|a| a / (a.norm() + VSMALL))
            .collect();

        let mut point_normals = vec![Vector3::zeros(); points.len()];
        for (f, n) in faces.iter().zip(&face_normals) {
            for &p in f {
                point_normals[p] += n;
            }
        }
        for n in &mut point_normals {
            let len = n.norm() + VSMALL;
            *n /= len;
        }

        Self {
            edges: EdgeAddressing::new(faces),
            face_normals,
            point_normals,
        }
    }
}

/// Shape collection where each shape is a planar (or nearly planar) polygon
///
/// Faces are lists of indices into a point list, ordered so that their
/// right-hand normal points out of the enclosed volume.  Polygons with more
/// than three vertices are treated as a fan of triangles around the face
/// centre.
///
/// If the faces form a closed surface, the tree can classify points as
/// inside or outside of it (see [`Octree::classify`]).
#[derive(Clone, Debug)]
pub struct PatchShapes<'a> {
    points: &'a [Point3<f64>],
    faces: &'a [Vec<usize>],
    centres: Vec<Point3<f64>>,
    areas: Vec<Vector3<f64>>,

    /// Relative tolerance for hit tests and for locating a hit on the face
    planar_tol: f64,

    /// Per-face bounding boxes, for quick rejection
    bbs: Option<Vec<TreeBoundBox>>,

    topology: OnceLock<Topology>,
}

impl<'a> PatchShapes<'a> {
    /// Default planar tolerance
    pub const DEFAULT_PLANAR_TOL: f64 = 10.0 * SMALL;

    /// Builds a new patch from a point list and faces
    pub fn new(points: &'a [Point3<f64>], faces: &'a [Vec<usize>]) -> Self {
        let centres = faces.iter().map(|f| face_centre(points, f)).collect();
        let areas = faces.iter().map(|f| face_area(points, f)).collect();
        Self {
            points,
            faces,
            centres,
            areas,
            planar_tol: Self::DEFAULT_PLANAR_TOL,
            bbs: None,
            topology: OnceLock::new(),
        }
    }

    /// Precomputes a bounding box for every face
    pub fn with_cached_bounds(mut self) -> Self {
        let bbs = self
            .faces
            .iter()
            .map(|f| TreeBoundBox::from_indexed_points(self.points, f))
            .collect();
        self.bbs = Some(bbs);
        self
    }

    /// Sets the planar tolerance
    pub fn with_planar_tol(mut self, planar_tol: f64) -> Self {
        self.planar_tol = planar_tol;
        self
    }

    /// Returns the point indices of a face
    pub fn face(&self, index: usize) -> &[usize] {
        &self.faces[index]
    }

    /// Returns the centre of a face
    pub fn face_centre(&self, index: usize) -> Point3<f64> {
        self.centres[index]
    }

    /// Returns the area vector of a face
    pub fn face_area(&self, index: usize) -> Vector3<f64> {
        self.areas[index]
    }

    fn topology(&self) -> &Topology {
        self.topology.get_or_init(|| {
            Topology::new(self.points, self.faces, &self.areas)
        })
    }

    fn face_bounds(&self, index: usize) -> TreeBoundBox {
        match &self.bbs {
            Some(bbs) => bbs[index],
            None => TreeBoundBox::from_indexed_points(
                self.points,
                &self.faces[index],
            ),
        }
    }

    fn triangles(&self, index: usize) -> impl Iterator<Item = Triangle> + '_ {
        let f = &self.faces[index];
        let fan = (f.len() != 3).then(|| {
            fan_triangles(self.points, f, self.centres[index])
        });
        let tri = (f.len() == 3).then(|| {
            let p = |i: usize| self.points[f[i]];
            Triangle::new(p(0), p(1), p(2))
        });
        fan.into_iter().flatten().chain(tri)
    }

    /// Finds the nearest point on a face, and whether it is in the interior
    fn nearest_on_face(
        &self,
        index: usize,
        sample: &Point3<f64>,
    ) -> (Point3<f64>, bool) {
        let f = &self.faces[index];
        face_nearest(self.points, f, &self.centres[index], sample)
    }

    /// Works out the outward normal at the nearest point of a face, then
    /// compares it with the direction to the sample
    fn side_of_face(&self, index: usize, sample: &Point3<f64>) -> VolumeType {
        let (pt, interior) = self.nearest_on_face(index, sample);
        let area = self.areas[index];
        let v = sample - pt;
        if interior {
            return get_side(&area, &v);
        }

        let f = &self.faces[index];
        let fc = self.centres[index];
        let typ_dim_sqr = area.norm() + VSMALL;
        let near = |q: &Point3<f64>| {
            (q - pt).norm_squared() / typ_dim_sqr < self.planar_tol
        };
        let topo = self.topology();

        // On a face vertex
        if let Some(&p) = f.iter().find(|&&p| near(&self.points[p])) {
            return get_side(&topo.point_normals[p], &v);
        }

        // On the face centre
        if near(&fc) {
            return get_side(&area, &v);
        }

        // On an edge shared with other faces
        for &e in &topo.edges.face_edges[index] {
            let [a, b] = topo.edges.edges[e];
            let s = Segment::new(self.points[a], self.points[b]);
            if near(&s.nearest_point(sample)) {
                let n: Vector3<f64> = topo.edges.edge_faces[e]
                    .iter()
                    .map(|&j| topo.face_normals[j])
                    .sum();
                return get_side(&n, &v);
            }
        }

        // On an edge between two fan triangles
        let len = f.len();
        for i in 0..len {
            let p = self.points[f[i]];
            if near(&Segment::new(p, fc).nearest_point(sample)) {
                let e = p - fc;
                let prev = self.points[f[(i + len - 1) % len]] - fc;
                let next = self.points[f[(i + 1) % len]] - fc;

                let left = prev.cross(&e);
                let left = left / (left.norm() + VSMALL);
                let right = e.cross(&next);
                let right = right / (right.norm() + VSMALL);
                return get_side(&((left + right) * 0.5), &v);
            }
        }

        // Bad tolerances or an open surface
        log::debug!(
            "could not place {pt:?} on face {index} (nearest to {sample:?})"
        );
        VolumeType::Unknown
    }
}

impl Shapes for PatchShapes<'_> {
    fn len(&self) -> usize {
        self.faces.len()
    }

    fn shape_points(&self) -> Vec<Point3<f64>> {
        self.centres.clone()
    }

    fn overlaps_box(&self, index: usize, bb: &TreeBoundBox) -> bool {
        if !self.face_bounds(index).overlaps(bb) {
            return false;
        }
        if bb.contains_any(self.points, &self.faces[index]) {
            return true;
        }
        self.triangles(index).any(|t| t.overlaps_box(bb))
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
        let (p, _) = self.nearest_on_face(index, centre);
        (p - centre).norm_squared() <= radius_sqr
    }

    fn find_nearest(
        &self,
        indices: &[usize],
        sample: &Point3<f64>,
        nearest: &mut Nearest,
    ) {
        for &i in indices {
            let (p, _) = self.nearest_on_face(i, sample);
            nearest.update(i, p, (p - sample).norm_squared());
        }
    }
}

impl Intersect for PatchShapes<'_> {
    fn intersect(
        &self,
        index: usize,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Point3<f64>> {
        if let Some(bbs) = &self.bbs {
            let bb = &bbs[index];
            if bb.pos_bits(start).intersects(bb.pos_bits(end)) {
                // Both ends outside the face box, on the same side
                return None;
            }
        }
        let dir = end - start;
        face_intersect(
            self.points,
            &self.faces[index],
            &self.centres[index],
            start,
            &dir,
            self.planar_tol,
        )
        .and_then(|(p, t)| (t <= 1.0).then_some(p))
    }
}

impl Classify for PatchShapes<'_> {
    /// Classifies a point using the nearest face
    ///
    /// Returns `Unknown` if the tree has no faces.
    fn volume_type(
        &self,
        tree: &Octree<Self>,
        sample: &Point3<f64>,
    ) -> VolumeType {
        match tree.find_nearest(sample, GREAT * GREAT) {
            Some(hit) => self.side_of_face(hit.index, sample),
            None => {
                log::debug!("no face within reach of {sample:?}");
                VolumeType::Unknown
            }
        }
    }
}
