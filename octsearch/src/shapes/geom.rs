//! Geometric kernels for segments, triangles and polygonal faces
use crate::bounds::{Octant, TreeBoundBox, VSMALL};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

/// Line segment between two points
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    /// Start point
    pub start: Point3<f64>,
    /// End point
    pub end: Point3<f64>,
}

impl Segment {
    /// Builds a new segment
    pub fn new(start: Point3<f64>, end: Point3<f64>) -> Self {
        Self { start, end }
    }

    /// Returns `end - start`
    pub fn vec(&self) -> Vector3<f64> {
        self.end - self.start
    }

    /// Returns the midpoint
    pub fn centre(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.end)
    }

    /// Returns the point at parameter `t` (0 at start, 1 at end)
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.start + self.vec() * t
    }

    /// Returns the point on the segment nearest to `p`
    pub fn nearest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let d = self.vec();
        let len_sqr = d.norm_squared();
        if len_sqr < VSMALL {
            return self.start;
        }
        let t = ((p - self.start).dot(&d) / len_sqr).clamp(0.0, 1.0);
        self.at(t)
    }

    /// Returns the closest pair of points `(on self, on other)`
    pub fn nearest_points(
        &self,
        other: &Segment,
    ) -> (Point3<f64>, Point3<f64>) {
        let d1 = self.vec();
        let d2 = other.vec();
        let r = self.start - other.start;
        let a = d1.norm_squared();
        let e = d2.norm_squared();
        let f = d2.dot(&r);

        if a < VSMALL && e < VSMALL {
            return (self.start, other.start);
        }
        let (s, t) = if a < VSMALL {
            (0.0, (f / e).clamp(0.0, 1.0))
        } else {
            let c = d1.dot(&r);
            if e < VSMALL {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(&d2);
                let denom = a * e - b * b;
                let mut s = if denom > VSMALL {
                    ((b * f - c * e) / denom).clamp(0.0, 1.0)
                } else {
                    // Parallel
                    0.0
                };
                let mut t = (b * s + f) / e;
                if t < 0.0 {
                    t = 0.0;
                    s = (-c / a).clamp(0.0, 1.0);
                } else if t > 1.0 {
                    t = 1.0;
                    s = ((b - c) / a).clamp(0.0, 1.0);
                }
                (s, t)
            }
        };
        (self.at(s), other.at(t))
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Part of a triangle in which a nearest point lies
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TriRegion {
    /// Strictly inside the triangle
    Interior,
    /// On the given edge (`0` is `a-b`, `1` is `b-c`, `2` is `c-a`)
    Edge(u8),
    /// On the given vertex
    Vertex(u8),
}

/// Triangle given by its three corners
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    #[allow(missing_docs)]
    pub a: Point3<f64>,
    #[allow(missing_docs)]
    pub b: Point3<f64>,
    #[allow(missing_docs)]
    pub c: Point3<f64>,
}

impl Triangle {
    /// Builds a new triangle
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self { a, b, c }
    }

    /// Area vector, with length equal to the area and direction given by
    /// the right-hand rule
    pub fn area(&self) -> Vector3<f64> {
        (self.b - self.a).cross(&(self.c - self.a)) * 0.5
    }

    /// Returns the centroid
    pub fn centre(&self) -> Point3<f64> {
        Point3::from((self.a.coords + self.b.coords + self.c.coords) / 3.0)
    }

    /// Returns the edges, in the order used by [`TriRegion::Edge`]
    pub fn edges(&self) -> [Segment; 3] {
        [
            Segment::new(self.a, self.b),
            Segment::new(self.b, self.c),
            Segment::new(self.c, self.a),
        ]
    }

    /// Returns the nearest point on the triangle and where it lies
    pub fn nearest_point(&self, p: &Point3<f64>) -> (Point3<f64>, TriRegion) {
        let (a, b, c) = (self.a, self.b, self.c);
        let ab = b - a;
        let ac = c - a;

        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return (a, TriRegion::Vertex(0));
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return (b, TriRegion::Vertex(1));
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return (a + ab * v, TriRegion::Edge(0));
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return (c, TriRegion::Vertex(2));
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return (a + ac * w, TriRegion::Edge(2));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return (b + (c - b) * w, TriRegion::Edge(1));
        }

        let sum = va + vb + vc;
        if sum.abs() < VSMALL {
            // Degenerate triangle; fall back to its edges
            return self.nearest_on_edges(p);
        }
        let v = vb / sum;
        let w = vc / sum;
        (a + ab * v + ac * w, TriRegion::Interior)
    }

    fn nearest_on_edges(&self, p: &Point3<f64>) -> (Point3<f64>, TriRegion) {
        let mut best = (self.a, TriRegion::Vertex(0));
        let mut best_dist = f64::INFINITY;
        for (i, e) in self.edges().iter().enumerate() {
            let q = e.nearest_point(p);
            let d = (q - p).norm_squared();
            if d < best_dist {
                best_dist = d;
                best = (q, TriRegion::Edge(i as u8));
            }
        }
        best
    }

    /// Intersects a half-ray `start + t * dir` (with `t >= 0`) with the
    /// triangle
    ///
    /// `tol` is a relative tolerance which grows the triangle slightly, so
    /// that rays through shared edges hit at least one neighbour.  Returns
    /// the hit point and `t`.
    pub fn intersect_ray(
        &self,
        start: &Point3<f64>,
        dir: &Vector3<f64>,
        tol: f64,
    ) -> Option<(Point3<f64>, f64)> {
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;
        let pvec = dir.cross(&e2);
        let det = e1.dot(&pvec);
        if det.abs() < VSMALL {
            return None;
        }
        let inv = 1.0 / det;

        let tvec = start - self.a;
        let u = tvec.dot(&pvec) * inv;
        if u < -tol || u > 1.0 + tol {
            return None;
        }
        let qvec = tvec.cross(&e1);
        let v = dir.dot(&qvec) * inv;
        if v < -tol || u + v > 1.0 + tol {
            return None;
        }
        let t = e2.dot(&qvec) * inv;
        if t < 0.0 {
            return None;
        }
        Some((start + dir * t, t))
    }

    /// Checks whether the triangle intersects a box
    pub fn overlaps_box(&self, bb: &TreeBoundBox) -> bool {
        let pts = [self.a, self.b, self.c];
        if pts.iter().any(|p| bb.contains(p)) {
            return true;
        }
        if self
            .edges()
            .iter()
            .any(|e| bb.intersects(&e.start, &e.end).is_some())
        {
            return true;
        }
        // The triangle may still cut through the box without any of its
        // edges entering it, so check the box edges against the triangle
        box_edges(bb).iter().any(|e| {
            self.intersect_ray(&e.start, &e.vec(), 0.0)
                .is_some_and(|(_, t)| t <= 1.0)
        })
    }
}

/// Returns the 12 edges of a box
pub fn box_edges(bb: &TreeBoundBox) -> [Segment; 12] {
    let corners = bb.points();
    let mut out = [Segment::new(corners[0], corners[0]); 12];
    let mut n = 0;
    for o in Octant::iter() {
        for bit in [1, 2, 4] {
            if o.bits() & bit == 0 {
                let other = o.flip(bit);
                out[n] =
                    Segment::new(corners[o.index()], corners[other.index()]);
                n += 1;
            }
        }
    }
    out
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the average of a face's vertices
fn vertex_average(points: &[Point3<f64>], face: &[usize]) -> Point3<f64> {
    let sum = face
        .iter()
        .fold(Vector3::zeros(), |acc, &i| acc + points[i].coords);
    Point3::from(sum / face.len().max(1) as f64)
}

/// Iterates over the fan triangles of a polygon around a central point
pub fn fan_triangles<'a>(
    points: &'a [Point3<f64>],
    face: &'a [usize],
    centre: Point3<f64>,
) -> impl Iterator<Item = Triangle> + 'a {
    (0..face.len()).map(move |i| {
        let next = face[(i + 1) % face.len()];
        Triangle::new(points[face[i]], points[next], centre)
    })
}

/// Returns the area-weighted centre of a polygonal face
pub fn face_centre(points: &[Point3<f64>], face: &[usize]) -> Point3<f64> {
    if face.len() == 3 {
        return Triangle::new(
            points[face[0]],
            points[face[1]],
            points[face[2]],
        )
        .centre();
    }
    let mid = vertex_average(points, face);
    let normal = face_area(points, face);
    let mut sum = Vector3::zeros();
    let mut weight = 0.0;
    for t in fan_triangles(points, face, mid) {
        // Signed area, in case of a warped or concave face
        let a = t.area().dot(&normal);
        sum += t.centre().coords * a;
        weight += a;
    }
    if weight.abs() > VSMALL {
        Point3::from(sum / weight)
    } else {
        mid
    }
}

/// Returns the area vector of a polygonal face
pub fn face_area(points: &[Point3<f64>], face: &[usize]) -> Vector3<f64> {
    if face.len() == 3 {
        return Triangle::new(
            points[face[0]],
            points[face[1]],
            points[face[2]],
        )
        .area();
    }
    let mid = vertex_average(points, face);
    fan_triangles(points, face, mid).map(|t| t.area()).sum()
}

/// Returns the nearest point on a polygonal face, and whether it is in the
/// face interior
///
/// Polygons are split into a fan around `centre`; the nearest point only
/// counts as interior if it is inside one of the fan triangles.
pub fn face_nearest(
    points: &[Point3<f64>],
    face: &[usize],
    centre: &Point3<f64>,
    sample: &Point3<f64>,
) -> (Point3<f64>, bool) {
    if face.len() == 3 {
        let t =
            Triangle::new(points[face[0]], points[face[1]], points[face[2]]);
        let (p, r) = t.nearest_point(sample);
        return (p, r == TriRegion::Interior);
    }
    let mut best = (*centre, false);
    let mut best_dist = f64::INFINITY;
    for t in fan_triangles(points, face, *centre) {
        let (p, r) = t.nearest_point(sample);
        let d = (p - sample).norm_squared();
        if d < best_dist {
            best_dist = d;
            best = (p, r == TriRegion::Interior);
        }
    }
    best
}

/// Intersects a half-ray with a polygonal face
///
/// Returns the hit point and its parameter along `dir`.
pub fn face_intersect(
    points: &[Point3<f64>],
    face: &[usize],
    centre: &Point3<f64>,
    start: &Point3<f64>,
    dir: &Vector3<f64>,
    tol: f64,
) -> Option<(Point3<f64>, f64)> {
    if face.len() == 3 {
        let t =
            Triangle::new(points[face[0]], points[face[1]], points[face[2]]);
        return t.intersect_ray(start, dir, tol);
    }
    fan_triangles(points, face, *centre)
        .filter_map(|t| t.intersect_ray(start, dir, tol))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Edge connectivity of a set of polygonal faces
#[derive(Clone, Debug, Default)]
pub struct EdgeAddressing {
    /// Unique edges, as sorted point pairs
    pub edges: Vec<[usize; 2]>,
    /// Edges of each face, in face order
    pub face_edges: Vec<Vec<usize>>,
    /// Faces using each edge
    pub edge_faces: Vec<Vec<usize>>,
}

impl EdgeAddressing {
    /// Collects the edges of every face
    pub fn new(faces: &[Vec<usize>]) -> Self {
        let mut out = Self {
            face_edges: Vec::with_capacity(faces.len()),
            ..Self::default()
        };
        let mut edge_map = HashMap::new();
        for (fi, f) in faces.iter().enumerate() {
            let mut fe = Vec::with_capacity(f.len());
            for (i, &a) in f.iter().enumerate() {
                let b = f[(i + 1) % f.len()];
                let key = [a.min(b), a.max(b)];
                let e = *edge_map.entry(key).or_insert_with(|| {
                    out.edges.push(key);
                    out.edge_faces.push(vec![]);
                    out.edges.len() - 1
                });
                out.edge_faces[e].push(fi);
                fe.push(e);
            }
            out.face_edges.push(fe);
        }
        out
    }
}
