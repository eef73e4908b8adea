//! Axis-aligned bounding boxes and the bit types used to address them
//!
//! Octants are numbered by their position relative to the box midpoint:
//!
//! ```text
//!         6 -------- 7
//!        /          /       Z
//!       / |        / |      ^  _ Y
//!      4----------5  |      | /
//!      |  |       |  |      |/
//!      |  2-------|--3      ---> X
//!      | /        | /
//!      |/         |/
//!      0----------1
//! ```
//!
//! i.e. bit 0 selects the upper half in X, bit 1 in Y, bit 2 in Z.
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Small relative scale (comparable to a few ULPs of 1.0)
pub const SMALL: f64 = 1e-15;
/// Very small absolute scale, used to guard divisions
pub const VSMALL: f64 = 1e-300;
/// Square root of [`VSMALL`]
pub const ROOT_VSMALL: f64 = 1e-150;
/// Large value used as "infinite" distance
pub const GREAT: f64 = 1e15;

/// Octant bit for the upper half along X
pub const RIGHT_HALF: u8 = 1;
/// Octant bit for the upper half along Y
pub const TOP_HALF: u8 = 2;
/// Octant bit for the upper half along Z
pub const FRONT_HALF: u8 = 4;

/// Strongly-typed octant, in the `0..8` range
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
pub struct Octant(u8);

impl Octant {
    /// Builds a new octant
    ///
    /// # Panics
    /// If `i >= 8`, which is not a valid octant
    pub const fn new(i: u8) -> Self {
        assert!(i < 8);
        Self(i)
    }
    /// Returns the octant as an index into a node's child array
    pub fn index(self) -> usize {
        self.0 as usize
    }
    /// Returns the raw octant bits
    pub fn bits(self) -> u8 {
        self.0
    }
    /// Iterates over all 8 octants
    pub fn iter() -> impl Iterator<Item = Self> {
        (0..8).map(Octant)
    }
    /// Checks whether the given half bit is set
    pub fn is_upper(self, half: u8) -> bool {
        self.0 & half != 0
    }
    /// Jumps to the octant on the other side of the masked half planes
    pub fn flip(self, mask: u8) -> Self {
        Octant((self.0 ^ mask) & 0b111)
    }
}

impl std::fmt::Display for Octant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// One of the six faces of a box
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum Face {
    Left,
    Right,
    Bottom,
    Top,
    Back,
    Front,
}

impl Face {
    /// Outward unit normal of the face
    pub fn normal(self) -> Vector3<f64> {
        match self {
            Face::Left => Vector3::new(-1.0, 0.0, 0.0),
            Face::Right => Vector3::new(1.0, 0.0, 0.0),
            Face::Bottom => Vector3::new(0.0, -1.0, 0.0),
            Face::Top => Vector3::new(0.0, 1.0, 0.0),
            Face::Back => Vector3::new(0.0, 0.0, -1.0),
            Face::Front => Vector3::new(0.0, 0.0, 1.0),
        }
    }
    /// Returns the single-face bit mask for this face
    pub fn bit(self) -> FaceBits {
        match self {
            Face::Left => FaceBits::LEFT,
            Face::Right => FaceBits::RIGHT,
            Face::Bottom => FaceBits::BOTTOM,
            Face::Top => FaceBits::TOP,
            Face::Back => FaceBits::BACK,
            Face::Front => FaceBits::FRONT,
        }
    }
}

/// Set of box faces (or half-spaces beyond them), packed as a bitmask
///
/// Used both for "which faces is this point on" and "which side of the box is
/// this point outside of".
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FaceBits(u8);

impl FaceBits {
    /// No face
    pub const NONE: Self = Self(0);
    /// Minimum X face
    pub const LEFT: Self = Self(1);
    /// Maximum X face
    pub const RIGHT: Self = Self(2);
    /// Minimum Y face
    pub const BOTTOM: Self = Self(4);
    /// Maximum Y face
    pub const TOP: Self = Self(8);
    /// Minimum Z face
    pub const BACK: Self = Self(16);
    /// Maximum Z face
    pub const FRONT: Self = Self(32);

    /// Checks whether no bits are set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
    /// Checks whether any bit of `other` is also set here
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
    /// Returns the raw bits
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for FaceBits {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FaceBits {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl std::ops::BitAnd for FaceBits {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl std::fmt::Display for FaceBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "noFace");
        }
        let names = [
            (Self::LEFT, "left"),
            (Self::RIGHT, "right"),
            (Self::BOTTOM, "bottom"),
            (Self::TOP, "top"),
            (Self::BACK, "back"),
            (Self::FRONT, "front"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.intersects(bit) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Axis-aligned bounding box used for octree nodes and spatial queries
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeBoundBox {
    /// Minimum corner
    pub min: Point3<f64>,
    /// Maximum corner
    pub max: Point3<f64>,
}

impl std::fmt::Display for TreeBoundBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({} {} {}) ({} {} {})",
            self.min.x,
            self.min.y,
            self.min.z,
            self.max.x,
            self.max.y,
            self.max.z
        )
    }
}

impl TreeBoundBox {
    /// Builds a box from its two corners
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Returns an inverted box, which grows to fit anything added to it
    pub fn inverted() -> Self {
        Self {
            min: Point3::new(GREAT, GREAT, GREAT),
            max: Point3::new(-GREAT, -GREAT, -GREAT),
        }
    }

    /// Returns a box covering (effectively) all of space
    pub fn great() -> Self {
        Self {
            min: Point3::new(-GREAT, -GREAT, -GREAT),
            max: Point3::new(GREAT, GREAT, GREAT),
        }
    }

    /// Builds the tightest box around a set of points
    ///
    /// An empty point set produces a zero-sized box at the origin.
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        if points.is_empty() {
            log::warn!("cannot find bounding box for an empty point set");
            return Self::new(Point3::origin(), Point3::origin());
        }
        let mut out = Self::inverted();
        for p in points {
            out.add_point(p);
        }
        out
    }

    /// Builds the tightest box around a subset of points
    pub fn from_indexed_points(
        points: &[Point3<f64>],
        indices: &[usize],
    ) -> Self {
        if indices.is_empty() {
            log::warn!("cannot find bounding box for an empty point set");
            return Self::new(Point3::origin(), Point3::origin());
        }
        let mut out = Self::inverted();
        for &i in indices {
            out.add_point(&points[i]);
        }
        out
    }

    /// Grows the box to include the given point
    pub fn add_point(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Checks that `min < max` along every axis
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] < self.max[i])
    }

    /// Returns `max - min`
    pub fn span(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Returns the center of the box
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Returns a copy grown on every side by `s` times the diagonal length
    ///
    /// Any flat axis gets a nonzero extent, so this also turns a planar or
    /// linear point cloud into a proper 3D box.
    pub fn extend(&self, s: f64) -> Self {
        let delta = s * self.span().norm();
        let d = Vector3::repeat(delta);
        Self::new(self.min - d, self.max + d)
    }

    /// Returns the position of the given corner
    pub fn corner(&self, octant: Octant) -> Point3<f64> {
        Point3::new(
            if octant.is_upper(RIGHT_HALF) {
                self.max.x
            } else {
                self.min.x
            },
            if octant.is_upper(TOP_HALF) {
                self.max.y
            } else {
                self.min.y
            },
            if octant.is_upper(FRONT_HALF) {
                self.max.z
            } else {
                self.min.z
            },
        )
    }

    /// Returns all 8 corners, in octant order
    pub fn points(&self) -> [Point3<f64>; 8] {
        std::array::from_fn(|i| self.corner(Octant::new(i as u8)))
    }

    /// Checks whether the point lies within the box (boundary inclusive)
    pub fn contains(&self, pt: &Point3<f64>) -> bool {
        (0..3).all(|i| pt[i] >= self.min[i] && pt[i] <= self.max[i])
    }

    /// Checks containment, treating a point on a face as outside if `dir`
    /// points out through that face
    pub fn contains_dir(&self, dir: &Vector3<f64>, pt: &Point3<f64>) -> bool {
        for i in 0..3 {
            if pt[i] < self.min[i] || (pt[i] == self.min[i] && dir[i] < 0.0) {
                return false;
            }
            if pt[i] > self.max[i] || (pt[i] == self.max[i] && dir[i] > 0.0) {
                return false;
            }
        }
        true
    }

    /// Checks whether any of the indexed points is inside the box
    pub fn contains_any(
        &self,
        points: &[Point3<f64>],
        indices: &[usize],
    ) -> bool {
        indices.iter().any(|&i| self.contains(&points[i]))
    }

    /// Checks whether two boxes overlap (touching counts as overlap)
    pub fn overlaps(&self, other: &TreeBoundBox) -> bool {
        (0..3).all(|i| {
            other.max[i] >= self.min[i] && other.min[i] <= self.max[i]
        })
    }

    /// Checks whether the box intersects the sphere around `centre`
    pub fn overlaps_sphere(
        &self,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> bool {
        let mut dist_sqr = 0.0;
        for i in 0..3 {
            let d0 = self.min[i] - centre[i];
            let d1 = self.max[i] - centre[i];
            if (d0 > 0.0) == (d1 > 0.0) {
                // Centre is outside the slab along this axis
                dist_sqr += d0.abs().min(d1.abs()).powi(2);
            }
            if dist_sqr > radius_sqr {
                return false;
            }
        }
        true
    }

    /// Returns the octant sub-box, splitting at the midpoint
    pub fn sub_box(&self, octant: Octant) -> TreeBoundBox {
        self.sub_box_at(&self.midpoint(), octant)
    }

    /// Returns the octant sub-box, splitting at the given point
    pub fn sub_box_at(
        &self,
        mid: &Point3<f64>,
        octant: Octant,
    ) -> TreeBoundBox {
        let mut out = *self;
        let halves = [RIGHT_HALF, TOP_HALF, FRONT_HALF];
        for (i, half) in halves.into_iter().enumerate() {
            if octant.is_upper(half) {
                out.min[i] = mid[i];
            } else {
                out.max[i] = mid[i];
            }
        }
        out
    }

    /// Returns the octant (relative to the midpoint) containing a point
    ///
    /// Points exactly on a split plane go to the lower half.
    pub fn sub_octant(&self, pt: &Point3<f64>) -> Octant {
        let mid = self.midpoint();
        let mut octant = 0;
        if pt.x > mid.x {
            octant |= RIGHT_HALF;
        }
        if pt.y > mid.y {
            octant |= TOP_HALF;
        }
        if pt.z > mid.z {
            octant |= FRONT_HALF;
        }
        Octant(octant)
    }

    /// Returns the octants ordered from nearest to furthest from `pt`
    ///
    /// The octant containing `pt` comes first, followed by the three octants
    /// sharing a face with it (closest split plane first), then the three
    /// sharing an edge, then the opposite corner.
    pub fn search_order(&self, pt: &Point3<f64>) -> [Octant; 8] {
        let dist = self.midpoint() - pt;
        let mut octant = 0;
        if dist.x < 0.0 {
            octant |= RIGHT_HALF;
        }
        if dist.y < 0.0 {
            octant |= TOP_HALF;
        }
        if dist.z < 0.0 {
            octant |= FRONT_HALF;
        }

        let mut axes = [
            (dist.x.abs(), RIGHT_HALF),
            (dist.y.abs(), TOP_HALF),
            (dist.z.abs(), FRONT_HALF),
        ];
        axes.sort_by(|a, b| a.0.total_cmp(&b.0));
        let [min, mid, max] = axes.map(|a| a.1);

        let o0 = octant;
        let o1 = o0 ^ min;
        let o2 = o0 ^ mid;
        let o3 = o0 ^ max;
        let o4 = o1 ^ mid;
        let o5 = o1 ^ max;
        let o6 = o2 ^ max;
        let o7 = o4 ^ max;
        [o0, o1, o2, o3, o4, o5, o6, o7].map(Octant)
    }

    /// Classifies a point as outside the box beyond each of its faces
    ///
    /// Returns [`FaceBits::NONE`] if the point is inside or on the box.
    pub fn pos_bits(&self, pt: &Point3<f64>) -> FaceBits {
        let mut bits = FaceBits::NONE;
        let lower = [FaceBits::LEFT, FaceBits::BOTTOM, FaceBits::BACK];
        let upper = [FaceBits::RIGHT, FaceBits::TOP, FaceBits::FRONT];
        for i in 0..3 {
            if pt[i] < self.min[i] {
                bits |= lower[i];
            } else if pt[i] > self.max[i] {
                bits |= upper[i];
            }
        }
        bits
    }

    /// Returns the faces that the point lies exactly on
    pub fn face_bits(&self, pt: &Point3<f64>) -> FaceBits {
        let mut bits = FaceBits::NONE;
        let lower = [FaceBits::LEFT, FaceBits::BOTTOM, FaceBits::BACK];
        let upper = [FaceBits::RIGHT, FaceBits::TOP, FaceBits::FRONT];
        for i in 0..3 {
            if pt[i] == self.min[i] {
                bits |= lower[i];
            } else if pt[i] == self.max[i] {
                bits |= upper[i];
            }
        }
        bits
    }

    /// Clips the segment `start → end` against the box
    ///
    /// `overall_start` and `overall_vec` describe the full line that the
    /// segment is part of; the clipped point is calculated against that line
    /// to avoid accumulating truncation errors.  Each clip snaps the
    /// coordinate to the exact box plane, so that [`pos_bits`] reports the
    /// clipped point as inside.
    ///
    /// Returns `(inside, point, faces)`: whether the segment reaches the box,
    /// the first point of the segment on or inside the box (or the last
    /// clipped point on a miss), and the faces that point lies on.
    ///
    /// [`pos_bits`]: TreeBoundBox::pos_bits
    pub fn clip(
        &self,
        overall_start: &Point3<f64>,
        overall_vec: &Vector3<f64>,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> (bool, Point3<f64>, FaceBits) {
        let end_bits = self.pos_bits(end);
        let mut pt = *start;

        // At most three clips are needed; a fourth pass reports the result
        for _ in 0..4 {
            let pt_bits = self.pos_bits(&pt);

            if pt_bits.is_empty() {
                return (true, pt, self.face_bits(&pt));
            }
            if pt_bits.intersects(end_bits) {
                // Both in the same outside half-space
                return (false, pt, self.face_bits(&pt));
            }

            let (axis, plane) = if pt_bits.intersects(FaceBits::LEFT) {
                (0, self.min.x)
            } else if pt_bits.intersects(FaceBits::RIGHT) {
                (0, self.max.x)
            } else if pt_bits.intersects(FaceBits::BOTTOM) {
                (1, self.min.y)
            } else if pt_bits.intersects(FaceBits::TOP) {
                (1, self.max.y)
            } else if pt_bits.intersects(FaceBits::BACK) {
                (2, self.min.z)
            } else {
                (2, self.max.z)
            };

            if overall_vec[axis].abs() > VSMALL {
                let s = (plane - overall_start[axis]) / overall_vec[axis];
                pt = overall_start + overall_vec * s;
            }
            // Parallel to this plane but still crossing the box planes, so
            // we must be close; just snap to the box.
            pt[axis] = plane;
        }

        // Can end up here if the end point is on an edge of the box
        (true, pt, self.face_bits(&pt))
    }

    /// Returns the first point of `start → end` inside the box, if any
    pub fn intersects(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Point3<f64>> {
        let (hit, pt, _) = self.clip(start, &(end - start), start, end);
        hit.then_some(pt)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit() -> TreeBoundBox {
        TreeBoundBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_sub_box() {
        let bb = unit();
        let sub = bb.sub_box(Octant::new(RIGHT_HALF | FRONT_HALF));
        assert_eq!(sub.min, Point3::new(0.5, 0.0, 0.5));
        assert_eq!(sub.max, Point3::new(1.0, 0.5, 1.0));
        for o in Octant::iter() {
            let sub = bb.sub_box(o);
            assert_eq!(bb.sub_octant(&sub.midpoint()), o);
        }
    }

    #[test]
    fn test_search_order() {
        let bb = unit();
        let order = bb.search_order(&Point3::new(0.9, 0.45, 0.1));
        assert_eq!(order[0], Octant::new(RIGHT_HALF));
        // Y split plane is nearest, so its neighbour comes next
        assert_eq!(order[1], Octant::new(RIGHT_HALF | TOP_HALF));
        assert_eq!(order[7], Octant::new(TOP_HALF | FRONT_HALF));

        let mut seen = [false; 8];
        for o in order {
            seen[o.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_pos_and_face_bits() {
        let bb = unit();
        assert_eq!(
            bb.pos_bits(&Point3::new(-1.0, 0.5, 2.0)),
            FaceBits::LEFT | FaceBits::FRONT
        );
        assert!(bb.pos_bits(&Point3::new(0.0, 0.5, 1.0)).is_empty());
        assert_eq!(
            bb.face_bits(&Point3::new(0.0, 0.5, 1.0)),
            FaceBits::LEFT | FaceBits::FRONT
        );
        assert_eq!(
            (FaceBits::LEFT | FaceBits::TOP).to_string(),
            "left+top".to_owned()
        );
        assert_eq!(FaceBits::NONE.to_string(), "noFace");
    }

    #[test]
    fn test_overlaps_sphere() {
        let bb = unit();
        assert!(bb.overlaps_sphere(&Point3::new(0.5, 0.5, 0.5), 0.0));
        assert!(bb.overlaps_sphere(&Point3::new(2.0, 0.5, 0.5), 1.0));
        assert!(!bb.overlaps_sphere(&Point3::new(2.0, 0.5, 0.5), 0.99));
        assert!(!bb.overlaps_sphere(&Point3::new(2.0, 2.0, 2.0), 2.9));
        assert!(bb.overlaps_sphere(&Point3::new(2.0, 2.0, 2.0), 3.0));
    }

    #[test]
    fn test_clip() {
        let bb = unit();
        let start = Point3::new(-1.0, 0.5, 0.5);
        let end = Point3::new(2.0, 0.5, 0.5);
        let pt = bb.intersects(&start, &end).unwrap();
        assert_eq!(pt, Point3::new(0.0, 0.5, 0.5));

        // Reverse direction clips against the other face
        let pt = bb.intersects(&end, &start).unwrap();
        assert_eq!(pt, Point3::new(1.0, 0.5, 0.5));

        // Passes above the box
        let miss = bb.intersects(
            &Point3::new(-1.0, 2.0, 0.5),
            &Point3::new(2.0, 2.0, 0.5),
        );
        assert!(miss.is_none());

        // Diagonal miss that needs two clips to decide
        let miss = bb.intersects(
            &Point3::new(-1.0, 0.5, 0.5),
            &Point3::new(0.5, 3.0, 0.5),
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_extend() {
        let flat = TreeBoundBox::from_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ]);
        assert!(!flat.is_valid());
        let bb = flat.extend(1e-4);
        assert!(bb.is_valid());
        assert!(bb.contains(&Point3::new(0.5, 0.5, 0.0)));
    }
}
