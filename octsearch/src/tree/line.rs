//! Line intersection by walking the octree from octant to octant
//!
//! The walk starts in the leaf octant containing the start of the segment.
//! Within each octant, the segment is tested against the bucket's shapes;
//! if nothing is hit, we find where the segment leaves the octant, nudge
//! that point across the exit face, and step to the neighbouring octant.
//!
//! Points which land exactly on octant edges or corners are ambiguous, so
//! they are pushed by a small relative distance (see
//! [`Settings::perturb_tol`](super::Settings::perturb_tol)) onto a single
//! face or across it.
use super::{Hit, OctantRef, Octree};
use crate::{
    bounds::{
        FRONT_HALF, Face, FaceBits, Octant, RIGHT_HALF, ROOT_VSMALL, TOP_HALF,
        TreeBoundBox,
    },
    shapes::Intersect,
};
use arrayvec::ArrayVec;
use nalgebra::{Point3, Vector3};

/// Pushes a point near any face of `bb` to well inside or outside that face
pub(crate) fn push_point(
    bb: &TreeBoundBox,
    pt: &Point3<f64>,
    inside: bool,
    tol: f64,
) -> Point3<f64> {
    let perturb = bb.span() * tol;
    let mut out = *pt;
    for i in 0..3 {
        let d = perturb[i].abs() + ROOT_VSMALL;
        if (pt[i] - bb.min[i]).abs() < perturb[i].abs() {
            out[i] = if inside { bb.min[i] + d } else { bb.min[i] - d };
        } else if (pt[i] - bb.max[i]).abs() < perturb[i].abs() {
            out[i] = if inside { bb.max[i] - d } else { bb.max[i] + d };
        }
    }
    out
}

/// Pushes a point on the given faces of `bb` inside or outside of them
///
/// # Panics
/// If `faces` is empty
pub(crate) fn push_point_faces(
    bb: &TreeBoundBox,
    faces: FaceBits,
    pt: &Point3<f64>,
    inside: bool,
    tol: f64,
) -> Point3<f64> {
    assert!(!faces.is_empty(), "cannot push point {pt:?} off no faces");
    let perturb = bb.span() * tol;
    let mut out = *pt;
    let axes = [
        (FaceBits::LEFT, FaceBits::RIGHT),
        (FaceBits::BOTTOM, FaceBits::TOP),
        (FaceBits::BACK, FaceBits::FRONT),
    ];
    for (i, (lo, hi)) in axes.into_iter().enumerate() {
        let d = perturb[i] + ROOT_VSMALL;
        if faces.intersects(lo) {
            out[i] = if inside { bb.min[i] + d } else { bb.min[i] - d };
        } else if faces.intersects(hi) {
            out[i] = if inside { bb.max[i] - d } else { bb.max[i] + d };
        }
    }
    out
}

/// Moves a point that lies on several faces of `bb` onto exactly one
///
/// The kept face is the one whose normal is most parallel to `dir`; the
/// point is then pushed away from that face's edges.  Points on no face
/// are returned unchanged.
pub(crate) fn push_point_into_face(
    bb: &TreeBoundBox,
    dir: &Vector3<f64>,
    pt: &Point3<f64>,
    tol: f64,
) -> Point3<f64> {
    let bits = bb.face_bits(pt);
    let mut faces: ArrayVec<Face, 3> = ArrayVec::new();
    for (lo, hi) in [
        (Face::Left, Face::Right),
        (Face::Bottom, Face::Top),
        (Face::Back, Face::Front),
    ] {
        if bits.intersects(lo.bit()) {
            faces.push(lo);
        } else if bits.intersects(hi.bit()) {
            faces.push(hi);
        }
    }

    let mut keep = match faces.first() {
        Some(f) => *f,
        None => return *pt,
    };
    let mut best = keep.normal().dot(dir).abs();
    for f in faces.iter().skip(1) {
        let s = f.normal().dot(dir).abs();
        if s > best {
            best = s;
            keep = *f;
        }
    }

    let mut out = push_point(bb, pt, true, tol);
    match keep {
        Face::Left => out.x = bb.min.x,
        Face::Right => out.x = bb.max.x,
        Face::Bottom => out.y = bb.min.y,
        Face::Top => out.y = bb.max.y,
        Face::Back => out.z = bb.min.z,
        Face::Front => out.z = bb.max.z,
    }
    out
}

/// Position along a line walk
struct Walk {
    hit: Option<Hit>,
    point: Point3<f64>,
}

impl<S: Intersect> Octree<S> {
    /// Finds the intersection nearest to `start` along `start → end`
    pub fn find_line(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Hit> {
        self.find_line_with(start, end, |i, a, b| {
            self.shapes.intersect(i, a, b)
        })
    }

    /// Finds any intersection along `start → end`
    ///
    /// This is cheaper than [`find_line`](Octree::find_line), but the
    /// returned hit is not necessarily the nearest.
    pub fn find_line_any(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Option<Hit> {
        self.find_line_any_with(start, end, |i, a, b| {
            self.shapes.intersect(i, a, b)
        })
    }

    /// Finds every intersection along `start → end`, nearest first
    ///
    /// Each shape is reported at most once.
    pub fn find_all_intersections(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
    ) -> Vec<Hit> {
        let mut out: Vec<Hit> = vec![];
        while let Some(hit) = self.find_line_with(start, end, |i, a, b| {
            if out.iter().any(|h| h.index == i) {
                None
            } else {
                self.shapes.intersect(i, a, b)
            }
        }) {
            out.push(hit);
        }
        out
    }
}

impl<S> Octree<S> {
    /// Finds the nearest intersection using a custom intersection operator
    ///
    /// The operator is called with a shape index and a segment, and returns
    /// the point at which the shape intersects it (if any).
    pub fn find_line_with<F>(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
        mut op: F,
    ) -> Option<Hit>
    where
        F: FnMut(usize, &Point3<f64>, &Point3<f64>) -> Option<Point3<f64>>,
    {
        self.find_line_inner(false, start, end, &mut op)
    }

    /// Finds any intersection using a custom intersection operator
    pub fn find_line_any_with<F>(
        &self,
        start: &Point3<f64>,
        end: &Point3<f64>,
        mut op: F,
    ) -> Option<Hit>
    where
        F: FnMut(usize, &Point3<f64>, &Point3<f64>) -> Option<Point3<f64>>,
    {
        self.find_line_inner(true, start, end, &mut op)
    }

    fn find_line_inner<F>(
        &self,
        find_any: bool,
        start: &Point3<f64>,
        end: &Point3<f64>,
        op: &mut F,
    ) -> Option<Hit>
    where
        F: FnMut(usize, &Point3<f64>, &Point3<f64>) -> Option<Point3<f64>>,
    {
        let bb = self.nodes.first()?.bb;

        let start_bits = bb.pos_bits(start);
        let end_bits = bb.pos_bits(end);
        if start_bits.intersects(end_bits) {
            // Both ends outside the tree, on the same side
            return None;
        }

        // Trim the segment to the tree bounds
        let track_start = if start_bits.is_empty() {
            *start
        } else {
            bb.intersects(start, end)?
        };
        let track_end = if end_bits.is_empty() {
            *end
        } else {
            bb.intersects(end, &track_start)?
        };

        let (node, octant) = self.find_node_from(0, &track_start);
        self.walk_line(
            find_any,
            &track_start,
            &track_end,
            node,
            octant,
            op,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_line<F>(
        &self,
        find_any: bool,
        tree_start: &Point3<f64>,
        tree_end: &Point3<f64>,
        start_node: usize,
        start_octant: Octant,
        op: &mut F,
        verbose: bool,
    ) -> Option<Hit>
    where
        F: FnMut(usize, &Point3<f64>, &Point3<f64>) -> Option<Point3<f64>>,
    {
        let tol = self.settings.perturb_tol;
        let tree_vec = tree_end - tree_start;

        let mut node = start_node;
        let mut octant = start_octant;
        let mut walk = Walk {
            hit: None,
            point: *tree_start,
        };

        if verbose {
            log::trace!(
                "walking line {tree_start:?} -> {tree_end:?} from node \
                 {node} octant {octant} bb {}",
                self.sub_bounds(node, octant)
            );
        }

        for step in 0..self.settings.max_walk_steps {
            let octant_bb = self.sub_bounds(node, octant);

            // Make sure the point is away from edges and corners
            let start_point =
                push_point_into_face(&octant_bb, &tree_vec, &walk.point, tol);

            if verbose {
                log::trace!(
                    "step {step} at {:?} (perturbed {start_point:?}), node \
                     {node} octant {octant} bb {octant_bb}",
                    walk.point
                );
            }

            let faces = self.traverse_node(
                find_any,
                &start_point,
                tree_end,
                node,
                octant,
                &mut walk,
                op,
            );

            if walk.hit.is_some() {
                return walk.hit;
            }
            if faces.is_empty() || walk.point == *tree_end {
                // End point is inside the tree
                return None;
            }

            // Nudge the exit point across the exit face(s)
            let perturbed =
                push_point_faces(&octant_bb, faces, &walk.point, false, tol);

            if verbose {
                log::trace!(
                    "  step {step} exits through {faces} at {:?}, walking \
                     to neighbour containing {perturbed:?}",
                    walk.point
                );
            }

            match self.walk_to_neighbour(&perturbed, faces, node, octant) {
                Some((n, o)) => {
                    node = n;
                    octant = o;
                }
                // Left the tree
                None => return None,
            }
        }

        if !verbose {
            // Repeat the walk with logging, to help diagnose the loop
            return self.walk_line(
                find_any,
                tree_start,
                tree_end,
                start_node,
                start_octant,
                op,
                true,
            );
        }
        let msg = format!(
            "got stuck in loop raytracing from {tree_start:?} to \
             {tree_end:?} inside top box {}",
            self.sub_bounds(start_node, start_octant)
        );
        if self.settings.strict {
            panic!("{msg}");
        }
        log::warn!("{msg}");
        walk.hit
    }

    /// Tests the segment against the contents of a single octant
    ///
    /// On a miss, `walk.point` is moved to the point where the segment
    /// leaves the octant, and the faces of that exit point are returned.
    #[allow(clippy::too_many_arguments)]
    fn traverse_node<F>(
        &self,
        find_any: bool,
        start: &Point3<f64>,
        end: &Point3<f64>,
        node: usize,
        octant: Octant,
        walk: &mut Walk,
        op: &mut F,
    ) -> FaceBits
    where
        F: FnMut(usize, &Point3<f64>, &Point3<f64>) -> Option<Point3<f64>>,
    {
        let octant_bb = self.sub_bounds(node, octant);

        if let OctantRef::Content(c) = self.nodes[node].children[octant.index()]
        {
            let indices = &self.contents[c];
            if find_any {
                // The hit may be in a neighbouring octant, which is fine
                for &i in indices {
                    if let Some(pt) = op(i, start, end) {
                        walk.hit = Some(Hit {
                            index: i,
                            point: pt,
                        });
                        walk.point = pt;
                        return FaceBits::NONE;
                    }
                }
            } else {
                // Hits outside this octant are skipped, to keep strict
                // ordering; they'll be found when we get to that octant
                let mut nearest = *end;
                for &i in indices {
                    if let Some(pt) = op(i, start, &nearest) {
                        if octant_bb.contains(&pt) {
                            nearest = pt;
                            walk.hit = Some(Hit {
                                index: i,
                                point: pt,
                            });
                            walk.point = pt;
                        }
                    }
                }
                if walk.hit.is_some() {
                    return FaceBits::NONE;
                }
            }
        }

        // Nothing was hit, so trace back from the end to find where the
        // segment leaves this octant
        let (inside, pt, faces) =
            octant_bb.clip(end, &(start - end), end, start);
        if inside {
            walk.point = pt;
            return faces;
        }

        // The end point is on a face or edge of the octant; push it outside
        // and try again.
        let end = push_point(&octant_bb, end, false, self.settings.perturb_tol);
        let (inside, pt, faces) =
            octant_bb.clip(&end, &(start - end), &end, start);
        if inside {
            walk.point = pt;
            faces
        } else {
            FaceBits::NONE
        }
    }

    /// Returns the parent of a node, and the octant it occupies there
    ///
    /// # Panics
    /// If the parent does not refer back to the node
    fn walk_to_parent(&self, node: usize) -> Option<(usize, Octant)> {
        let parent = self.nodes[node].parent?;
        let octant = Octant::iter()
            .find(|o| {
                self.nodes[parent].children[o.index()] == OctantRef::Node(node)
            })
            .unwrap_or_else(|| {
                panic!("no octant in parent {parent} refers to node {node}")
            });
        Some((parent, octant))
    }

    /// Steps from the given octant to its neighbour across `faces`
    ///
    /// Returns `None` if the neighbour would be outside of the tree.
    fn walk_to_neighbour(
        &self,
        face_point: &Point3<f64>,
        faces: FaceBits,
        mut node: usize,
        mut octant: Octant,
    ) -> Option<(usize, Octant)> {
        // To go in a direction, we need to be in the octant on the far side
        // of it, e.g. moving left requires an octant in the right half.
        let mut mask = 0;
        let mut wanted = 0;
        for (half, lo, hi) in [
            (RIGHT_HALF, FaceBits::LEFT, FaceBits::RIGHT),
            (TOP_HALF, FaceBits::BOTTOM, FaceBits::TOP),
            (FRONT_HALF, FaceBits::BACK, FaceBits::FRONT),
        ] {
            if faces.intersects(lo) {
                mask |= half;
                wanted |= half;
            } else if faces.intersects(hi) {
                mask |= half;
            }
        }

        // Climb until we can cross in the wanted directions
        while wanted != (octant.bits() & mask) {
            // Drop directions which are not on the boundary of the parent
            for half in [RIGHT_HALF, TOP_HALF, FRONT_HALF] {
                if (wanted & half != 0) == octant.is_upper(half) {
                    mask &= !half;
                    wanted &= !half;
                }
            }
            (node, octant) = self.walk_to_parent(node)?;
        }

        // Jump to the other half in each masked direction
        octant = octant.flip(mask);

        // Descend to the leaf containing the point
        let child = self.nodes[node].children[octant.index()];
        if let OctantRef::Node(child) = child {
            (node, octant) = self.find_node_from(child, face_point);
        }
        Some((node, octant))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{shapes::EdgeShapes, tree::Settings};

    fn unit() -> TreeBoundBox {
        TreeBoundBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_push_point() {
        let bb = unit();
        let p = push_point(&bb, &Point3::new(0.0, 0.5, 1.0), true, 1e-6);
        assert!(p.x > 0.0);
        assert_eq!(p.y, 0.5);
        assert!(p.z < 1.0);
        assert!(bb.face_bits(&p).is_empty());

        let p = push_point(&bb, &Point3::new(0.0, 0.5, 1.0), false, 1e-6);
        assert!(!bb.contains(&p));

        let p = push_point_faces(
            &bb,
            FaceBits::RIGHT,
            &Point3::new(1.0, 0.0, 0.5),
            false,
            1e-6,
        );
        assert!(p.x > 1.0);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn test_push_point_into_face() {
        let bb = unit();
        // Corner point, travelling mostly along +x: keep the left face
        let dir = Vector3::new(1.0, 0.1, 0.1);
        let p = push_point_into_face(&bb, &dir, &Point3::origin(), 1e-6);
        assert_eq!(p.x, 0.0);
        assert!(p.y > 0.0 && p.z > 0.0);
        assert_eq!(bb.face_bits(&p), FaceBits::LEFT);

        // Interior points are unchanged
        let q = Point3::new(0.5, 0.5, 0.5);
        assert_eq!(push_point_into_face(&bb, &dir, &q, 1e-6), q);
    }

    /// Short edges along `y`, one per unit step in `x`
    ///
    /// Edges `0..15` sit just above the line `y = 0, z = 0.3` (so that the
    /// tree is finely split along it); edge 15 crosses it at `x = 15.5`.
    fn ladder() -> (Vec<Point3<f64>>, Vec<[usize; 2]>) {
        let mut pts = vec![];
        let mut edges = vec![];
        for i in 0..16 {
            let z = if i == 15 { 0.3 } else { 0.7 };
            let x = i as f64 + 0.5;
            edges.push([pts.len(), pts.len() + 1]);
            pts.push(Point3::new(x, -0.2, z));
            pts.push(Point3::new(x, 0.2, z));
        }
        (pts, edges)
    }

    fn ladder_tree<'a>(
        pts: &'a [Point3<f64>],
        edges: &'a [[usize; 2]],
        max_walk_steps: usize,
        strict: bool,
    ) -> Octree<EdgeShapes<'a>> {
        let bb = TreeBoundBox::new(
            Point3::new(-0.13, -8.17, -8.21),
            Point3::new(16.29, 8.07, 8.11),
        );
        let settings = Settings {
            max_leaf_ratio: 1.0,
            max_walk_steps,
            strict,
            ..Settings::default()
        };
        Octree::build(EdgeShapes::new(pts, edges), bb, settings).unwrap()
    }

    /// Segment along the ladder, crossing only its last edge
    fn rail() -> (Point3<f64>, Point3<f64>) {
        (Point3::new(0.05, 0.0, 0.3), Point3::new(16.0, 0.0, 0.3))
    }

    #[test]
    fn test_walk_reaches_far_hit() {
        let (pts, edges) = ladder();
        let tree = ladder_tree(&pts, &edges, 100_000, true);
        let (start, end) = rail();
        let hit = tree.find_line(&start, &end).unwrap();
        assert_eq!(hit.index, 15);
        approx::assert_relative_eq!(
            hit.point,
            Point3::new(15.5, 0.0, 0.3),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_walk_step_limit() {
        // The walk gives up long before reaching the far edge, warns and
        // returns what it has found so far (nothing)
        let (pts, edges) = ladder();
        let tree = ladder_tree(&pts, &edges, 3, false);
        let (start, end) = rail();
        assert!(tree.find_line(&start, &end).is_none());
        assert!(tree.find_line_any(&start, &end).is_none());

        // Without the limit, the same walk finds the edge
        let (pts, edges) = ladder();
        let tree = ladder_tree(&pts, &edges, 100_000, false);
        assert_eq!(tree.find_line(&start, &end).map(|h| h.index), Some(15));
    }

    #[test]
    #[should_panic(expected = "stuck in loop")]
    fn test_walk_step_limit_strict() {
        let (pts, edges) = ladder();
        let tree = ladder_tree(&pts, &edges, 3, true);
        let (start, end) = rail();
        tree.find_line(&start, &end);
    }
}
