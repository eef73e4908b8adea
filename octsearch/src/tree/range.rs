//! Box, sphere and paired near-neighbour queries
use super::{OctantRef, Octree};
use crate::{
    bounds::{Octant, TreeBoundBox},
    shapes::Shapes,
};
use nalgebra::{Point3, Vector3};
use std::collections::BTreeSet;

impl<S: Shapes> Octree<S> {
    /// Returns every shape which overlaps the search box, in sorted order
    pub fn find_box(&self, search: &TreeBoundBox) -> Vec<usize> {
        let mut out = BTreeSet::new();
        if !self.nodes.is_empty() {
            self.find_box_recurse(0, search, &mut out);
        }
        out.into_iter().collect()
    }

    fn find_box_recurse(
        &self,
        node: usize,
        search: &TreeBoundBox,
        out: &mut BTreeSet<usize>,
    ) {
        let n = &self.nodes[node];
        for octant in Octant::iter() {
            match n.children[octant.index()] {
                OctantRef::Node(i) => {
                    if self.nodes[i].bb.overlaps(search) {
                        self.find_box_recurse(i, search, out);
                    }
                }
                OctantRef::Content(c) => {
                    let sub = n.bb.sub_box(octant);
                    if sub.overlaps(search) {
                        out.extend(self.contents[c].iter().filter(|&&i| {
                            self.shapes.overlaps_box(i, search)
                        }));
                    }
                }
                OctantRef::Empty => (),
            }
        }
    }

    /// Returns every shape which overlaps the sphere, in sorted order
    pub fn find_sphere(
        &self,
        centre: &Point3<f64>,
        radius_sqr: f64,
    ) -> Vec<usize> {
        let mut out = BTreeSet::new();
        if !self.nodes.is_empty() {
            self.find_sphere_recurse(0, centre, radius_sqr, &mut out);
        }
        out.into_iter().collect()
    }

    fn find_sphere_recurse(
        &self,
        node: usize,
        centre: &Point3<f64>,
        radius_sqr: f64,
        out: &mut BTreeSet<usize>,
    ) {
        let n = &self.nodes[node];
        for octant in Octant::iter() {
            match n.children[octant.index()] {
                OctantRef::Node(i) => {
                    if self.nodes[i].bb.overlaps_sphere(centre, radius_sqr) {
                        self.find_sphere_recurse(i, centre, radius_sqr, out);
                    }
                }
                OctantRef::Content(c) => {
                    let sub = n.bb.sub_box(octant);
                    if sub.overlaps_sphere(centre, radius_sqr) {
                        out.extend(self.contents[c].iter().filter(|&&i| {
                            self.shapes.overlaps_sphere(i, centre, radius_sqr)
                        }));
                    }
                }
                OctantRef::Empty => (),
            }
        }
    }

    /// Finds pairs of shapes (one from each tree) whose buckets are within
    /// `near_dist` of each other
    ///
    /// `op` is called with `(near_dist, shapes, index, other_shapes,
    /// other_index)` for every candidate pair, with shapes from `self` always
    /// in the first position.  If `other` is the same tree as `self`, pairs
    /// of a shape with itself are skipped.  Candidates are found at the
    /// bucket level, so `op` is responsible for the exact distance test, and
    /// may see the same pair more than once.
    pub fn find_near<F>(&self, near_dist: f64, other: &Octree<S>, mut op: F)
    where
        F: FnMut(f64, &S, usize, &S, usize),
    {
        if self.nodes.is_empty() || other.nodes.is_empty() {
            return;
        }
        find_near_recurse(
            near_dist,
            true,
            (self, OctantRef::Node(0), self.nodes[0].bb),
            (other, OctantRef::Node(0), other.nodes[0].bb),
            &mut op,
        );
    }
}

/// Position within one of the two trees of a paired traversal
type Cursor<'a, S> = (&'a Octree<S>, OctantRef, TreeBoundBox);

/// Returns the cursors for each octant below a node
fn children<'a, S>(
    tree: &'a Octree<S>,
    node: usize,
    bb: &TreeBoundBox,
) -> impl Iterator<Item = Cursor<'a, S>> + 'a {
    let bb = *bb;
    Octant::iter().map(move |o| {
        let c = tree.nodes[node].children[o.index()];
        let sub = match c {
            OctantRef::Node(j) => tree.nodes[j].bb,
            _ => bb.sub_box(o),
        };
        (tree, c, sub)
    })
}

/// Dual descent; `ordered` tracks whether `a` is the caller's tree
fn find_near_recurse<S, F>(
    near_dist: f64,
    ordered: bool,
    a: Cursor<'_, S>,
    b: Cursor<'_, S>,
    op: &mut F,
) where
    F: FnMut(f64, &S, usize, &S, usize),
{
    let (tree1, index1, bb1) = a;
    let (tree2, index2, bb2) = b;

    let span = Vector3::repeat(near_dist);
    let search = TreeBoundBox::new(bb1.min - span, bb1.max + span);

    match (index1, index2) {
        (OctantRef::Node(..), OctantRef::Node(n2))
        | (OctantRef::Content(..), OctantRef::Node(n2)) => {
            if bb2.overlaps(&search) {
                for sub in children(tree2, n2, &bb2) {
                    find_near_recurse(near_dist, !ordered, sub, a, op);
                }
            }
        }
        (OctantRef::Node(n1), OctantRef::Content(..)) => {
            for sub in children(tree1, n1, &bb1) {
                find_near_recurse(near_dist, !ordered, b, sub, op);
            }
        }
        (OctantRef::Content(c1), OctantRef::Content(c2)) => {
            let same = std::ptr::eq(tree1, tree2);
            for &i in &tree1.contents[c1] {
                for &j in &tree2.contents[c2] {
                    if same && i == j {
                        continue;
                    }
                    if ordered {
                        op(near_dist, &tree1.shapes, i, &tree2.shapes, j);
                    } else {
                        op(near_dist, &tree2.shapes, j, &tree1.shapes, i);
                    }
                }
            }
        }
        _ => (),
    }
}
