//! Inside/outside classification
use super::{OctantRef, Octree};
use crate::{bounds::Octant, shapes::Classify};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Classification of a region relative to a closed surface
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeType {
    /// Could not be determined (e.g. for open or non-manifold surfaces)
    #[default]
    Unknown,
    /// Region contains parts of the surface, so has both sides
    Mixed,
    /// Region is inside the surface
    Inside,
    /// Region is outside the surface
    Outside,
}

/// Classifies a vector relative to an outward-facing normal
///
/// Returns [`VolumeType::Outside`] if `vec` points along (or perpendicular
/// to) `outside_normal`, and [`VolumeType::Inside`] otherwise.
pub fn get_side(
    outside_normal: &Vector3<f64>,
    vec: &Vector3<f64>,
) -> VolumeType {
    if outside_normal.dot(vec) >= 0.0 {
        VolumeType::Outside
    } else {
        VolumeType::Inside
    }
}

impl<S: Classify> Octree<S> {
    /// Populates the per-octant classification cache
    ///
    /// This is done automatically by the first call to
    /// [`classify`](Octree::classify); calling it up front means that later
    /// classification never has to wait on another thread filling the cache.
    pub fn ensure_classified(&self) {
        self.volume_cache();
    }

    /// Returns the per-octant classification cache, building it if needed
    fn volume_cache(&self) -> &[VolumeType] {
        self.volume_types.get_or_init(|| {
            let mut types = vec![VolumeType::Unknown; self.nodes.len() * 8];
            if !self.nodes.is_empty() {
                self.calc_volume_type(0, &mut types);
            }
            if log::log_enabled!(log::Level::Debug) {
                for t in VolumeType::iter() {
                    let n = types.iter().filter(|v| **v == t).count();
                    log::debug!("classified {n} octants as {t}");
                }
            }
            types
        })
    }

    /// Recursively classifies every octant below a node
    ///
    /// Returns the node's combined type, which is `Mixed` if its octants
    /// disagree.
    fn calc_volume_type(
        &self,
        node: usize,
        types: &mut [VolumeType],
    ) -> VolumeType {
        let n = &self.nodes[node];
        let mut out = VolumeType::Unknown;
        for octant in Octant::iter() {
            let t = match n.children[octant.index()] {
                OctantRef::Node(j) => self.calc_volume_type(j, types),
                // Contents may have either side at any point
                OctantRef::Content(..) => VolumeType::Mixed,
                OctantRef::Empty => {
                    let sub = n.bb.sub_box(octant);
                    self.shapes.volume_type(self, &sub.midpoint())
                }
            };
            types[node * 8 + octant.index()] = t;

            if out == VolumeType::Unknown {
                out = t;
            } else if t != out {
                out = VolumeType::Mixed;
            }
        }
        out
    }

    /// Classifies a point as inside or outside of the shapes
    ///
    /// Returns [`VolumeType::Unknown`] for an empty tree.
    ///
    /// # Panics
    /// If the classification cache is inconsistent with the tree
    pub fn classify(&self, sample: &Point3<f64>) -> VolumeType {
        if self.nodes.is_empty() {
            return VolumeType::Unknown;
        }
        let types = self.volume_cache();

        let mut node = 0;
        loop {
            let n = &self.nodes[node];
            let octant = n.bb.sub_octant(sample);
            let t = types[node * 8 + octant.index()];
            if t != VolumeType::Mixed {
                return t;
            }
            match n.children[octant.index()] {
                OctantRef::Node(i) => node = i,
                OctantRef::Content(..) => {
                    return self.shapes.volume_type(self, sample);
                }
                OctantRef::Empty => panic!(
                    "sample {sample:?} in node {node} octant {octant} with \
                     bb {}: empty octant has invalid volume type {t}",
                    n.bb.sub_box(octant)
                ),
            }
        }
    }
}

impl<S: Classify + Sync> Octree<S> {
    /// Classifies many points in parallel
    pub fn classify_many(&self, samples: &[Point3<f64>]) -> Vec<VolumeType> {
        self.ensure_classified();
        samples.par_iter().map(|p| self.classify(p)).collect()
    }
}
