//! Tree construction
use super::{Node, OctantRef, Octree, Settings};
use crate::{
    bounds::{Octant, TreeBoundBox},
    shapes::Shapes,
    Error,
};
use std::sync::OnceLock;

impl<S: Shapes> Octree<S> {
    /// Builds a tree over every shape in the collection
    ///
    /// Returns an empty tree if there are no shapes; otherwise, `bb` must be
    /// a valid box (see [`TreeBoundBox::is_valid`]) which encloses the
    /// shapes.  Shapes outside of `bb` are silently dropped.
    pub fn build(
        shapes: S,
        bb: TreeBoundBox,
        settings: Settings,
    ) -> Result<Self, Error> {
        settings.validate()?;

        let n = shapes.len();
        if n == 0 {
            log::debug!("building empty tree");
            return Ok(Self::empty(shapes, settings));
        }

        let mut contents = vec![(0..n).collect::<Vec<usize>>()];
        let children = divide(&shapes, &bb, &mut contents, 0)?;
        let mut nodes = vec![Node {
            bb,
            parent: None,
            children,
        }];

        let mut levels = 1;
        while levels < settings.max_levels {
            let entries: usize = contents.iter().map(Vec::len).sum();
            log::debug!(
                "level {levels}: {entries} entries, {:.2} per leaf, \
                 duplicity {:.2}",
                entries as f64 / contents.len() as f64,
                entries as f64 / n as f64
            );
            if entries as f64 > settings.max_duplicity * n as f64 {
                break;
            }

            let prev = nodes.len();
            split_nodes(
                &shapes,
                settings.max_leaf_ratio as usize,
                &mut nodes,
                &mut contents,
            )?;
            if prev == nodes.len() {
                break;
            }
            levels += 1;
        }

        let contents = compact(&mut nodes, contents);

        let entries: usize = contents.iter().map(Vec::len).sum();
        log::debug!(
            "built tree with {} nodes over {n} shapes: {levels} levels, \
             {entries} entries, {:.2} per leaf, duplicity {:.2}",
            nodes.len(),
            entries as f64 / contents.len().max(1) as f64,
            entries as f64 / n as f64,
        );

        Ok(Self {
            shapes,
            settings,
            nodes,
            contents,
            volume_types: OnceLock::new(),
        })
    }
}

/// Splits the bucket `contents[index]` across the 8 octants of `bb`
///
/// The first non-empty octant bucket replaces the original; the rest are
/// appended to `contents`.
fn divide<S: Shapes>(
    shapes: &S,
    bb: &TreeBoundBox,
    contents: &mut Vec<Vec<usize>>,
    index: usize,
) -> Result<[OctantRef; 8], Error> {
    if !bb.is_valid() {
        return Err(Error::BadBounds(*bb));
    }

    let indices = std::mem::take(&mut contents[index]);
    let mid = bb.midpoint();

    let mut children = [OctantRef::Empty; 8];
    let mut replaced = false;
    for octant in Octant::iter() {
        let sub = bb.sub_box_at(&mid, octant);
        let bucket: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| shapes.overlaps_box(i, &sub))
            .collect();
        if bucket.is_empty() {
            continue;
        }
        let c = if replaced {
            contents.push(bucket);
            contents.len() - 1
        } else {
            contents[index] = bucket;
            replaced = true;
            index
        };
        children[octant.index()] = OctantRef::Content(c);
    }
    Ok(children)
}

/// Splits every bucket larger than `min_size` into a new child node
///
/// Only nodes that existed before this call are examined, so each call adds
/// at most one level to the tree.
fn split_nodes<S: Shapes>(
    shapes: &S,
    min_size: usize,
    nodes: &mut Vec<Node>,
    contents: &mut Vec<Vec<usize>>,
) -> Result<(), Error> {
    let count = nodes.len();
    for node in 0..count {
        for octant in Octant::iter() {
            let OctantRef::Content(c) = nodes[node].children[octant.index()]
            else {
                continue;
            };
            if contents[c].len() > min_size {
                let bb = nodes[node].bb.sub_box(octant);
                let children = divide(shapes, &bb, contents, c)?;
                nodes.push(Node {
                    bb,
                    parent: Some(node),
                    children,
                });
                nodes[node].children[octant.index()] =
                    OctantRef::Node(nodes.len() - 1);
            }
        }
    }
    Ok(())
}

/// Reorders buckets breadth-first, so shallower leaves come first
///
/// Buckets which are no longer referenced by any node are dropped.
fn compact(
    nodes: &mut [Node],
    mut contents: Vec<Vec<usize>>,
) -> Vec<Vec<usize>> {
    let mut out = Vec::with_capacity(contents.len());
    for level in 0.. {
        let deeper =
            compact_level(nodes, &mut contents, level, 0, 0, &mut out);
        if deeper == 0 {
            break;
        }
    }
    out
}

/// Moves every bucket at `target` depth into `out`, rewriting references
///
/// Returns the number of child nodes found at that depth.
fn compact_level(
    nodes: &mut [Node],
    contents: &mut [Vec<usize>],
    target: usize,
    node: usize,
    level: usize,
    out: &mut Vec<Vec<usize>>,
) -> usize {
    let mut count = 0;
    for octant in Octant::iter() {
        match nodes[node].children[octant.index()] {
            OctantRef::Node(i) if level < target => {
                count +=
                    compact_level(nodes, contents, target, i, level + 1, out);
            }
            OctantRef::Node(..) if level == target => count += 1,
            OctantRef::Content(c) if level == target => {
                out.push(std::mem::take(&mut contents[c]));
                nodes[node].children[octant.index()] =
                    OctantRef::Content(out.len() - 1);
            }
            _ => (),
        }
    }
    count
}
