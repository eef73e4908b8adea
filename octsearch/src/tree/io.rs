//! Saving and loading built trees
//!
//! The serialized form is `(root bounds, nodes, contents)`, packed with
//! `bincode`.  It is meant for checkpointing within a single build of this
//! crate, not as a stable interchange format.
use super::{Node, OctantRef, Octree, Settings};
use crate::{
    bounds::{Octant, TreeBoundBox},
    shapes::Shapes,
    Error,
};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Serialize)]
struct TreeDataRef<'a> {
    bb: Option<TreeBoundBox>,
    nodes: &'a [Node],
    contents: &'a [Vec<usize>],
}

#[derive(Deserialize)]
struct TreeData {
    bb: Option<TreeBoundBox>,
    nodes: Vec<Node>,
    contents: Vec<Vec<usize>>,
}

impl<S> Octree<S> {
    /// Writes the tree structure (but not the shapes) to a writer
    pub fn save<W: std::io::Write>(&self, w: W) -> Result<(), Error> {
        let data = TreeDataRef {
            bb: self.nodes.first().map(|n| n.bb),
            nodes: &self.nodes,
            contents: &self.contents,
        };
        bincode::serialize_into(w, &data)?;
        Ok(())
    }
}

impl<S: Shapes> Octree<S> {
    /// Reads a tree structure written by [`save`](Octree::save)
    ///
    /// `shapes` must be the same collection that the tree was built over.
    pub fn load<R: std::io::Read>(
        shapes: S,
        settings: Settings,
        r: R,
    ) -> Result<Self, Error> {
        let data: TreeData = bincode::deserialize_from(r)?;
        match (&data.bb, data.nodes.first()) {
            (Some(bb), Some(root)) if *bb == root.bb => (),
            (None, None) => (),
            _ => {
                return Err(Error::CorruptTree(
                    "root bounds do not match root node".to_owned(),
                ));
            }
        }
        Self::from_parts(shapes, data.nodes, data.contents, settings)
    }

    /// Assembles a tree from its components, checking their consistency
    pub fn from_parts(
        shapes: S,
        nodes: Vec<Node>,
        contents: Vec<Vec<usize>>,
        settings: Settings,
    ) -> Result<Self, Error> {
        settings.validate()?;
        check_parts(&nodes, &contents, shapes.len())?;
        Ok(Self {
            shapes,
            settings,
            nodes,
            contents,
            volume_types: OnceLock::new(),
        })
    }
}

fn check_parts(
    nodes: &[Node],
    contents: &[Vec<usize>],
    shape_count: usize,
) -> Result<(), Error> {
    let err = |s: String| Err(Error::CorruptTree(s));

    let Some(root) = nodes.first() else {
        if !contents.is_empty() {
            return err("contents without nodes".to_owned());
        }
        return Ok(());
    };
    if !root.bb.is_valid() {
        return Err(Error::BadBounds(root.bb));
    }
    if root.parent.is_some() {
        return err("root node has a parent".to_owned());
    }

    for (i, n) in nodes.iter().enumerate() {
        if i > 0 {
            let Some(p) = n.parent.filter(|p| *p < nodes.len()) else {
                return err(format!("node {i} has an invalid parent"));
            };
            let Some(o) = nodes[p]
                .children
                .iter()
                .position(|c| *c == OctantRef::Node(i))
            else {
                return err(format!("node {i} is not a child of node {p}"));
            };
            if n.bb != nodes[p].bb.sub_box(Octant::new(o as u8)) {
                return err(format!("node {i} bounds do not match parent"));
            }
        }
        for c in &n.children {
            match *c {
                OctantRef::Node(j) if j == 0 || j >= nodes.len() => {
                    return err(format!("node {i} refers to node {j}"));
                }
                OctantRef::Node(j) if nodes[j].parent != Some(i) => {
                    return err(format!("node {j} has the wrong parent"));
                }
                OctantRef::Content(c) if c >= contents.len() => {
                    return err(format!("node {i} refers to content {c}"));
                }
                OctantRef::Content(c) if contents[c].is_empty() => {
                    return err(format!("node {i} has empty content {c}"));
                }
                _ => (),
            }
        }
    }

    if let Some(i) = contents.iter().flatten().find(|i| **i >= shape_count) {
        return err(format!("content refers to missing shape {i}"));
    }
    Ok(())
}
