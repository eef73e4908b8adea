//! Module containing the universal error type
use crate::bounds::TreeBoundBox;
use nalgebra::Point3;
use thiserror::Error;

/// Universal error type for `octsearch`
#[derive(Error, Debug)]
pub enum Error {
    /// Bounding box is inverted or has zero size along some axis
    #[error("badly formed bounding box: {0}")]
    BadBounds(TreeBoundBox),

    /// Construction settings are out of range
    #[error("invalid settings: {0}")]
    BadSettings(&'static str),

    /// Deserialized node or content arrays are inconsistent
    #[error("corrupt tree: {0}")]
    CorruptTree(String),

    /// Mesh description is inconsistent
    #[error("bad mesh: {0}")]
    BadMesh(String),

    /// Starting cell or face for a mesh walk is out of range
    #[error("bad walk seed: {0}")]
    BadSeed(String),

    /// Nothing in the tree is within reach of the query point
    #[error("nothing within reach of {0:?}")]
    OutOfReach(Point3<f64>),

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error; see inner code for details
    #[error("serialization error: {0}")]
    BincodeError(#[from] bincode::Error),
}
