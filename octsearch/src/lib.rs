//! `octsearch` is an array-indexed octree for spatial queries over arbitrary
//! collections of geometric shapes.
//!
//! The tree is generic over a **shape collection**, which it only ever
//! touches through the [`Shapes`](crate::shapes::Shapes) trait and its
//! extensions: a point cloud, a set of edges, or a polygonal surface all use
//! the same tree code.
//!
//! # Building a tree
//! A tree is built from a shape collection, a bounding box which encloses
//! every shape, and [`Settings`] which control subdivision:
//! ```
//! use octsearch::{shapes::PointShapes, Octree, Settings, TreeBoundBox};
//! use nalgebra::Point3;
//!
//! let pts: Vec<_> = (0..100)
//!     .map(|i| Point3::new(i as f64, (i % 10) as f64, 0.0))
//!     .collect();
//! let bb = TreeBoundBox::from_points(&pts).extend(1e-4);
//! let tree = Octree::build(PointShapes::new(&pts), bb, Settings::default())?;
//! # Ok::<(), octsearch::Error>(())
//! ```
//!
//! Shapes which straddle octant boundaries are stored in every bucket that
//! they overlap; [`Settings::max_duplicity`] caps how much duplication is
//! allowed before subdivision stops.
//!
//! # Queries
//! Depending on what the shape collection supports, a tree can answer
//! - Nearest-point queries ([`Octree::find_nearest`]), and nearest-to-line
//!   queries ([`Octree::find_nearest_line`])
//! - Line intersection queries, which walk the segment through the tree
//!   ([`Octree::find_line`], [`Octree::find_line_any`],
//!   [`Octree::find_all_intersections`])
//! - Box and sphere range queries ([`Octree::find_box`],
//!   [`Octree::find_sphere`]) and paired near-neighbour traversal between two
//!   trees ([`Octree::find_near`])
//! - Inside / outside classification against a closed surface
//!   ([`Octree::classify`])
//!
//! ```
//! use octsearch::{shapes::PointShapes, Octree, Settings, TreeBoundBox};
//! use nalgebra::Point3;
//!
//! let pts = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let bb = TreeBoundBox::from_points(&pts).extend(0.1);
//! let tree = Octree::build(PointShapes::new(&pts), bb, Settings::default())?;
//!
//! let hit = tree.find_nearest(&Point3::new(0.9, 0.2, 0.0), 1.0).unwrap();
//! assert_eq!(hit.index, 1);
//!
//! // Nothing within the search radius
//! assert!(tree.find_nearest(&Point3::new(5.0, 5.0, 5.0), 1.0).is_none());
//! # Ok::<(), octsearch::Error>(())
//! ```
//!
//! Misses are reported as `None` (or an empty list); they are the normal
//! outcome of a query in a sparse region, not an error.
//!
//! # Meshes
//! The [`search`] module builds on the tree to locate points in a polyhedral
//! mesh and to intersect segments with its boundary:
//! ```
//! use octsearch::{
//!     search::{MeshSearch, MeshSearchSettings, PolyMesh, SearchMethod},
//!     TreeBoundBox,
//! };
//! use nalgebra::Point3;
//!
//! let bb = TreeBoundBox::new(Point3::origin(), Point3::new(2.0, 2.0, 2.0));
//! let mesh = PolyMesh::hex_block(&bb, [2, 2, 2])?;
//! let search = MeshSearch::new(&mesh, MeshSearchSettings::default())?;
//!
//! let p = Point3::new(1.5, 0.5, 0.5);
//! assert_eq!(search.find_cell(&p, SearchMethod::Tree)?, Some(1));
//! assert!(search.is_inside(&p)?);
//! # Ok::<(), octsearch::Error>(())
//! ```
#![warn(missing_docs)]

pub mod bounds;
pub mod search;
pub mod shapes;
pub mod tree;

mod error;
pub use error::Error;

pub use bounds::TreeBoundBox;
pub use tree::{Hit, LineHit, Octree, Settings, VolumeType};
