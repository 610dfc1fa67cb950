//! Point location and depletion-zone enumeration in nested reactor geometries.
//!
//! A [`universe::Catalog`] describes the geometry as a tree of universes:
//! cell complexes, nests, lattices, pebble beds, tetrahedral meshes and
//! triangulated solids, each able to fill its entities with further universes.
//! [`geometry::Geometry`] validates and finalizes a catalog once; after that
//! it is read-only and shared by every worker.
//!
//! - [`locate::locate`] resolves a point and direction to the leaf holding it
//!   and derives that placement's zone index
//! - [`zones::enumerate_zones`] walks every placement offline and builds the
//!   per-material depletion tables with the same zone arithmetic
//! - [`survey::Survey`] locates random points in parallel and cross-checks both

pub mod context;
pub mod error;
pub mod geometry;
pub mod lattice;
pub mod locate;
pub mod mesh;
pub mod output;
pub mod pebble;
pub mod search;
pub mod settings;
pub mod solid;
pub mod surface;
pub mod survey;
pub mod transform;
pub mod universe;
pub mod zones;
