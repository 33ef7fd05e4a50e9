//! Spatial partitioning data structures
//!
//! Provides the octree used to scope candidate collisions, both for bodies
//! in open space and for objects and terrain inside an environment grid.

mod node_pool;
mod octree;
mod space;

pub use node_pool::{ItemKind, ItemKinds, NodePool, SpatialNode, StoredItem};
pub use octree::{QueryFilter, SpatialTree};
pub use space::{CoordinateSpace, ElementSpace, FreeSpace};
