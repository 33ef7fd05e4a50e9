//! Physics engine errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::foundation::math::Vec3;

/// Result alias used by fallible physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Errors surfaced by the collision engine
///
/// Stale handles are not errors: operations given a dead handle return
/// `None`/`false` and leave state untouched.
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// The spatial node pool has no free nodes left
    #[error("Spatial node pool exhausted (capacity {capacity})")]
    NodePoolExhausted {
        /// Hard node limit of the pool
        capacity: usize,
    },

    /// An item was inserted or moved outside the bounds of the tree
    #[error("Position {position:?} lies outside the spatial tree bounds")]
    PositionOutsideTree {
        /// Offending position
        position: Vec3,
    },

    /// The item is not stored in the spatial tree
    #[error("Item is not present in the spatial tree")]
    UnknownItem,

    /// A body's collision exclusion list is full
    #[error("Collision exclusion list full (capacity {capacity})")]
    ExclusionListFull {
        /// Maximum number of exclusions per body
        capacity: usize,
    },

    /// The body handle does not refer to a live body
    #[error("Body handle is not live")]
    UnknownBody,

    /// The environment handle does not refer to a live environment
    #[error("Environment handle is not live")]
    UnknownEnvironment,

    /// A parameter was outside its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
