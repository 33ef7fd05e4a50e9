//! Handle types for generation-checked references
//!
//! Every object the engine hands out a reference to lives in a `SlotMap`, so a
//! handle held across a frame can be checked for liveness before use and a
//! recycled slot can never be mistaken for the object that used to occupy it.

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a rigid body registered with the physics world
    pub struct BodyHandle;

    /// Handle to an interior environment (ship interior element grid)
    pub struct EnvironmentHandle;

    /// Handle to a static terrain block inside an environment
    pub struct TerrainHandle;

    /// Handle to a node of a spatial partitioning tree
    pub struct NodeKey;
}
