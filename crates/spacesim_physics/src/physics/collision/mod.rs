//! Bounding volumes and geometric intersection tests
//!
//! # Module Organization
//!
//! - [`primitives`] - Rays, bounding spheres and axis-aligned boxes
//! - [`obb`] - Oriented bounding boxes and compound OBB hierarchies
//! - [`intersection`] - SAT, sphere-vs-OBB, hierarchy and swept tests

pub mod intersection;
pub mod obb;
pub mod primitives;

pub use intersection::{
    broadphase, continuous_sphere_vs_obb, continuous_sphere_vs_sphere,
    obb_hierarchy_vs_hierarchy, ray_vs_obb_hierarchy, sat_obb_vs_obb, sphere_vs_obb,
    sphere_vs_obb_hierarchy, ContinuousContact, HierarchyContact, SatAxis, SatResult,
};
pub use obb::{ObbData, OrientedBoundingBox};
pub use primitives::{Aabb, BoundingSphere, Ray, RayIntersection};
