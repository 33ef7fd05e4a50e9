//! # Spacesim Physics
//!
//! Collision detection and response for a 3D space simulation.
//!
//! ## Features
//!
//! - **Octree Partitioning**: Pooled octrees for open space and element grids
//! - **Narrowphase**: Bounding spheres and compound OBB hierarchies tested by SAT
//! - **Continuous Detection**: Swept tests stop fast movers tunnelling
//! - **Impulse Response**: Restitution, static and dynamic friction
//! - **Environments**: Ship interiors with terrain and step-up handling
//! - **Impact Events**: Per-owner handlers that may destroy bodies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spacesim_physics::prelude::*;
//!
//! fn main() -> Result<(), PhysicsError> {
//!     let mut world = PhysicsWorld::new(PhysicsConfig::default())?;
//!     let ship = world.add_body(
//!         RigidBody::new(Vec3::zeros())
//!             .with_collider(OrientedBoundingBox::new(Vec3::new(2.0, 1.0, 4.0)))
//!             .with_velocity(Vec3::new(0.0, 0.0, 50.0)),
//!     )?;
//!     world.set_focus(Some(ship));
//!
//!     let stats = world.simulate(1.0 / 60.0);
//!     log::info!("{stats}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod error;
pub mod foundation;
pub mod physics;
pub mod spatial;

pub use error::{PhysicsError, PhysicsResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, PhysicsConfig},
        error::{PhysicsError, PhysicsResult},
        foundation::{
            collections::{BodyHandle, EnvironmentHandle, TerrainHandle},
            math::{Quat, Transform, Vec3},
        },
        physics::{
            collision::{OrientedBoundingBox, Ray},
            CollisionMode, CollisionStats, ImpactEvent, ImpactHandler, ImpactResponse, OwnerKind, PhysicsWorld,
            RigidBody, Terrain,
        },
    };
}
