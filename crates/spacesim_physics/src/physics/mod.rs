//! Collision detection and response
//!
//! # Module Organization
//!
//! - [`collision`] - Bounding volumes and intersection tests
//! - [`body`] - Rigid bodies and their collision settings
//! - [`narrowphase`] - Pair tests chosen by collision geometry
//! - [`resolver`] - Impulse-based response with friction
//! - [`detector`] - Space, continuous and environment detection passes
//! - [`environment`] - Element grids holding interior objects and terrain
//! - [`events`] - Impact events routed to owning subsystems
//! - [`clock`] - Frame and substep timing
//! - [`world`] - The engine tying the above together

pub mod body;
pub mod clock;
pub mod collision;
pub mod detector;
pub mod environment;
pub mod events;
pub mod narrowphase;
pub mod resolver;
pub mod stats;
pub mod world;

pub use body::{BodyFlags, CollisionMode, OwnerKind, RigidBody};
pub use clock::PhysicsClock;
pub use detector::{CollisionDetector, DetectionContext};
pub use environment::{Element, ElementContents, Environment, EnvironmentItem, Terrain};
pub use events::{ImpactDispatcher, ImpactEvent, ImpactHandler, ImpactResponse, ImpactSource};
pub use resolver::{CollisionResolver, ContactPair, ImpactData, Resolution};
pub use stats::CollisionStats;
pub use world::{PhysicsWorld, RayHit, TerrainHit};
