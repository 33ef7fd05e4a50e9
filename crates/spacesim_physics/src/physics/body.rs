//! Rigid bodies as seen by the collision engine

use bitflags::bitflags;

use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::collections::{BodyHandle, EnvironmentHandle};
use crate::foundation::math::{Mat3, Quat, Transform, Vec3};

use super::collision::{BoundingSphere, OrientedBoundingBox};

/// How precisely a body takes part in collision detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollisionMode {
    /// Bounding sphere and OBB hierarchy
    #[default]
    Full,
    /// Bounding sphere only
    BroadphaseOnly,
    /// Never collides
    None,
}

/// Subsystem that owns a body and receives its impact notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    /// Ship hull
    Ship,
    /// Section of a compound ship
    ShipSection,
    /// Actor inside an environment
    Actor,
    /// Static terrain
    Terrain,
    /// Projectile
    Projectile,
    /// Anything else
    Other,
}

bitflags! {
    /// Body behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BodyFlags: u8 {
        /// Never moves and has infinite mass
        const STATIC = 1 << 0;
        /// Only ever tested as the candidate side of a pair
        const PASSIVE = 1 << 1;
        /// Placed in an environment; position is environment-local
        const IN_ENVIRONMENT = 1 << 2;
        /// Resting on terrain or another object after the last environment pass
        const ON_GROUND = 1 << 3;
    }
}

/// A rigid body registered with the physics world
///
/// Positions are in world space for free bodies and in environment-local
/// space for bodies placed in an environment.
#[derive(Debug, Clone)]
pub struct RigidBody {
    transform: Transform,
    previous_position: Vec3,
    /// Linear velocity
    pub velocity: Vec3,
    /// Angular velocity in radians per second about each world axis
    pub angular_velocity: Vec3,
    mass: f32,
    inverse_inertia: Mat3,
    collision_radius: f32,
    size: Vec3,
    mode: CollisionMode,
    flags: BodyFlags,
    owner: OwnerKind,
    collider: Option<OrientedBoundingBox>,
    exclusions: Vec<BodyHandle>,
    step_displacement: Vec3,
    environment: Option<EnvironmentHandle>,
}

impl RigidBody {
    /// Create a unit-mass body at `position` with a unit collision sphere
    pub fn new(position: Vec3) -> Self {
        let mut body = Self {
            transform: Transform::from_position(position),
            previous_position: position,
            velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            mass: 1.0,
            inverse_inertia: Mat3::identity(),
            collision_radius: 1.0,
            size: Vec3::repeat(2.0),
            mode: CollisionMode::BroadphaseOnly,
            flags: BodyFlags::empty(),
            owner: OwnerKind::Other,
            collider: None,
            exclusions: Vec::new(),
            step_displacement: Vec3::zeros(),
            environment: None,
        };
        body.inverse_inertia = solid_sphere_inverse_inertia(body.mass, body.collision_radius);
        body
    }

    /// Set the orientation
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.set_rotation(rotation);
        self
    }

    /// Set the linear velocity
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the angular velocity
    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    /// Set the mass; the inertia is rescaled to match
    pub fn with_mass(mut self, mass: f32) -> Self {
        let mass = mass.max(f32::EPSILON);
        self.inverse_inertia *= self.mass / mass;
        self.mass = mass;
        self
    }

    /// Set the local-space inverse inertia tensor
    pub fn with_inverse_inertia(mut self, inverse_inertia: Mat3) -> Self {
        self.inverse_inertia = inverse_inertia;
        self
    }

    /// Use a bounding sphere only, with the given radius
    pub fn with_sphere(mut self, radius: f32) -> Self {
        let radius = radius.abs();
        self.collision_radius = radius;
        self.size = Vec3::repeat(radius * 2.0);
        self.inverse_inertia = solid_sphere_inverse_inertia(self.mass, radius);
        self.collider = None;
        self.mode = CollisionMode::BroadphaseOnly;
        self
    }

    /// Use an OBB hierarchy; the collision sphere encloses its root box
    pub fn with_collider(mut self, collider: OrientedBoundingBox) -> Self {
        let extents = collider.local_extents();
        self.collision_radius = extents.norm();
        self.size = extents * 2.0;
        self.inverse_inertia = solid_box_inverse_inertia(self.mass, &extents);
        self.collider = Some(collider);
        self.mode = CollisionMode::Full;
        self
    }

    /// Override the collision mode
    pub fn with_mode(mut self, mode: CollisionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Make the body static
    pub fn as_static(mut self) -> Self {
        self.flags |= BodyFlags::STATIC;
        self.velocity = Vec3::zeros();
        self.angular_velocity = Vec3::zeros();
        self
    }

    /// Make the body passive
    pub fn as_passive(mut self) -> Self {
        self.flags |= BodyFlags::PASSIVE;
        self
    }

    /// Set the owning subsystem
    pub fn with_owner(mut self, owner: OwnerKind) -> Self {
        self.owner = owner;
        self
    }

    /// Current transform
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Current position
    pub const fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Position before the most recent step
    pub const fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    /// Current orientation
    pub const fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    /// Teleport the body; its collider is invalidated
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.invalidate_collider();
    }

    /// Reorient the body; its collider is invalidated
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
        self.invalidate_collider();
    }

    /// Mass; static bodies still report their nominal mass
    pub const fn mass(&self) -> f32 {
        self.mass
    }

    /// Inverse mass, zero for static bodies
    pub fn inverse_mass(&self) -> f32 {
        if self.is_static() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Inverse inertia tensor in world space, `R · I⁻¹ · Rᵀ`; zero for static bodies
    pub fn world_inverse_inertia(&self) -> Mat3 {
        if self.is_static() {
            return Mat3::zeros();
        }
        let r = self.transform.basis();
        r * self.inverse_inertia * r.transpose()
    }

    /// Bounding sphere radius
    pub const fn collision_radius(&self) -> f32 {
        self.collision_radius
    }

    /// Bounding sphere at the current position
    pub const fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.transform.position, self.collision_radius)
    }

    /// Full edge lengths of the body
    pub const fn size(&self) -> Vec3 {
        self.size
    }

    /// Collision mode
    pub const fn mode(&self) -> CollisionMode {
        self.mode
    }

    /// Behaviour flags
    pub const fn flags(&self) -> BodyFlags {
        self.flags
    }

    /// Owning subsystem
    pub const fn owner(&self) -> OwnerKind {
        self.owner
    }

    /// True for static bodies
    pub const fn is_static(&self) -> bool {
        self.flags.contains(BodyFlags::STATIC)
    }

    /// True for passive bodies
    pub const fn is_passive(&self) -> bool {
        self.flags.contains(BodyFlags::PASSIVE)
    }

    /// True if the last environment pass left the body standing on something
    pub const fn is_on_ground(&self) -> bool {
        self.flags.contains(BodyFlags::ON_GROUND)
    }

    pub(crate) fn set_on_ground(&mut self, on_ground: bool) {
        self.flags.set(BodyFlags::ON_GROUND, on_ground);
    }

    /// True if the body takes part in collision detection
    pub fn collides(&self) -> bool {
        self.mode != CollisionMode::None
    }

    /// True if narrowphase tests should use the OBB hierarchy
    pub fn uses_collider(&self) -> bool {
        self.mode == CollisionMode::Full && self.collider.is_some()
    }

    /// Environment the body is placed in, if any
    pub const fn environment(&self) -> Option<EnvironmentHandle> {
        self.environment
    }

    pub(crate) fn set_environment(&mut self, environment: Option<EnvironmentHandle>) {
        self.environment = environment;
        self.flags.set(BodyFlags::IN_ENVIRONMENT, environment.is_some());
    }

    /// OBB hierarchy without refreshing it
    pub const fn collider(&self) -> Option<&OrientedBoundingBox> {
        self.collider.as_ref()
    }

    /// OBB hierarchy, recomputed first if the body moved since the last use
    pub fn refreshed_collider(&mut self) -> Option<&OrientedBoundingBox> {
        let transform = self.transform;
        let collider = self.collider.as_mut()?;
        collider.update_if_required(&transform);
        Some(collider)
    }

    /// Recompute the OBB hierarchy if it is stale
    pub fn refresh_collider(&mut self) {
        let transform = self.transform;
        if let Some(collider) = self.collider.as_mut() {
            collider.update_if_required(&transform);
        }
    }

    /// Mark the OBB hierarchy stale
    pub fn invalidate_collider(&mut self) {
        if let Some(collider) = self.collider.as_mut() {
            collider.invalidate();
        }
    }

    /// Displacement over the most recent step
    pub const fn step_displacement(&self) -> Vec3 {
        self.step_displacement
    }

    /// True if the last step moved the body far enough, relative to its
    /// smallest dimension, to need swept collision testing
    pub fn is_fast_mover(&self, threshold: f32) -> bool {
        if self.is_static() {
            return false;
        }
        let limit = self.size.min() * threshold;
        self.step_displacement.norm_squared() > limit * limit
    }

    /// Advance linear and angular motion by `dt` seconds
    pub fn integrate(&mut self, dt: f32) {
        self.previous_position = self.transform.position;
        self.flags.remove(BodyFlags::ON_GROUND);
        if self.is_static() {
            self.step_displacement = Vec3::zeros();
            return;
        }
        self.step_displacement = self.velocity * dt;
        self.transform.position += self.step_displacement;
        let spin = self.angular_velocity * dt;
        if spin.norm_squared() > 0.0 {
            self.transform.rotation = Quat::from_scaled_axis(spin) * self.transform.rotation;
        }
        self.invalidate_collider();
    }

    /// Record an explicit step, e.g. after a swept collision relocated the body
    pub(crate) fn set_step(&mut self, start: Vec3, displacement: Vec3) {
        self.previous_position = start;
        self.step_displacement = displacement;
        self.set_position(start + displacement);
    }

    /// Apply an impulse at `offset` from the centre of mass
    pub fn apply_impulse(&mut self, impulse: &Vec3, offset: &Vec3) {
        if self.is_static() {
            return;
        }
        self.velocity += impulse * self.inverse_mass();
        self.angular_velocity += self.world_inverse_inertia() * offset.cross(impulse);
    }

    /// Velocity of the material point at `offset` from the centre of mass
    pub fn point_velocity(&self, offset: &Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(offset)
    }

    /// True if a pair with `other` is suppressed
    pub fn excludes(&self, other: BodyHandle) -> bool {
        self.exclusions.contains(&other)
    }

    /// Collision exclusions
    pub fn exclusions(&self) -> &[BodyHandle] {
        &self.exclusions
    }

    /// Suppress collisions with `other`
    pub fn add_exclusion(&mut self, other: BodyHandle, capacity: usize) -> PhysicsResult<()> {
        if self.excludes(other) {
            return Ok(());
        }
        if self.exclusions.len() >= capacity {
            return Err(PhysicsError::ExclusionListFull { capacity });
        }
        self.exclusions.push(other);
        Ok(())
    }

    /// Re-enable collisions with `other`
    pub fn remove_exclusion(&mut self, other: BodyHandle) -> bool {
        let before = self.exclusions.len();
        self.exclusions.retain(|h| *h != other);
        self.exclusions.len() != before
    }
}

fn solid_sphere_inverse_inertia(mass: f32, radius: f32) -> Mat3 {
    let i = 0.4 * mass * radius * radius;
    if i > 0.0 {
        Mat3::identity() / i
    } else {
        Mat3::zeros()
    }
}

fn solid_box_inverse_inertia(mass: f32, extents: &Vec3) -> Mat3 {
    let size = extents * 2.0;
    let (x2, y2, z2) = (size.x * size.x, size.y * size.y, size.z * size.z);
    let k = mass / 12.0;
    let diag = Vec3::new(k * (y2 + z2), k * (x2 + z2), k * (x2 + y2));
    Mat3::from_diagonal(&diag.map(|v| if v > 0.0 { 1.0 / v } else { 0.0 }))
}
