//! Physics world orchestration
//!
//! [`PhysicsWorld`] owns every body, the open-space tree, the environments
//! and the frame clock. Each call to [`PhysicsWorld::simulate`] splits the
//! frame into substeps; every substep integrates motion, updates the trees,
//! runs collision detection and finally prunes nodes emptied by moves.

use log::{debug, info, trace, warn};

use crate::config::PhysicsConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::collections::{BodyHandle, EnvironmentHandle, SlotMap, TerrainHandle};
use crate::foundation::math::{utils, Transform, Vec3};
use crate::spatial::{FreeSpace, ItemKind, ItemKinds, QueryFilter, SpatialTree};

use super::body::{OwnerKind, RigidBody};
use super::clock::PhysicsClock;
use super::collision::{ray_vs_obb_hierarchy, Aabb, Ray};
use super::detector::{CollisionDetector, DetectionContext};
use super::environment::{Element, Environment, Terrain};
use super::events::{ImpactDispatcher, ImpactHandler};
use super::stats::CollisionStats;

/// Nearest body hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Body hit
    pub body: BodyHandle,
    /// Distance along the ray
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
}

/// Nearest terrain hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainHit {
    /// Terrain block hit
    pub terrain: TerrainHandle,
    /// Distance along the ray
    pub distance: f32,
    /// World-space hit point
    pub point: Vec3,
}

/// The collision engine
#[derive(Debug)]
pub struct PhysicsWorld {
    config: PhysicsConfig,
    bodies: SlotMap<BodyHandle, RigidBody>,
    space: SpatialTree<FreeSpace, BodyHandle>,
    environments: SlotMap<EnvironmentHandle, Environment>,
    detector: CollisionDetector,
    dispatcher: ImpactDispatcher,
    clock: PhysicsClock,
    focus: Option<BodyHandle>,
    frame_stats: CollisionStats,
}

impl PhysicsWorld {
    /// Create an empty world
    pub fn new(config: PhysicsConfig) -> PhysicsResult<Self> {
        config.validate()?;
        let bounds = Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(config.spatial.world_half_extent));
        let space = SpatialTree::new(FreeSpace, bounds, config.spatial.clone())?;
        let detector = CollisionDetector::new(&config.collision, &config.environment);
        let clock = PhysicsClock::new(config.clock.clone(), config.collision.static_pair_interval_ms);
        info!(
            "PhysicsWorld: created with extent ±{} and {} node capacity",
            config.spatial.world_half_extent, config.spatial.node_pool_capacity
        );
        Ok(Self {
            config,
            bodies: SlotMap::with_key(),
            space,
            environments: SlotMap::with_key(),
            detector,
            dispatcher: ImpactDispatcher::new(),
            clock,
            focus: None,
            frame_stats: CollisionStats::default(),
        })
    }

    /// Active configuration
    pub const fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Frame clock
    pub const fn clock(&self) -> &PhysicsClock {
        &self.clock
    }

    /// Collision counters from the last simulated frame
    pub const fn stats(&self) -> &CollisionStats {
        &self.frame_stats
    }

    /// Open-space tree
    pub const fn space(&self) -> &SpatialTree<FreeSpace, BodyHandle> {
        &self.space
    }

    fn context(&mut self) -> DetectionContext<'_> {
        DetectionContext {
            bodies: &mut self.bodies,
            space: &mut self.space,
            environments: &mut self.environments,
            dispatcher: &mut self.dispatcher,
            clock: &mut self.clock,
        }
    }

    // Bodies

    /// Register a body in open space
    pub fn add_body(&mut self, mut body: RigidBody) -> PhysicsResult<BodyHandle> {
        let position = body.position();
        if !utils::is_finite(&position) {
            return Err(PhysicsError::InvalidParameter(format!("body position {position:?} is not finite")));
        }
        body.set_environment(None);
        let radius = body.collision_radius();
        let handle = self.bodies.insert(body);
        if let Err(err) = self.space.insert(handle, position, radius, ItemKind::Object) {
            warn!("PhysicsWorld: body rejected: {err}");
            self.bodies.remove(handle);
            return Err(err);
        }
        trace!("PhysicsWorld: added {handle:?} at {position:?}");
        Ok(handle)
    }

    /// Remove a body; returns it if the handle was live
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        if self.focus == Some(handle) {
            self.focus = None;
        }
        self.context().remove_body(handle)
    }

    /// Look up a body
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Look up a body for modification; position changes reach the trees on the next step
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    /// All bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> {
        self.bodies.iter()
    }

    /// Number of live bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// True if the handle refers to a live body
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(handle)
    }

    /// World-space position of a body, resolving environment placement
    pub fn world_position(&self, handle: BodyHandle) -> Option<Vec3> {
        let body = self.bodies.get(handle)?;
        match body.environment() {
            Some(env) => Some(self.environments.get(env)?.to_world(&body.position())),
            None => Some(body.position()),
        }
    }

    // Environments

    /// Create an environment of `dimensions` elements placed at `transform`
    pub fn add_environment(&mut self, transform: Transform, dimensions: [u32; 3]) -> PhysicsResult<EnvironmentHandle> {
        let env = Environment::new(transform, dimensions, &self.config.environment, &self.config.spatial)?;
        let handle = self.environments.insert(env);
        info!("PhysicsWorld: added environment {handle:?} {dimensions:?}");
        Ok(handle)
    }

    /// Remove an environment together with every body placed in it
    pub fn remove_environment(&mut self, handle: EnvironmentHandle) -> Option<Environment> {
        let env = self.environments.remove(handle)?;
        for &body in env.objects() {
            if self.focus == Some(body) {
                self.focus = None;
            }
            self.context().remove_body(body);
        }
        Some(env)
    }

    /// Look up an environment
    pub fn environment(&self, handle: EnvironmentHandle) -> Option<&Environment> {
        self.environments.get(handle)
    }

    /// Look up an environment for modification
    pub fn environment_mut(&mut self, handle: EnvironmentHandle) -> Option<&mut Environment> {
        self.environments.get_mut(handle)
    }

    /// Add a terrain block to an environment
    pub fn add_terrain(&mut self, env: EnvironmentHandle, terrain: Terrain) -> PhysicsResult<TerrainHandle> {
        self.environments
            .get_mut(env)
            .ok_or(PhysicsError::UnknownEnvironment)?
            .add_terrain(terrain)
    }

    /// Move a body into an environment at a local position
    pub fn place_in_environment(
        &mut self,
        handle: BodyHandle,
        env: EnvironmentHandle,
        local_position: Vec3,
    ) -> PhysicsResult<()> {
        let target = self.environments.get(env).ok_or(PhysicsError::UnknownEnvironment)?;
        if target.element_at(&local_position).is_none() {
            return Err(PhysicsError::InvalidParameter(format!(
                "position {local_position:?} lies outside the environment grid"
            )));
        }
        let body = self.bodies.get(handle).ok_or(PhysicsError::UnknownBody)?;
        let radius = body.collision_radius();
        self.detach(handle);

        let Some(target) = self.environments.get_mut(env) else {
            return Err(PhysicsError::UnknownEnvironment);
        };
        target.insert_object(handle, local_position, radius)?;
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_step(local_position, Vec3::zeros());
            body.set_environment(Some(env));
        }
        debug!("PhysicsWorld: placed {handle:?} in {env:?} at {local_position:?}");
        Ok(())
    }

    /// Move a body out of its environment into open space
    pub fn release_from_environment(&mut self, handle: BodyHandle, world_position: Vec3) -> PhysicsResult<()> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::UnknownBody)?;
        if body.environment().is_none() {
            return Err(PhysicsError::InvalidParameter("body is not in an environment".to_string()));
        }
        let radius = body.collision_radius();
        self.detach(handle);
        self.space.insert(handle, world_position, radius, ItemKind::Object)?;
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_step(world_position, Vec3::zeros());
            body.set_environment(None);
        }
        Ok(())
    }

    /// Take a body out of whichever tree indexes it
    fn detach(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        match body.environment().and_then(|env| self.environments.get_mut(env)) {
            Some(env) => {
                env.remove_object(handle);
            }
            None => {
                self.space.remove(&handle);
            }
        }
    }

    // Collision control

    /// Route impact events for bodies owned by `owner` to `handler`
    pub fn register_impact_handler(&mut self, owner: OwnerKind, handler: impl ImpactHandler + 'static) {
        self.dispatcher.register_handler(owner, Box::new(handler));
    }

    /// Stop two bodies colliding with each other
    pub fn add_collision_exclusion(&mut self, a: BodyHandle, b: BodyHandle) -> PhysicsResult<()> {
        let capacity = self.config.collision.max_collision_exclusions;
        let [first, second] = self.bodies.get_disjoint_mut([a, b]).ok_or(PhysicsError::UnknownBody)?;
        first.add_exclusion(b, capacity)?;
        if let Err(err) = second.add_exclusion(a, capacity) {
            first.remove_exclusion(b);
            return Err(err);
        }
        Ok(())
    }

    /// Let two bodies collide again; returns false if no exclusion existed
    pub fn remove_collision_exclusion(&mut self, a: BodyHandle, b: BodyHandle) -> bool {
        let first = self.bodies.get_mut(a).is_some_and(|body| body.remove_exclusion(b));
        let second = self.bodies.get_mut(b).is_some_and(|body| body.remove_exclusion(a));
        first || second
    }

    /// Limit detection to the surroundings of a body, or clear the limit
    pub fn set_focus(&mut self, focus: Option<BodyHandle>) {
        self.focus = focus;
    }

    /// Current focus body
    pub const fn focus(&self) -> Option<BodyHandle> {
        self.focus
    }

    // Simulation

    /// Advance the simulation by one rendered frame
    pub fn simulate(&mut self, frame_delta: f32) -> CollisionStats {
        self.detector.reset_stats();
        self.clock.begin_frame(frame_delta);
        while let Some(dt) = self.clock.next_substep() {
            self.step(dt);
        }
        self.frame_stats = *self.detector.stats();
        debug!("PhysicsWorld: frame {} {}", self.clock.frame_count(), self.frame_stats);
        self.frame_stats
    }

    fn step(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            body.integrate(dt);
        }
        self.sync_trees();

        let focus = self.focus.and_then(|handle| self.world_position(handle));
        let mut ctx = DetectionContext {
            bodies: &mut self.bodies,
            space: &mut self.space,
            environments: &mut self.environments,
            dispatcher: &mut self.dispatcher,
            clock: &mut self.clock,
        };
        self.detector.detect(&mut ctx, focus);

        self.space.pruning_check();
        for env in self.environments.values_mut() {
            env.prune();
        }
    }

    /// Bring every tree up to date with the bodies' positions
    ///
    /// Bodies that left their tree's bounds drop out of it and are put back
    /// once they return.
    fn sync_trees(&mut self) {
        for (handle, body) in &self.bodies {
            let (position, radius) = (body.position(), body.collision_radius());
            let result = match body.environment() {
                Some(env) => match self.environments.get_mut(env) {
                    Some(env) if env.contains_object(handle) => env.move_object(handle, position, radius),
                    Some(env) => env.insert_object(handle, position, radius),
                    None => Ok(()),
                },
                None if self.space.contains(&handle) => self.space.move_item(handle, position, radius).map(|_| ()),
                None => self.space.insert(handle, position, radius, ItemKind::Object).map(|_| ()),
            };
            match result {
                Ok(()) => {}
                Err(PhysicsError::PositionOutsideTree { position }) => {
                    trace!("PhysicsWorld: {handle:?} is outside its tree at {position:?}");
                }
                Err(err) => warn!("PhysicsWorld: tree update for {handle:?} failed: {err}"),
            }
        }
    }

    // Queries

    /// Open-space bodies whose bounding sphere comes within `distance` of `point`
    pub fn objects_within_distance(&self, point: &Vec3, distance: f32) -> Vec<BodyHandle> {
        let mut found = Vec::new();
        self.space
            .range_query_into(point, distance, QueryFilter::overlapping_objects(), &mut found);
        found.retain(|&handle| {
            self.bodies
                .get(handle)
                .is_some_and(|body| (body.position() - point).norm() <= distance + body.collision_radius())
        });
        found
    }

    /// Bodies sharing a space or environment with `handle` within `distance` of it
    pub fn objects_within_distance_of(&self, handle: BodyHandle, distance: f32) -> Vec<BodyHandle> {
        let Some(body) = self.bodies.get(handle) else {
            return Vec::new();
        };
        let origin = body.position();
        let mut found = match body.environment() {
            Some(env) => {
                let mut found = Vec::new();
                if let Some(env) = self.environments.get(env) {
                    env.objects_within(&origin, distance, &mut found);
                }
                found.retain(|&other| {
                    self.bodies
                        .get(other)
                        .is_some_and(|b| (b.position() - origin).norm() <= distance + b.collision_radius())
                });
                found
            }
            None => self.objects_within_distance(&origin, distance),
        };
        found.retain(|&other| other != handle);
        found
    }

    /// Nearest open-space body hit by a world-space ray within `max_distance`
    ///
    /// Bodies are tested by bounding sphere, then by OBB hierarchy for those
    /// that use one.
    pub fn raycast(&mut self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        if ray.direction.norm_squared() == 0.0 {
            return None;
        }
        let ray = Ray::normalized(ray.origin, ray.direction);
        let area = Aabb::new(ray.origin, ray.point_at(max_distance));
        let mut candidates = Vec::new();
        self.space.query_aabb_into(&area, ItemKinds::OBJECTS, &mut candidates);

        let mut best: Option<RayHit> = None;
        for handle in candidates {
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if !body.collides() {
                continue;
            }
            let Some(mut distance) = body.bounding_sphere().intersect_ray(&ray).filter(|t| *t <= max_distance) else {
                continue;
            };
            if body.uses_collider() {
                body.refresh_collider();
                match body.collider().and_then(|c| ray_vs_obb_hierarchy(&ray, c, max_distance)) {
                    Some(t) => distance = t,
                    None => continue,
                }
            }
            if best.map_or(true, |hit| distance < hit.distance) {
                best = Some(RayHit {
                    body: handle,
                    distance,
                    point: ray.point_at(distance),
                });
            }
        }
        best
    }

    /// Nearest terrain in an environment hit by a world-space ray
    pub fn ray_vs_environment(&self, env: EnvironmentHandle, ray: &Ray, max_distance: f32) -> Option<TerrainHit> {
        if ray.direction.norm_squared() == 0.0 {
            return None;
        }
        let env = self.environments.get(env)?;
        let (terrain, distance) = env.ray_vs_terrain(&env.ray_to_local(ray), max_distance)?;
        let world = Ray::normalized(ray.origin, ray.direction);
        Some(TerrainHit {
            terrain,
            distance,
            point: world.point_at(distance),
        })
    }

    /// Element of an environment nearest a world-space point
    pub fn nearest_element(&self, env: EnvironmentHandle, point: &Vec3) -> Option<Element> {
        let env = self.environments.get(env)?;
        Some(env.nearest_element(&env.to_local(point)))
    }
}
