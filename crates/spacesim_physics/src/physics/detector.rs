//! Collision detection passes
//!
//! Each substep runs three passes over the active bodies:
//!
//! 1. **Space**: discrete broadphase and narrowphase for bodies in open
//!    space, resolving every confirmed pair immediately.
//! 2. **Continuous**: swept tests for fast movers, resolving up to a bounded
//!    number of sequential hits per body within the step.
//! 3. **Environment**: object-vs-terrain and object-vs-object tests inside
//!    each environment, limited to the elements each object touches.
//!
//! The detector owns only scratch buffers and counters; the bodies, trees
//! and clock it works on are passed in through a [`DetectionContext`].

use std::f32::consts::SQRT_2;

use log::{debug, trace, warn};

use crate::config::{CollisionConfig, EnvironmentConfig};
use crate::foundation::collections::{BodyHandle, EnvironmentHandle, SlotMap, TerrainHandle};
use crate::foundation::math::{constants::EPSILON, utils, Vec3};
use crate::spatial::{FreeSpace, ItemKinds, QueryFilter, SpatialTree};

use super::body::RigidBody;
use super::clock::PhysicsClock;
use super::collision::{
    broadphase, continuous_sphere_vs_obb, continuous_sphere_vs_sphere, obb_hierarchy_vs_hierarchy, sat_obb_vs_obb,
    ContinuousContact, ObbData, OrientedBoundingBox, SatResult,
};
use super::environment::{Environment, EnvironmentItem};
use super::events::{ImpactDispatcher, ImpactEvent, ImpactSource};
use super::narrowphase::{self, Participant};
use super::resolver::{CollisionResolver, ContactPair, ImpactData, Resolution};
use super::stats::CollisionStats;

/// Swept hits must beat this to count; anything above one is a miss
const CCD_NO_HIT: f32 = 1.01;

/// Vertical speed below which an environment object counts as falling
const GROUND_FALLING_EPSILON: f32 = 1e-4;
/// Vertical speed below which a landed object counts as at rest
const GROUND_REST_EPSILON: f32 = 1e-3;

/// Mutable world state a detection pass works on
pub struct DetectionContext<'a> {
    /// Every registered body
    pub bodies: &'a mut SlotMap<BodyHandle, RigidBody>,
    /// Open-space tree
    pub space: &'a mut SpatialTree<FreeSpace, BodyHandle>,
    /// Environments
    pub environments: &'a mut SlotMap<EnvironmentHandle, Environment>,
    /// Impact event routing
    pub dispatcher: &'a mut ImpactDispatcher,
    /// Frame clock; its time factor is scaled during swept passes
    pub clock: &'a mut PhysicsClock,
}

impl DetectionContext<'_> {
    /// Remove a body from the world, from whichever tree indexes it and from
    /// its partners' exclusion lists
    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let body = self.bodies.remove(handle)?;
        match body.environment() {
            Some(env) => {
                if let Some(env) = self.environments.get_mut(env) {
                    env.remove_object(handle);
                }
            }
            None => {
                self.space.remove(&handle);
            }
        }
        // Exclusions are symmetric, so only the partners can still name this handle
        for &partner in body.exclusions() {
            if let Some(partner) = self.bodies.get_mut(partner) {
                partner.remove_exclusion(handle);
            }
        }
        Some(body)
    }
}

/// Which pass is filtering a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Open space, where fast movers are swept separately
    Space,
    /// Inside an environment, where every mover is tested discretely
    Environment,
}

/// What happened to a tested pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairOutcome {
    Missed,
    Resolved,
    InitiatorDestroyed,
}

/// Finds and resolves collisions
#[derive(Debug)]
pub struct CollisionDetector {
    config: CollisionConfig,
    environment_config: EnvironmentConfig,
    resolver: CollisionResolver,
    stats: CollisionStats,
    active: Vec<BodyHandle>,
    candidates: Vec<BodyHandle>,
    nearby: Vec<EnvironmentItem>,
    environment_handles: Vec<EnvironmentHandle>,
}

impl CollisionDetector {
    /// Create a detector with empty scratch buffers
    pub fn new(config: &CollisionConfig, environment_config: &EnvironmentConfig) -> Self {
        Self {
            config: config.clone(),
            environment_config: environment_config.clone(),
            resolver: CollisionResolver::new(config),
            stats: CollisionStats::default(),
            active: Vec::new(),
            candidates: Vec::new(),
            nearby: Vec::new(),
            environment_handles: Vec::new(),
        }
    }

    /// Counters accumulated since the last reset
    pub const fn stats(&self) -> &CollisionStats {
        &self.stats
    }

    /// Zero the counters
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Impulse solver
    pub const fn resolver(&self) -> &CollisionResolver {
        &self.resolver
    }

    /// Run every detection pass for the current substep
    ///
    /// With a `focus` point (world space) only bodies within the active
    /// collision distance of it initiate tests; without one every body does.
    pub fn detect(&mut self, ctx: &mut DetectionContext<'_>, focus: Option<Vec3>) {
        self.gather_active(ctx, focus);
        self.space_pass(ctx);
        self.continuous_pass(ctx);
        self.environment_pass(ctx, focus);
    }

    fn gather_active(&mut self, ctx: &DetectionContext<'_>, focus: Option<Vec3>) {
        self.active.clear();
        match focus {
            Some(point) => ctx.space.range_query_into(
                &point,
                self.config.active_collision_distance,
                QueryFilter::overlapping_objects(),
                &mut self.active,
            ),
            None => self.active.extend(
                ctx.bodies
                    .iter()
                    .filter(|(_, body)| body.environment().is_none())
                    .map(|(handle, _)| handle),
            ),
        }
    }

    fn space_pass(&mut self, ctx: &mut DetectionContext<'_>) {
        let active = std::mem::take(&mut self.active);
        let mut candidates = std::mem::take(&mut self.candidates);
        for &handle in &active {
            // Destroyed earlier in this pass
            let Some(body) = ctx.bodies.get(handle) else {
                continue;
            };
            if body.is_passive() || !body.collides() || body.is_fast_mover(self.config.fast_mover_threshold) {
                continue;
            }
            let sphere = body.bounding_sphere();
            candidates.clear();
            ctx.space.range_query_into(
                &sphere.center,
                sphere.radius,
                QueryFilter::overlapping_objects(),
                &mut candidates,
            );
            for &other in &candidates {
                if !self.should_test(ctx, handle, other, Pass::Space) {
                    continue;
                }
                self.stats.space_pairs_considered += 1;
                if self.collide_pair(ctx, handle, other) == PairOutcome::InitiatorDestroyed {
                    break;
                }
            }
        }
        self.candidates = candidates;
        self.active = active;
    }

    /// Pair filtering shared by the space and environment passes
    fn should_test(&self, ctx: &DetectionContext<'_>, handle: BodyHandle, other: BodyHandle, pass: Pass) -> bool {
        if handle == other {
            return false;
        }
        let (Some(body), Some(candidate)) = (ctx.bodies.get(handle), ctx.bodies.get(other)) else {
            return false;
        };
        if !candidate.collides() {
            return false;
        }
        // Each pair once: the lower handle initiates unless the candidate never does
        if !candidate.is_passive() && other < handle {
            return false;
        }
        // Fast movers in open space handle their own collisions through swept tests
        if pass == Pass::Space && candidate.is_fast_mover(self.config.fast_mover_threshold) {
            return false;
        }
        if body.excludes(other) || candidate.excludes(handle) {
            return false;
        }
        !(body.is_static() && candidate.is_static() && !ctx.clock.static_pairs_due())
    }

    fn collide_pair(&mut self, ctx: &mut DetectionContext<'_>, handle: BodyHandle, other: BodyHandle) -> PairOutcome {
        let (Some(body), Some(candidate)) = (ctx.bodies.get(handle), ctx.bodies.get(other)) else {
            return PairOutcome::Missed;
        };
        if broadphase(&body.bounding_sphere(), &candidate.bounding_sphere()).is_none() {
            return PairOutcome::Missed;
        }
        self.stats.broadphase_passes += 1;

        let Some([body, candidate]) = ctx.bodies.get_disjoint_mut([handle, other]) else {
            return PairOutcome::Missed;
        };
        body.refresh_collider();
        candidate.refresh_collider();
        let Some(contact) = narrowphase::test_pair(
            &Participant::of(body),
            &Participant::of(candidate),
            self.config.sat_parallel_epsilon,
        ) else {
            return PairOutcome::Missed;
        };
        trace!("CollisionDetector: narrowphase contact {handle:?} / {other:?}");

        let Some(resolution) = self.resolver.resolve(body, candidate, &contact, false) else {
            return PairOutcome::Missed;
        };
        self.stats.narrowphase_collisions += 1;
        let events = pair_events((handle, &*body), (other, &*candidate), &resolution, false);
        self.dispatch_pair(ctx, &events)
    }

    fn dispatch_pair(&mut self, ctx: &mut DetectionContext<'_>, events: &[ImpactEvent; 2]) -> PairOutcome {
        let destroy_initiator = ctx.dispatcher.dispatch(&events[0]);
        if ctx.dispatcher.dispatch(&events[1]) {
            self.destroy(ctx, events[1].body);
        }
        if destroy_initiator {
            self.destroy(ctx, events[0].body);
            return PairOutcome::InitiatorDestroyed;
        }
        PairOutcome::Resolved
    }

    fn destroy(&mut self, ctx: &mut DetectionContext<'_>, handle: BodyHandle) {
        if ctx.remove_body(handle).is_some() {
            self.stats.bodies_destroyed += 1;
            debug!("CollisionDetector: destroyed {handle:?} on impact");
        }
    }

    fn continuous_pass(&mut self, ctx: &mut DetectionContext<'_>) {
        let active = std::mem::take(&mut self.active);
        for &handle in &active {
            let Some(body) = ctx.bodies.get(handle) else {
                continue;
            };
            if body.is_passive() || !body.collides() || !body.is_fast_mover(self.config.fast_mover_threshold) {
                continue;
            }
            self.sweep(ctx, handle);
        }
        self.active = active;
    }

    /// Sequential swept collisions for one fast mover
    ///
    /// Each hit relocates the body to its contact position and re-sweeps it
    /// along the post-impact velocity for the rest of the step. The clock's
    /// time factor tracks the time left and is restored afterwards.
    fn sweep(&mut self, ctx: &mut DetectionContext<'_>, handle: BodyHandle) {
        let saved_time_factor = ctx.clock.time_factor;
        let mut last_hit = None;
        let mut candidates = std::mem::take(&mut self.candidates);

        for _ in 0..self.config.max_intra_frame_ccd_collisions {
            if ctx.clock.time_factor < EPSILON {
                break;
            }
            let Some(body) = ctx.bodies.get(handle) else {
                break;
            };
            let start = body.previous_position();
            let displacement = body.step_displacement();
            let radius = body.collision_radius();
            if displacement.norm_squared() < EPSILON {
                break;
            }

            // Twice the squared step, floored per axis, leaves room for ricochets
            let reach = utils::floor_magnitude(&displacement, 1.0).norm() * SQRT_2;
            candidates.clear();
            ctx.space.range_query_into(
                &body.position(),
                reach,
                QueryFilter::overlapping_objects(),
                &mut candidates,
            );

            let mut best: Option<(BodyHandle, ContinuousContact, Option<ObbData>)> = None;
            let mut best_time = CCD_NO_HIT;
            for &other in &candidates {
                if other == handle || Some(other) == last_hit {
                    continue;
                }
                let excluded = ctx.bodies.get(handle).is_some_and(|b| b.excludes(other));
                let Some(candidate) = ctx.bodies.get_mut(other) else {
                    continue;
                };
                if excluded || !candidate.collides() || candidate.excludes(handle) {
                    continue;
                }
                self.stats.ccd_checks += 1;
                candidate.refresh_collider();

                let hit = match candidate.collider().filter(|_| candidate.uses_collider()) {
                    Some(collider) => sweep_hierarchy(&start, &displacement, radius, collider),
                    None => continuous_sphere_vs_sphere(
                        &start,
                        &displacement,
                        radius,
                        &candidate.previous_position(),
                        &candidate.step_displacement(),
                        candidate.collision_radius(),
                    )
                    .map(|contact| (contact, None)),
                };
                let Some((contact, leaf)) = hit else {
                    continue;
                };
                // Already touching at the start but moving away
                let towards = leaf.map_or_else(|| candidate.previous_position(), |l| l.centre) - start;
                if contact.time <= 0.0 && displacement.dot(&towards) <= 0.0 {
                    continue;
                }
                if contact.time < best_time {
                    best_time = contact.time;
                    best = Some((other, contact, leaf));
                }
            }

            let Some((other, contact, leaf)) = best else {
                break;
            };
            self.stats.ccd_collisions += 1;
            debug!(
                "CollisionDetector: swept hit {handle:?} -> {other:?} at t {:.3}",
                contact.time
            );

            let remaining = 1.0 - contact.time;
            let Some([body, candidate]) = ctx.bodies.get_disjoint_mut([handle, other]) else {
                break;
            };
            let pair = ContactPair {
                collider0: None,
                collider1: leaf,
                centre0: Some(contact.position),
                centre1: leaf
                    .is_none()
                    .then(|| candidate.previous_position() + candidate.step_displacement() * contact.time),
            };
            let resolution = self.resolver.resolve(body, candidate, &pair, true);
            let events = resolution.map(|r| pair_events((handle, &*body), (other, &*candidate), &r, true));

            body.set_step(contact.position, body.velocity * (ctx.clock.time_factor * remaining));
            let (position, radius) = (body.position(), body.collision_radius());
            if let Err(err) = ctx.space.move_item(handle, position, radius) {
                warn!("CollisionDetector: relocating swept body failed: {err}");
            }
            ctx.clock.time_factor *= remaining;
            last_hit = Some(other);

            if let Some(events) = events {
                if self.dispatch_pair(ctx, &events) == PairOutcome::InitiatorDestroyed {
                    break;
                }
            }
        }

        self.candidates = candidates;
        ctx.clock.time_factor = saved_time_factor;
    }

    fn environment_pass(&mut self, ctx: &mut DetectionContext<'_>, focus: Option<Vec3>) {
        let mut handles = std::mem::take(&mut self.environment_handles);
        handles.clear();
        handles.extend(ctx.environments.keys());
        for &env_handle in &handles {
            self.environment_collisions(ctx, env_handle, focus);
        }
        self.environment_handles = handles;
    }

    fn environment_collisions(
        &mut self,
        ctx: &mut DetectionContext<'_>,
        env_handle: EnvironmentHandle,
        focus: Option<Vec3>,
    ) {
        let Some(env) = ctx.environments.get(env_handle) else {
            return;
        };
        let mut active = std::mem::take(&mut self.active);
        active.clear();
        match focus {
            Some(point) => env.objects_within(
                &env.to_local(&point),
                self.environment_config.active_collision_distance,
                &mut active,
            ),
            None => active.extend_from_slice(env.objects()),
        }

        let mut nearby = std::mem::take(&mut self.nearby);
        for &handle in &active {
            let Some(body) = ctx.bodies.get(handle) else {
                continue;
            };
            if body.is_passive() || !body.collides() {
                continue;
            }
            let (position, radius) = (body.position(), body.collision_radius());
            let falling_speed = body.velocity.y;
            let Some(env) = ctx.environments.get(env_handle) else {
                break;
            };
            self.stats.environment_objects_tested += 1;
            nearby.clear();
            env.items_near(&position, radius, ItemKinds::ALL, &mut nearby);

            for &item in &nearby {
                let outcome = match item {
                    EnvironmentItem::Terrain(terrain) => self.collide_terrain(ctx, env_handle, handle, terrain),
                    EnvironmentItem::Object(other) => {
                        if !self.should_test(ctx, handle, other, Pass::Environment) {
                            continue;
                        }
                        self.stats.environment_object_pairs += 1;
                        self.collide_pair(ctx, handle, other)
                    }
                };
                if outcome == PairOutcome::InitiatorDestroyed {
                    break;
                }
            }

            // Downward motion cancelled by contact means the object is standing on something
            if let Some(body) = ctx.bodies.get_mut(handle) {
                let vertical = body.velocity.y;
                body.set_on_ground(
                    falling_speed < GROUND_FALLING_EPSILON
                        && vertical > falling_speed
                        && vertical.abs() < GROUND_REST_EPSILON,
                );
            }
        }
        self.nearby = nearby;
        self.active = active;
    }

    /// Push an object out of a terrain block, or step it up onto a low one
    fn collide_terrain(
        &mut self,
        ctx: &mut DetectionContext<'_>,
        env_handle: EnvironmentHandle,
        handle: BodyHandle,
        terrain_handle: TerrainHandle,
    ) -> PairOutcome {
        let Some(terrain) = ctx
            .environments
            .get(env_handle)
            .and_then(|env| env.terrain(terrain_handle))
        else {
            return PairOutcome::Missed;
        };
        let Some(body) = ctx.bodies.get_mut(handle) else {
            return PairOutcome::Missed;
        };
        if body.is_static() {
            return PairOutcome::Missed;
        }
        self.stats.terrain_checks += 1;
        if broadphase(&body.bounding_sphere(), &terrain.bounding_sphere()).is_none() {
            return PairOutcome::Missed;
        }

        body.refresh_collider();
        let sat = match body.collider().filter(|_| body.uses_collider()) {
            Some(collider) => hierarchy_vs_terrain(collider, terrain.collider(), self.config.sat_parallel_epsilon),
            None => {
                let bounds = ObbData::from_transform(body.transform(), body.size() * 0.5);
                box_vs_terrain(&bounds, terrain.collider(), self.config.sat_parallel_epsilon)
            }
        };
        let Some(sat) = sat else {
            return PairOutcome::Missed;
        };

        let up = Vec3::y();
        let height = body.size().y;
        let pre_impact_velocity = body.velocity;
        let mut position = body.position();
        let step = terrain.top(&up) - (position.y - height * 0.5);
        if step > 0.0 && step <= self.environment_config.terrain_step_threshold * height {
            position += up * step;
            let falling = body.velocity.dot(&up);
            if falling < 0.0 {
                body.velocity -= up * falling;
            }
        } else {
            // SAT normal points from the object into the terrain
            position -= sat.normal * sat.penetration;
            let into = body.velocity.dot(&sat.normal);
            if into > 0.0 {
                body.velocity -= sat.normal * into;
            }
        }
        body.set_position(position);
        self.stats.terrain_collisions += 1;
        trace!("CollisionDetector: terrain contact {handle:?} depth {:.3}", sat.penetration);

        let velocity_change = body.velocity - pre_impact_velocity;
        let impact_force = velocity_change.norm() * body.mass();
        let event = ImpactEvent {
            body: handle,
            owner: body.owner(),
            other: ImpactSource::Terrain,
            contact_point: terrain.collider().data().closest_point(&position),
            normal: -sat.normal,
            pre_impact_velocity,
            velocity_change,
            velocity_change_magnitude: velocity_change.norm(),
            impact_force,
            total_impact_force: impact_force,
            continuous: false,
        };
        let radius = body.collision_radius();

        if ctx.dispatcher.dispatch(&event) {
            self.destroy(ctx, handle);
            return PairOutcome::InitiatorDestroyed;
        }
        if let Some(env) = ctx.environments.get_mut(env_handle) {
            if let Err(err) = env.move_object(handle, position, radius) {
                warn!("CollisionDetector: moving object after terrain contact failed: {err}");
            }
        }
        PairOutcome::Resolved
    }
}

/// Earliest swept hit against the leaves of a hierarchy
fn sweep_hierarchy(
    start: &Vec3,
    displacement: &Vec3,
    radius: f32,
    collider: &OrientedBoundingBox,
) -> Option<(ContinuousContact, Option<ObbData>)> {
    let mut best: Option<(ContinuousContact, Option<ObbData>)> = None;
    collider.for_each_leaf(&mut |leaf| {
        if let Some(hit) = continuous_sphere_vs_obb(start, displacement, radius, leaf) {
            if best.map_or(true, |(b, _)| hit.time < b.time) {
                best = Some((hit, Some(*leaf)));
            }
        }
    });
    best
}

fn box_vs_terrain(bounds: &ObbData, terrain: &OrientedBoundingBox, parallel_epsilon: f32) -> Option<SatResult> {
    let sat = sat_obb_vs_obb(bounds, terrain.data(), parallel_epsilon)?;
    if terrain.is_leaf() {
        return Some(sat);
    }
    terrain
        .children()
        .iter()
        .find_map(|child| box_vs_terrain(bounds, child, parallel_epsilon))
}

fn hierarchy_vs_terrain(
    collider: &OrientedBoundingBox,
    terrain: &OrientedBoundingBox,
    parallel_epsilon: f32,
) -> Option<SatResult> {
    obb_hierarchy_vs_hierarchy(collider, terrain, parallel_epsilon).map(|c| c.sat)
}

fn pair_events(
    first: (BodyHandle, &RigidBody),
    second: (BodyHandle, &RigidBody),
    resolution: &Resolution,
    continuous: bool,
) -> [ImpactEvent; 2] {
    let total_impact_force = resolution.total_impact_force();
    let event = |(handle, body): (BodyHandle, &RigidBody), other: BodyHandle, contact_point: Vec3, normal: Vec3, impact: &ImpactData| ImpactEvent {
        body: handle,
        owner: body.owner(),
        other: ImpactSource::Body(other),
        contact_point,
        normal,
        pre_impact_velocity: impact.pre_impact_velocity,
        velocity_change: impact.velocity_change,
        velocity_change_magnitude: impact.velocity_change_magnitude,
        impact_force: impact.impact_force,
        total_impact_force,
        continuous,
    };
    [
        event(first, second.0, resolution.contact0, resolution.normal, &resolution.impact0),
        event(second, first.0, resolution.contact1, -resolution.normal, &resolution.impact1),
    ]
}
