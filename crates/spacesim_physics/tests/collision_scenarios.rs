//! End-to-end collision scenarios driven through `PhysicsWorld`

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use spacesim_physics::physics::ImpactSource;
use spacesim_physics::prelude::*;

const FRAME: f32 = 1.0 / 60.0;

fn world() -> PhysicsWorld {
    PhysicsWorld::new(PhysicsConfig::default()).unwrap()
}

fn unit_cube(position: Vec3) -> RigidBody {
    RigidBody::new(position).with_collider(OrientedBoundingBox::new(Vec3::repeat(1.0)))
}

#[test]
fn fast_sphere_bounces_off_static_box() {
    let mut world = world();
    let ball = world
        .add_body(RigidBody::new(Vec3::new(5.0, 0.0, 0.0)).with_sphere(1.0).with_velocity(Vec3::new(-300.0, 0.0, 0.0)))
        .unwrap();
    world.add_body(unit_cube(Vec3::zeros()).as_static()).unwrap();

    let stats = world.simulate(FRAME);
    assert_eq!(stats.ccd_collisions, 1);
    assert_eq!(stats.narrowphase_collisions, 0);

    let body = world.body(ball).unwrap();
    assert_relative_eq!(body.velocity, Vec3::new(270.0, 0.0, 0.0), epsilon = 1e-2);
    // Contact at 60% of the step with the sphere touching the x = 1 face
    assert_relative_eq!(body.previous_position(), Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-3);
    assert_relative_eq!(body.position(), Vec3::new(3.8, 0.0, 0.0), epsilon = 1e-3);
    assert!(world.space().validate().is_ok());
}

#[test]
fn thin_wall_stops_tunnelling() {
    let mut world = world();
    let bullet = world
        .add_body(
            RigidBody::new(Vec3::new(-50.0, 0.0, 0.0))
                .with_sphere(0.1)
                .with_velocity(Vec3::new(6000.0, 0.0, 0.0)),
        )
        .unwrap();
    world
        .add_body(
            RigidBody::new(Vec3::zeros())
                .with_collider(OrientedBoundingBox::new(Vec3::new(0.1, 10.0, 10.0)))
                .as_static(),
        )
        .unwrap();

    world.simulate(FRAME);
    let body = world.body(bullet).unwrap();
    assert!(body.position().x < 0.0, "bullet passed the wall: {:?}", body.position());
    assert!(body.velocity.x < 0.0);

    // Keeps moving away on later frames without a second hit
    let stats = world.simulate(FRAME);
    assert_eq!(stats.ccd_collisions, 0);
    assert!(world.body(bullet).unwrap().position().x < -45.0);
}

#[test]
fn head_on_spheres_exchange_momentum_with_restitution() {
    let mut world = world();
    let a = world
        .add_body(RigidBody::new(Vec3::new(-0.9, 0.0, 0.0)).with_velocity(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    let b = world
        .add_body(RigidBody::new(Vec3::new(0.9, 0.0, 0.0)).with_velocity(Vec3::new(-1.0, 0.0, 0.0)))
        .unwrap();

    let stats = world.simulate(FRAME);
    assert_eq!(stats.narrowphase_collisions, 1);
    assert_relative_eq!(world.body(a).unwrap().velocity, Vec3::new(-0.9, 0.0, 0.0), epsilon = 1e-4);
    assert_relative_eq!(world.body(b).unwrap().velocity, Vec3::new(0.9, 0.0, 0.0), epsilon = 1e-4);

    // Separating now, so the next frame leaves them alone
    let stats = world.simulate(FRAME);
    assert_eq!(stats.narrowphase_collisions, 0);
}

#[test]
fn static_pairs_are_tested_on_the_interval() {
    let mut world = world();
    world.add_body(unit_cube(Vec3::zeros()).as_static()).unwrap();
    world.add_body(unit_cube(Vec3::new(1.5, 0.0, 0.0)).as_static()).unwrap();

    let considered: Vec<u32> = (0..10).map(|_| world.simulate(0.1).space_pairs_considered).collect();
    assert_eq!(&considered[..9], &[0; 9]);
    assert_eq!(considered[9], 1);
}

#[test]
fn exclusion_lets_bodies_pass_through() {
    let mut world = world();
    let a = world
        .add_body(RigidBody::new(Vec3::new(-0.9, 0.0, 0.0)).with_velocity(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    let b = world.add_body(RigidBody::new(Vec3::new(0.9, 0.0, 0.0))).unwrap();
    world.add_collision_exclusion(a, b).unwrap();

    assert_eq!(world.simulate(FRAME).total_collisions(), 0);
    assert_relative_eq!(world.body(a).unwrap().velocity.x, 1.0);

    world.remove_collision_exclusion(a, b);
    assert_eq!(world.simulate(FRAME).narrowphase_collisions, 1);
}

#[test]
fn projectile_destroyed_by_its_handler() {
    let mut world = world();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    world.register_impact_handler(OwnerKind::Projectile, move |event: &ImpactEvent| {
        log.borrow_mut().push(*event);
        ImpactResponse::Destroy
    });

    let rock = world.add_body(unit_cube(Vec3::new(1.5, 0.0, 0.0)).with_mass(50.0)).unwrap();
    let shot = world
        .add_body(
            RigidBody::new(Vec3::zeros())
                .with_sphere(0.6)
                .with_velocity(Vec3::new(10.0, 0.0, 0.0))
                .with_owner(OwnerKind::Projectile),
        )
        .unwrap();

    let stats = world.simulate(FRAME);
    assert_eq!(stats.bodies_destroyed, 1);
    assert!(!world.contains_body(shot));
    assert!(!world.space().contains(&shot));
    assert!(world.contains_body(rock));
    assert!(world.body(rock).unwrap().velocity.x > 0.0);

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].body, shot);
    assert_eq!(seen[0].other, ImpactSource::Body(rock));
    assert!(seen[0].impact_force > 0.0);
}

#[test]
fn focus_limits_detection_to_nearby_bodies() {
    let mut config = PhysicsConfig::default();
    config.collision.active_collision_distance = 100.0;
    let mut world = PhysicsWorld::new(config).unwrap();

    let camera = world.add_body(RigidBody::new(Vec3::zeros()).with_mode(CollisionMode::None)).unwrap();
    world
        .add_body(RigidBody::new(Vec3::new(999.1, 0.0, 0.0)).with_velocity(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    world.add_body(RigidBody::new(Vec3::new(1000.9, 0.0, 0.0))).unwrap();

    world.set_focus(Some(camera));
    assert_eq!(world.simulate(FRAME).narrowphase_collisions, 0);

    world.set_focus(None);
    assert_eq!(world.simulate(FRAME).narrowphase_collisions, 1);
}

#[test]
fn actor_walks_through_ship_interior() {
    let mut world = world();
    let ship = world
        .add_environment(Transform::from_position(Vec3::new(100.0, 0.0, 0.0)), [4, 2, 4])
        .unwrap();
    world
        .add_terrain(ship, Terrain::cuboid(Vec3::new(20.0, 0.5, 20.0), Vec3::new(20.0, 0.5, 20.0)))
        .unwrap();
    let crate_block = world
        .add_terrain(ship, Terrain::cuboid(Vec3::new(25.0, 1.25, 10.0), Vec3::new(1.0, 0.25, 1.0)))
        .unwrap();

    let actor = world
        .add_body(RigidBody::new(Vec3::zeros()).with_sphere(1.0).with_owner(OwnerKind::Actor))
        .unwrap();
    world.place_in_environment(actor, ship, Vec3::new(10.0, 1.9, 10.0)).unwrap();
    world.body_mut(actor).unwrap().velocity = Vec3::new(0.0, -2.0, 0.0);

    let stats = world.simulate(FRAME);
    assert_eq!(stats.environment_objects_tested, 1);
    assert!(stats.terrain_collisions >= 1);
    let body = world.body(actor).unwrap();
    assert_relative_eq!(body.position().y, 2.0, epsilon = 1e-4);
    assert!(body.is_on_ground());
    assert_relative_eq!(world.world_position(actor).unwrap(), Vec3::new(110.0, 2.0, 10.0), epsilon = 1e-4);

    let env = world.environment(ship).unwrap();
    let contents = env.element_contents([1, 0, 1]).unwrap();
    assert!(contents.objects.contains(&actor));
    let hit = world
        .ray_vs_environment(ship, &Ray::new(Vec3::new(100.0, 1.25, 10.0), Vec3::x()), 40.0)
        .unwrap();
    assert_eq!(hit.terrain, crate_block);
    assert_relative_eq!(hit.distance, 24.0, epsilon = 1e-4);
}

#[test]
fn environment_objects_only_see_each_other() {
    let mut world = world();
    let ship = world.add_environment(Transform::identity(), [4, 4, 4]).unwrap();
    let a = world.add_body(RigidBody::new(Vec3::zeros())).unwrap();
    let b = world.add_body(RigidBody::new(Vec3::zeros())).unwrap();
    let outside = world.add_body(RigidBody::new(Vec3::new(21.0, 20.0, 20.0))).unwrap();
    world.place_in_environment(a, ship, Vec3::new(20.0, 20.0, 20.0)).unwrap();
    world.place_in_environment(b, ship, Vec3::new(22.0, 20.0, 20.0)).unwrap();

    assert_eq!(world.objects_within_distance_of(a, 5.0), vec![b]);
    assert_eq!(world.objects_within_distance_of(outside, 5.0), Vec::<BodyHandle>::new());
    assert!(world.objects_within_distance(&Vec3::new(20.0, 20.0, 20.0), 3.0).contains(&outside));
}

/// A stationary sphere and a fast one closing on it inside a ship interior,
/// overlapping after one frame; returns (stats, fast, slow)
fn interior_closing_pair(fast_added_first: bool) -> (CollisionStats, RigidBody, RigidBody) {
    let mut world = world();
    let ship = world.add_environment(Transform::identity(), [4, 4, 4]).unwrap();
    let spawn_fast = |world: &mut PhysicsWorld| {
        let handle = world
            .add_body(RigidBody::new(Vec3::zeros()).with_velocity(Vec3::new(-120.0, 0.0, 0.0)))
            .unwrap();
        world.place_in_environment(handle, ship, Vec3::new(23.5, 20.0, 20.0)).unwrap();
        handle
    };
    let spawn_slow = |world: &mut PhysicsWorld| {
        let handle = world.add_body(RigidBody::new(Vec3::zeros())).unwrap();
        world.place_in_environment(handle, ship, Vec3::new(20.0, 20.0, 20.0)).unwrap();
        handle
    };
    let (fast, slow) = if fast_added_first {
        let fast = spawn_fast(&mut world);
        (fast, spawn_slow(&mut world))
    } else {
        let slow = spawn_slow(&mut world);
        (spawn_fast(&mut world), slow)
    };
    assert_eq!(fast < slow, fast_added_first);

    let stats = world.simulate(FRAME);
    let fast = world.body(fast).unwrap().clone();
    assert!(fast.is_fast_mover(PhysicsConfig::default().collision.fast_mover_threshold));
    (stats, fast, world.body(slow).unwrap().clone())
}

#[test]
fn fast_mover_with_higher_handle_collides_in_interior() {
    let (stats, fast, slow) = interior_closing_pair(false);
    assert_eq!(stats.environment_object_pairs, 1);
    assert_eq!(stats.narrowphase_collisions, 1);
    assert_relative_eq!(fast.velocity, Vec3::new(-6.0, 0.0, 0.0), epsilon = 1e-2);
    assert_relative_eq!(slow.velocity, Vec3::new(-114.0, 0.0, 0.0), epsilon = 1e-2);
}

#[test]
fn fast_mover_with_lower_handle_collides_in_interior() {
    let (stats, fast, slow) = interior_closing_pair(true);
    assert_eq!(stats.environment_object_pairs, 1);
    assert_eq!(stats.narrowphase_collisions, 1);
    assert_relative_eq!(fast.velocity, Vec3::new(-6.0, 0.0, 0.0), epsilon = 1e-2);
    assert_relative_eq!(slow.velocity, Vec3::new(-114.0, 0.0, 0.0), epsilon = 1e-2);
}

#[test]
fn bodies_leaving_the_world_return_to_the_tree() {
    let mut config = PhysicsConfig::default();
    config.spatial.world_half_extent = 100.0;
    let mut world = PhysicsWorld::new(config).unwrap();
    let drifter = world
        .add_body(RigidBody::new(Vec3::new(99.0, 0.0, 0.0)).with_velocity(Vec3::new(120.0, 0.0, 0.0)))
        .unwrap();

    world.simulate(FRAME);
    assert!(!world.space().contains(&drifter));
    assert!(world.contains_body(drifter));

    world.body_mut(drifter).unwrap().set_position(Vec3::new(50.0, 0.0, 0.0));
    world.body_mut(drifter).unwrap().velocity = Vec3::zeros();
    world.simulate(FRAME);
    assert!(world.space().contains(&drifter));
    assert!(world.space().validate().is_ok());
}
