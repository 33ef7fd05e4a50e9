//! Collision sandbox
//!
//! Builds a drifting field of bodies around a ship and a static station,
//! gives the ship a walkable interior, fires a stream of projectiles through
//! the field and logs per-frame collision counters.
//!
//! Usage: `collision_sandbox [config.toml|config.ron] [frames] [seed]`

use std::cell::Cell;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spacesim_physics::prelude::*;

const FRAME_DELTA: f32 = 1.0 / 60.0;
const FIELD_RADIUS: f32 = 400.0;

struct Scenario {
    world: PhysicsWorld,
    ship: BodyHandle,
    interior: EnvironmentHandle,
    gun_ports: Vec<Vec3>,
    hits: Rc<Cell<u32>>,
}

fn random_unit(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        if let Some(unit) = v.try_normalize(1e-3) {
            return unit;
        }
    }
}

/// The interior grid is centred on the ship in x and z
fn interior_placement(ship_position: Vec3) -> Transform {
    Transform::from_position(ship_position - Vec3::new(30.0, 0.0, 30.0))
}

fn build_scenario(config: PhysicsConfig, rng: &mut StdRng) -> Result<Scenario, PhysicsError> {
    let mut world = PhysicsWorld::new(config)?;

    let ship = world.add_body(
        RigidBody::new(Vec3::zeros())
            .with_collider(
                OrientedBoundingBox::new(Vec3::new(20.0, 8.0, 40.0))
                    .with_child(
                        OrientedBoundingBox::new(Vec3::new(20.0, 8.0, 20.0))
                            .with_offset(Transform::from_position(Vec3::new(0.0, 0.0, -20.0))),
                    )
                    .with_child(
                        OrientedBoundingBox::new(Vec3::new(8.0, 6.0, 20.0))
                            .with_offset(Transform::from_position(Vec3::new(0.0, 0.0, 20.0))),
                    ),
            )
            .with_mass(5000.0)
            .with_velocity(Vec3::new(0.0, 0.0, 5.0))
            .with_owner(OwnerKind::Ship),
    )?;

    world.add_body(
        RigidBody::new(Vec3::new(0.0, 0.0, 250.0))
            .with_collider(
                OrientedBoundingBox::new(Vec3::new(60.0, 50.0, 10.0))
                    .with_child(OrientedBoundingBox::new(Vec3::new(60.0, 10.0, 10.0)))
                    .with_child(
                        OrientedBoundingBox::new(Vec3::new(10.0, 30.0, 10.0))
                            .with_offset(Transform::from_position(Vec3::new(0.0, 20.0, 0.0))),
                    )
                    .with_auto_fit(),
            )
            .as_static(),
    )?;

    for _ in 0..300 {
        let position = random_unit(rng) * rng.gen_range(80.0..FIELD_RADIUS);
        let size = rng.gen_range(1.0..8.0);
        let body = RigidBody::new(position)
            .with_mass(size * size * size)
            .with_velocity(random_unit(rng) * rng.gen_range(0.0..15.0))
            .with_angular_velocity(random_unit(rng) * rng.gen_range(0.0..1.0))
            .with_owner(OwnerKind::Other);
        let body = if rng.gen_bool(0.5) {
            body.with_sphere(size)
        } else {
            body.with_collider(OrientedBoundingBox::new(Vec3::new(size, size * 0.7, size * 0.9)))
        };
        world.add_body(body)?;
    }

    let interior = world.add_environment(interior_placement(Vec3::zeros()), [6, 2, 6])?;
    world.add_terrain(interior, Terrain::cuboid(Vec3::new(30.0, 0.5, 30.0), Vec3::new(30.0, 0.5, 30.0)))?;
    for step in 0..4 {
        let height = 1.0 + 0.5 * (step as f32 + 1.0);
        world.add_terrain(
            interior,
            Terrain::cuboid(Vec3::new(40.0 + 2.0 * step as f32, height * 0.5, 30.0), Vec3::new(1.0, height * 0.5, 5.0)),
        )?;
    }
    for i in 0..6 {
        let actor = world.add_body(
            RigidBody::new(Vec3::zeros())
                .with_sphere(1.0)
                .with_owner(OwnerKind::Actor),
        )?;
        let local = Vec3::new(10.0 + 5.0 * i as f32, 2.0, 30.0);
        world.place_in_environment(actor, interior, local)?;
        if let Some(body) = world.body_mut(actor) {
            body.velocity = Vec3::new(rng.gen_range(1.0..4.0), 0.0, rng.gen_range(-1.0..1.0));
        }
    }

    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    world.register_impact_handler(OwnerKind::Projectile, move |event: &ImpactEvent| {
        counter.set(counter.get() + 1);
        log::debug!("Projectile {:?} hit {:?} with force {:.1}", event.body, event.other, event.impact_force);
        ImpactResponse::Destroy
    });
    world.register_impact_handler(OwnerKind::Ship, |event: &ImpactEvent| {
        if event.total_impact_force > 1000.0 {
            log::warn!("Ship took a heavy impact ({:.0})", event.total_impact_force);
        }
        ImpactResponse::Consumed
    });

    world.set_focus(Some(ship));
    Ok(Scenario {
        world,
        ship,
        interior,
        gun_ports: vec![Vec3::new(-6.0, 0.0, 42.0), Vec3::new(6.0, 0.0, 42.0)],
        hits,
    })
}

fn fire(scenario: &mut Scenario, rng: &mut StdRng) -> Result<(), PhysicsError> {
    let Some(ship) = scenario.world.body(scenario.ship) else {
        return Ok(());
    };
    let (origin, heading) = (ship.position(), ship.rotation() * Vec3::z());
    let port = scenario.gun_ports[rng.gen_range(0..scenario.gun_ports.len())];
    let spread = random_unit(rng) * 0.05;
    let shot = RigidBody::new(origin + ship.rotation() * port)
        .with_sphere(0.2)
        .with_mass(0.1)
        .with_velocity((heading + spread).normalize() * 900.0)
        .with_owner(OwnerKind::Projectile);
    let shot = scenario.world.add_body(shot)?;
    scenario.world.add_collision_exclusion(scenario.ship, shot)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    spacesim_physics::foundation::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => {
            log::info!("Loading physics configuration from {path}");
            PhysicsConfig::load_from_file(path)?
        }
        None => PhysicsConfig::default(),
    };
    let frames: u64 = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(600);
    let seed: u64 = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(1);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut scenario = build_scenario(config, &mut rng)?;
    log::info!(
        "Collision sandbox: {} bodies, {frames} frames, seed {seed}",
        scenario.world.body_count()
    );

    let mut totals = CollisionStats::default();
    for frame in 0..frames {
        if frame % 6 == 0 {
            fire(&mut scenario, &mut rng)?;
        }
        let stats = scenario.world.simulate(FRAME_DELTA);
        if let Some(position) = scenario.world.body(scenario.ship).map(RigidBody::position) {
            if let Some(interior) = scenario.world.environment_mut(scenario.interior) {
                interior.set_transform(interior_placement(position));
            }
        }
        totals.narrowphase_collisions += stats.narrowphase_collisions;
        totals.ccd_collisions += stats.ccd_collisions;
        totals.terrain_collisions += stats.terrain_collisions;
        totals.bodies_destroyed += stats.bodies_destroyed;
        if frame % 60 == 0 {
            log::info!("Frame {frame}: {stats}");
        }

        // Drop projectiles that left the field
        let strays: Vec<BodyHandle> = scenario
            .world
            .bodies()
            .filter(|(_, body)| body.owner() == OwnerKind::Projectile && body.position().norm() > FIELD_RADIUS * 2.0)
            .map(|(handle, _)| handle)
            .collect();
        for stray in strays {
            scenario.world.remove_body(stray);
        }
    }

    log::info!("Sandbox finished after {:.2}s simulated", scenario.world.clock().elapsed());
    log::info!("Totals: {totals}");
    log::info!("Projectile hits: {}", scenario.hits.get());
    Ok(())
}
