//! Randomised checks of the octree against brute-force answers

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spacesim_physics::config::SpatialConfig;
use spacesim_physics::foundation::math::Vec3;
use spacesim_physics::physics::collision::Aabb;
use spacesim_physics::spatial::{FreeSpace, ItemKind, ItemKinds, QueryFilter, SpatialTree};

const EXTENT: f32 = 200.0;

fn tree(max_items_per_node: usize) -> SpatialTree<FreeSpace, u32> {
    let config = SpatialConfig {
        max_items_per_node,
        min_node_size: 5.0,
        node_pool_capacity: 16_384,
        preallocated_nodes: 64,
        ..SpatialConfig::default()
    };
    SpatialTree::new(FreeSpace, Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(EXTENT)), config).unwrap()
}

fn random_point(rng: &mut StdRng) -> Vec3 {
    let limit = EXTENT - 1.0;
    Vec3::new(
        rng.gen_range(-limit..limit),
        rng.gen_range(-limit..limit),
        rng.gen_range(-limit..limit),
    )
}

fn brute_force(items: &HashMap<u32, (Vec3, f32)>, origin: &Vec3, radius: f32, overlap: bool) -> Vec<u32> {
    let mut ids: Vec<u32> = items
        .iter()
        .filter(|(_, (p, r))| {
            let reach = if overlap { radius + r } else { radius };
            (p - origin).norm_squared() <= reach * reach
        })
        .map(|(id, _)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn random_walk_keeps_queries_exact() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut tree = tree(6);
    let mut items = HashMap::new();

    for id in 0..400u32 {
        let position = random_point(&mut rng);
        let radius = rng.gen_range(0.1..4.0);
        tree.insert(id, position, radius, ItemKind::Object).unwrap();
        items.insert(id, (position, radius));
    }

    for round in 0..20 {
        // Jitter some items, teleport others, drop a few
        for id in 0..400u32 {
            let Some((position, radius)) = items.get(&id).copied() else {
                continue;
            };
            let roll: f32 = rng.gen();
            let next = if roll < 0.6 {
                let step = Vec3::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0));
                (position + step).map(|c| c.clamp(-EXTENT + 1.0, EXTENT - 1.0))
            } else if roll < 0.7 {
                random_point(&mut rng)
            } else if roll < 0.72 {
                assert!(tree.remove(&id));
                items.remove(&id);
                continue;
            } else {
                continue;
            };
            tree.move_item(id, next, radius).unwrap();
            items.insert(id, (next, radius));
        }
        tree.pruning_check();
        tree.validate().unwrap_or_else(|e| panic!("round {round}: {e}"));
        assert_eq!(tree.len(), items.len());

        for _ in 0..10 {
            let origin = random_point(&mut rng);
            let radius = rng.gen_range(1.0..60.0);

            let mut found = Vec::new();
            tree.range_query_into(&origin, radius, QueryFilter::default(), &mut found);
            found.sort_unstable();
            assert_eq!(found, brute_force(&items, &origin, radius, false), "round {round}");

            found.clear();
            tree.range_query_into(&origin, radius, QueryFilter::overlapping_objects(), &mut found);
            found.sort_unstable();
            assert_eq!(found, brute_force(&items, &origin, radius, true), "round {round}");
        }
    }
}

#[test]
fn nearest_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut tree = tree(4);
    let mut positions = Vec::new();
    for id in 0..250u32 {
        let position = random_point(&mut rng);
        tree.insert(id, position, 0.5, ItemKind::Object).unwrap();
        positions.push(position);
    }

    for _ in 0..50 {
        let query = random_point(&mut rng);
        let (_, distance) = tree.nearest(&query, ItemKinds::OBJECTS).unwrap();
        let expected = positions
            .iter()
            .map(|p| (p - query).norm())
            .fold(f32::INFINITY, f32::min);
        assert!((distance - expected).abs() < 1e-3, "{distance} vs {expected}");
    }
    assert!(tree.nearest(&Vec3::zeros(), ItemKinds::TERRAIN).is_none());
}

#[test]
fn box_queries_include_item_radius() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut tree = tree(8);
    let mut items = HashMap::new();
    for id in 0..300u32 {
        let position = random_point(&mut rng);
        let radius = rng.gen_range(0.5..10.0);
        tree.insert(id, position, radius, ItemKind::Object).unwrap();
        items.insert(id, (position, radius));
    }

    for _ in 0..25 {
        let a = random_point(&mut rng);
        let b = a + Vec3::new(rng.gen_range(1.0..80.0), rng.gen_range(1.0..80.0), rng.gen_range(1.0..80.0));
        let area = Aabb::new(a, b);

        let mut found = Vec::new();
        tree.query_aabb_into(&area, ItemKinds::OBJECTS, &mut found);
        found.sort_unstable();
        let mut expected: Vec<u32> = items
            .iter()
            .filter(|(_, (p, r))| area.intersects_sphere(p, *r))
            .map(|(id, _)| *id)
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }
}

#[test]
fn churn_does_not_leak_nodes() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut tree = tree(4);
    for cycle in 0..5 {
        for id in 0..200u32 {
            tree.insert(id, random_point(&mut rng), 1.0, ItemKind::Object).unwrap();
        }
        assert!(tree.node_count() > 1, "cycle {cycle}");
        for id in 0..200u32 {
            assert!(tree.remove(&id));
        }
        tree.pruning_check();
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1, "cycle {cycle}");
        tree.validate().unwrap();
    }
}
