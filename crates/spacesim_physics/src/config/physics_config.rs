//! Physics tunables
//!
//! Defaults reproduce the values the simulation was balanced against; every
//! section may be omitted from a config file and falls back to them.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};

/// Spatial partitioning settings shared by the space and environment trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Items a leaf may hold before it subdivides
    pub max_items_per_node: usize,
    /// Smallest edge length a node may be split down to
    pub min_node_size: f32,
    /// Hard limit on nodes drawn from the pool
    pub node_pool_capacity: usize,
    /// Nodes allocated up front when a tree is created
    pub preallocated_nodes: usize,
    /// Half the edge length of the cube covered by the open-space tree
    pub world_half_extent: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            max_items_per_node: 12,
            min_node_size: 10.0,
            node_pool_capacity: 8192,
            preallocated_nodes: 256,
            world_half_extent: 1_000_000.0,
        }
    }
}

/// Collision detection and response settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Coefficient of restitution applied to the normal impulse
    pub restitution: f32,
    /// Tangential impulse ratio below which contact sticks
    pub static_friction: f32,
    /// Tangential impulse ratio applied once contact slides
    pub dynamic_friction: f32,
    /// Fraction of a body's smallest dimension it must travel per step to use CCD
    pub fast_mover_threshold: f32,
    /// Sequential CCD collisions handled for one body within a frame
    pub max_intra_frame_ccd_collisions: usize,
    /// Interval between passes that also test static-vs-static pairs
    pub static_pair_interval_ms: u32,
    /// Tolerance below one at which two box axes count as parallel in SAT
    pub sat_parallel_epsilon: f32,
    /// Radius around the collision focus within which space bodies are tested
    pub active_collision_distance: f32,
    /// Capacity of each body's collision exclusion list
    pub max_collision_exclusions: usize,
    /// Linear speed clamp applied after resolution
    pub max_linear_speed: f32,
    /// Angular speed clamp applied after resolution
    pub max_angular_speed: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            restitution: 0.9,
            static_friction: 0.7,
            dynamic_friction: 0.5,
            fast_mover_threshold: 0.75,
            max_intra_frame_ccd_collisions: 5,
            static_pair_interval_ms: 1000,
            sat_parallel_epsilon: 0.001,
            active_collision_distance: 5000.0,
            max_collision_exclusions: 64,
            max_linear_speed: 10_000.0,
            max_angular_speed: 100.0,
        }
    }
}

/// Frame timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Minimum physics rate; its inverse is the largest substep
    pub min_cycles_per_second: f32,
    /// Substep count above which the substep grows instead
    pub max_cycles_per_frame: u32,
    /// Frame deltas are clamped to this many seconds
    pub max_frame_delta: f32,
    /// Run every substep of a frame rather than only the first
    pub allow_multiple_substeps: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            min_cycles_per_second: 30.0,
            max_cycles_per_frame: 5,
            max_frame_delta: 0.2,
            allow_multiple_substeps: false,
        }
    }
}

/// Interior environment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Edge length of one grid element
    pub element_size: f32,
    /// Radius around the focus within which environment objects are tested
    pub active_collision_distance: f32,
    /// Fraction of an object's height it may step up onto terrain
    pub terrain_step_threshold: f32,
    /// Items an environment tree leaf may hold before it subdivides
    pub max_items_per_node: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            element_size: 10.0,
            active_collision_distance: 40.0,
            terrain_step_threshold: 0.35,
            max_items_per_node: 12,
        }
    }
}

/// Complete physics configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Spatial tree settings
    pub spatial: SpatialConfig,
    /// Collision settings
    pub collision: CollisionConfig,
    /// Clock settings
    pub clock: ClockConfig,
    /// Environment settings
    pub environment: EnvironmentConfig,
}

impl Config for PhysicsConfig {}

impl PhysicsConfig {
    /// Check that every value lies in its usable range
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, msg: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(msg.to_string()))
            }
        }

        let s = &self.spatial;
        check(s.max_items_per_node > 0, "spatial.max_items_per_node must be > 0")?;
        check(s.min_node_size > 0.0, "spatial.min_node_size must be > 0")?;
        check(s.node_pool_capacity > 0, "spatial.node_pool_capacity must be > 0")?;
        check(
            s.preallocated_nodes <= s.node_pool_capacity,
            "spatial.preallocated_nodes exceeds node_pool_capacity",
        )?;
        check(s.world_half_extent > 0.0, "spatial.world_half_extent must be > 0")?;

        let c = &self.collision;
        check((0.0..=1.0).contains(&c.restitution), "collision.restitution must be in [0, 1]")?;
        check(c.static_friction >= 0.0, "collision.static_friction must be >= 0")?;
        check(c.dynamic_friction >= 0.0, "collision.dynamic_friction must be >= 0")?;
        check(c.fast_mover_threshold > 0.0, "collision.fast_mover_threshold must be > 0")?;
        check(
            c.sat_parallel_epsilon > 0.0 && c.sat_parallel_epsilon < 1.0,
            "collision.sat_parallel_epsilon must be in (0, 1)",
        )?;
        check(c.active_collision_distance >= 0.0, "collision.active_collision_distance must be >= 0")?;
        check(c.max_linear_speed > 0.0, "collision.max_linear_speed must be > 0")?;
        check(c.max_angular_speed > 0.0, "collision.max_angular_speed must be > 0")?;

        let k = &self.clock;
        check(k.min_cycles_per_second > 0.0, "clock.min_cycles_per_second must be > 0")?;
        check(k.max_cycles_per_frame > 0, "clock.max_cycles_per_frame must be > 0")?;
        check(k.max_frame_delta > 0.0, "clock.max_frame_delta must be > 0")?;

        let e = &self.environment;
        check(e.element_size > 0.0, "environment.element_size must be > 0")?;
        check(e.max_items_per_node > 0, "environment.max_items_per_node must be > 0")?;
        check(e.terrain_step_threshold >= 0.0, "environment.terrain_step_threshold must be >= 0")?;
        Ok(())
    }
}
