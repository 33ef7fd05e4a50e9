//! Per-frame collision counters

use std::fmt;

/// Work done by collision detection during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    /// Open-space pairs considered after filtering
    pub space_pairs_considered: u32,
    /// Pairs whose bounding spheres overlapped
    pub broadphase_passes: u32,
    /// Pairs confirmed by the narrowphase and resolved
    pub narrowphase_collisions: u32,
    /// Swept tests run for fast movers
    pub ccd_checks: u32,
    /// Swept tests that produced a collision
    pub ccd_collisions: u32,
    /// Environment objects tested against their surroundings
    pub environment_objects_tested: u32,
    /// Object-vs-terrain tests
    pub terrain_checks: u32,
    /// Object-vs-terrain contacts resolved
    pub terrain_collisions: u32,
    /// Object-vs-object pairs tested inside environments
    pub environment_object_pairs: u32,
    /// Bodies removed at a handler's request
    pub bodies_destroyed: u32,
}

impl CollisionStats {
    /// Zero every counter
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Contacts of any kind resolved this frame
    pub const fn total_collisions(&self) -> u32 {
        self.narrowphase_collisions + self.ccd_collisions + self.terrain_collisions
    }
}

impl fmt::Display for CollisionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pairs {} broad {} narrow {} ccd {}/{} env objects {} terrain {}/{} env pairs {} destroyed {}",
            self.space_pairs_considered,
            self.broadphase_passes,
            self.narrowphase_collisions,
            self.ccd_collisions,
            self.ccd_checks,
            self.environment_objects_tested,
            self.terrain_collisions,
            self.terrain_checks,
            self.environment_object_pairs,
            self.bodies_destroyed,
        )
    }
}
