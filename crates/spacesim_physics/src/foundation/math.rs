//! Math utilities and types
//!
//! Provides the vector, matrix and rotation types shared by the bounding
//! volumes, the spatial index and the rigid-body solver.

pub use nalgebra::{Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Rigid transform: position and orientation, no scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in the owning coordinate space
    pub position: Vec3,

    /// Orientation quaternion
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub const fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Rotation as a 3x3 matrix whose columns are the local basis axes
    pub fn basis(&self) -> Mat3 {
        *self.rotation.to_rotation_matrix().matrix()
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    /// Apply the inverse of this transform to a point
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    /// Rotate a direction into this transform's parent space
    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// Rotate a direction from parent space into this transform's local space
    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.rotation.inverse() * vector
    }

    /// Combine this transform with a child transform expressed in its local space
    pub fn combine(&self, child: &Self) -> Self {
        Self {
            position: self.transform_point(&child.position),
            rotation: self.rotation * child.rotation,
        }
    }
}

/// Math constants
pub mod constants {
    /// Tolerance used by the geometric tests
    pub const EPSILON: f32 = 1e-6;

    /// Value used in place of a true infinity when seeding minimum searches
    pub const LARGE_FLOAT: f32 = 1e12;

    /// Fallback axis substituted for degenerate directions
    pub const DEFAULT_AXIS: [f32; 3] = [1.0, 0.0, 0.0];
}

/// Math utility functions
pub mod utils {
    use super::{constants, Vec3};

    /// Normalise `v`, substituting the fallback axis when it is degenerate or NaN
    pub fn normalize_or_default(v: &Vec3) -> Vec3 {
        let len = v.norm();
        if len.is_finite() && len > constants::EPSILON {
            v / len
        } else {
            Vec3::from(constants::DEFAULT_AXIS)
        }
    }

    /// True if every component is finite
    pub fn is_finite(v: &Vec3) -> bool {
        v.iter().all(|c| c.is_finite())
    }

    /// Component-wise floor towards a minimum magnitude, preserving sign
    pub fn floor_magnitude(v: &Vec3, minimum: f32) -> Vec3 {
        v.map(|c| if c.abs() < minimum { minimum.copysign(c) } else { c })
    }

    /// Clamp the length of `v` to `max_length`
    pub fn clamp_length(v: &Vec3, max_length: f32) -> Vec3 {
        let len_sq = v.norm_squared();
        if len_sq > max_length * max_length {
            v * (max_length / len_sq.sqrt())
        } else {
            *v
        }
    }
}
