//! Primitive bounding volumes and ray intersection algorithms
//!
//! Provides rays, bounding spheres and axis-aligned boxes. Rays are not
//! normalised on construction: a ray built from a step displacement reports
//! intersection times as fractions of that step.

use crate::foundation::math::{constants::EPSILON, Vec3};

/// A ray with cached reciprocal direction for slab tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// The origin point of the ray
    pub origin: Vec3,
    /// The direction (or displacement) of the ray
    pub direction: Vec3,
    /// Component-wise reciprocal of `direction`
    pub inv_direction: Vec3,
    /// Per-axis index of the slab bound hit first (1 where the direction is negative)
    pub sign: [usize; 3],
}

impl Ray {
    /// Creates a ray; `direction` is kept as given
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let inv_direction = direction.map(|c| 1.0 / c);
        let sign = [
            usize::from(inv_direction.x < 0.0),
            usize::from(inv_direction.y < 0.0),
            usize::from(inv_direction.z < 0.0),
        ];
        Self {
            origin,
            direction,
            inv_direction,
            sign,
        }
    }

    /// Creates a ray with a unit-length direction, so `t` is a distance
    pub fn normalized(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction.normalize())
    }

    /// Get a point along the ray at parameter t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Express this ray in the frame given by `centre` and orthonormal `axes`
    pub fn to_local_frame(&self, centre: &Vec3, axes: &[Vec3; 3]) -> Self {
        let rel = self.origin - centre;
        Self::new(
            Vec3::new(rel.dot(&axes[0]), rel.dot(&axes[1]), rel.dot(&axes[2])),
            Vec3::new(
                self.direction.dot(&axes[0]),
                self.direction.dot(&axes[1]),
                self.direction.dot(&axes[2]),
            ),
        )
    }
}

/// Entry and exit parameters of a ray crossing a volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersection {
    /// Parameter at which the ray enters the volume (negative if it starts inside)
    pub tmin: f32,
    /// Parameter at which the ray leaves the volume
    pub tmax: f32,
}

/// A bounding sphere for broadphase tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// The center position of the sphere
    pub center: Vec3,
    /// The radius of the sphere
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere with the given center and radius
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// `(r0 + r1)² − d²`; positive when the spheres overlap
    pub fn penetration_sq(&self, other: &Self) -> f32 {
        let radius_sum = self.radius + other.radius;
        radius_sum * radius_sum - (self.center - other.center).norm_squared()
    }

    /// Check if this sphere overlaps another
    pub fn intersects(&self, other: &Self) -> bool {
        self.penetration_sq(other) > 0.0
    }

    /// Nearest non-negative ray parameter at which the ray meets the sphere
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let oc = ray.origin - self.center;
        let a = ray.direction.norm_squared();
        if a < EPSILON {
            return None;
        }
        let b = oc.dot(&ray.direction);
        let c = oc.norm_squared() - self.radius * self.radius;

        // Origin inside the sphere
        if c <= 0.0 {
            return Some(0.0);
        }
        if b >= 0.0 {
            return None;
        }

        let discriminant = b * b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        Some((-b - discriminant.sqrt()) / a)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from two corners in any order
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    /// Create a box from its center and half-extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        let extents = extents.abs();
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Create a box from its minimum corner and edge lengths
    pub fn from_min_size(min: Vec3, size: Vec3) -> Self {
        Self::new(min, min + size)
    }

    /// Get the center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the edge lengths
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the half-extents
    pub fn extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Inclusive point containment
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// True if `other` lies entirely inside this box
    pub fn contains_aabb(&self, other: &Self) -> bool {
        (0..3).all(|i| other.min[i] >= self.min[i] && other.max[i] <= self.max[i])
    }

    /// Overlap test (touching counts)
    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }

    /// Box grown by `amount` on every side
    pub fn expanded(&self, amount: f32) -> Self {
        let grow = Vec3::repeat(amount);
        Self {
            min: self.min - grow,
            max: self.max + grow,
        }
    }

    /// Closest point inside the box to `point`
    pub fn closest_point(&self, point: &Vec3) -> Vec3 {
        point.sup(&self.min).inf(&self.max)
    }

    /// Squared distance from `point` to the box (zero inside)
    pub fn distance_sq_to_point(&self, point: &Vec3) -> f32 {
        (self.closest_point(point) - point).norm_squared()
    }

    /// True if the sphere overlaps the box
    pub fn intersects_sphere(&self, center: &Vec3, radius: f32) -> bool {
        self.distance_sq_to_point(center) <= radius * radius
    }

    /// Slab test of a ray against the box
    ///
    /// An intersection requires the exit to lie ahead of the origin, the entry
    /// to lie before `t_limit`, and a finite entry parameter. A ray starting
    /// inside the box reports `tmin < 0 <= tmax`.
    pub fn intersect_ray(&self, ray: &Ray, t_limit: f32) -> Option<RayIntersection> {
        let bounds = [self.min, self.max];
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in 0..3 {
            let near = (bounds[ray.sign[axis]][axis] - ray.origin[axis]) * ray.inv_direction[axis];
            let far =
                (bounds[1 - ray.sign[axis]][axis] - ray.origin[axis]) * ray.inv_direction[axis];
            // NaN arises when the origin sits exactly on a slab of a parallel axis
            if !near.is_nan() {
                tmin = tmin.max(near);
            }
            if !far.is_nan() {
                tmax = tmax.min(far);
            }
        }

        if tmax < 0.0 || tmin >= t_limit || tmax < tmin || tmin == f32::NEG_INFINITY {
            return None;
        }
        Some(RayIntersection { tmin, tmax })
    }
}
