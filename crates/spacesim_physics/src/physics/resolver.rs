//! Impulse-based collision response
//!
//! Resolves a detected contact between two bodies with a normal impulse
//! scaled by the restitution coefficient, followed by a friction impulse
//! along the remaining tangential relative velocity. Both impulses act at
//! the contact points, so off-centre hits also change angular velocity.

use log::trace;

use crate::config::CollisionConfig;
use crate::foundation::math::{constants::EPSILON, utils, Vec3};

use super::body::RigidBody;
use super::collision::ObbData;

/// Geometry of a contact as found by the detector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactPair {
    /// Colliding leaf box of the first body, if it was tested with its hierarchy
    pub collider0: Option<ObbData>,
    /// Colliding leaf box of the second body
    pub collider1: Option<ObbData>,
    /// Position of the first body at the moment of contact, if not its current one
    pub centre0: Option<Vec3>,
    /// Position of the second body at the moment of contact
    pub centre1: Option<Vec3>,
}

/// Effect of a resolution on one body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactData {
    /// Velocity before the impact
    pub pre_impact_velocity: Vec3,
    /// Change in velocity
    pub velocity_change: Vec3,
    /// Magnitude of the change
    pub velocity_change_magnitude: f32,
    /// `|Δv| · mass`
    pub impact_force: f32,
}

impl ImpactData {
    fn measure(body: &RigidBody, before: Vec3) -> Self {
        let velocity_change = body.velocity - before;
        let velocity_change_magnitude = velocity_change.norm();
        Self {
            pre_impact_velocity: before,
            velocity_change,
            velocity_change_magnitude,
            impact_force: velocity_change_magnitude * body.mass(),
        }
    }
}

/// Outcome of resolving a contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Contact normal, pointing from the second body towards the first
    pub normal: Vec3,
    /// Contact point on the first body
    pub contact0: Vec3,
    /// Contact point on the second body
    pub contact1: Vec3,
    /// Relative normal velocity before resolution
    pub normal_velocity: f32,
    /// Scalar normal impulse
    pub normal_impulse: f32,
    /// Scalar friction impulse
    pub tangent_impulse: f32,
    /// Effect on the first body
    pub impact0: ImpactData,
    /// Effect on the second body
    pub impact1: ImpactData,
}

impl Resolution {
    /// Sum of the impact force over both bodies
    pub fn total_impact_force(&self) -> f32 {
        self.impact0.impact_force + self.impact1.impact_force
    }
}

/// Applies collision impulses to body pairs
#[derive(Debug, Clone)]
pub struct CollisionResolver {
    restitution: f32,
    static_friction: f32,
    dynamic_friction: f32,
    max_linear_speed: f32,
    max_angular_speed: f32,
}

impl CollisionResolver {
    /// Create a resolver from the collision settings
    pub fn new(config: &CollisionConfig) -> Self {
        Self {
            restitution: config.restitution,
            static_friction: config.static_friction,
            dynamic_friction: config.dynamic_friction,
            max_linear_speed: config.max_linear_speed,
            max_angular_speed: config.max_angular_speed,
        }
    }

    /// Coefficient of restitution
    pub const fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Resolve a contact between two bodies
    ///
    /// Returns `None` without touching either body when they are already
    /// separating, unless `allow_diverging` is set (sequential swept
    /// contacts within one frame), or when neither body can move.
    pub fn resolve(
        &self,
        body0: &mut RigidBody,
        body1: &mut RigidBody,
        contact: &ContactPair,
        allow_diverging: bool,
    ) -> Option<Resolution> {
        let inv_mass_sum = body0.inverse_mass() + body1.inverse_mass();
        if inv_mass_sum <= 0.0 {
            return None;
        }

        let com0 = contact.centre0.unwrap_or_else(|| body0.position());
        let com1 = contact.centre1.unwrap_or_else(|| body1.position());
        let c0 = match (contact.centre0, contact.collider0) {
            (None, Some(c)) => c.centre,
            _ => com0,
        };
        let c1 = match (contact.centre1, contact.collider1) {
            (None, Some(c)) => c.centre,
            _ => com1,
        };

        let mut normal = Self::contact_normal(&c0, &c1, body0, body1);

        // Bodies that passed through each other last step are pushed back the way they came
        if !allow_diverging {
            let past = body0.previous_position() - body1.previous_position();
            let now = com0 - com1;
            if past.dot(&now) < 0.0 {
                normal = -normal;
            }
        }

        // Approximate contact points: each box's closest point to the other side's
        // leaf centre, not a clipped contact manifold
        let contact0 = contact.collider0.map_or_else(
            || c0 - normal * body0.collision_radius(),
            |c| c.closest_point(&c1),
        );
        let contact1 = contact.collider1.map_or_else(
            || c1 + normal * body1.collision_radius(),
            |c| c.closest_point(&c0),
        );
        let r0 = contact0 - com0;
        let r1 = contact1 - com1;

        let relative = body0.point_velocity(&r0) - body1.point_velocity(&r1);
        let normal_velocity = relative.dot(&normal);
        if normal_velocity >= 0.0 && !allow_diverging {
            return None;
        }

        let pre0 = body0.velocity;
        let pre1 = body1.velocity;
        let inv_i0 = body0.world_inverse_inertia();
        let inv_i1 = body1.world_inverse_inertia();
        let effective = |dir: &Vec3| {
            inv_mass_sum
                + dir.dot(&(inv_i0 * r0.cross(dir)).cross(&r0))
                + dir.dot(&(inv_i1 * r1.cross(dir)).cross(&r1))
        };

        // Normal impulse; never pulls the bodies together
        let normal_denominator = effective(&normal);
        let normal_impulse = if normal_denominator > EPSILON {
            (-(1.0 + self.restitution) * normal_velocity / normal_denominator).max(0.0)
        } else {
            0.0
        };
        let jn = normal * normal_impulse;
        body0.apply_impulse(&jn, &r0);
        body1.apply_impulse(&-jn, &r1);

        // Friction against what remains of the tangential relative velocity
        let relative = body0.point_velocity(&r0) - body1.point_velocity(&r1);
        let mut tangent = relative - normal * relative.dot(&normal);
        if !utils::is_finite(&tangent) {
            tangent = Vec3::from(crate::foundation::math::constants::DEFAULT_AXIS);
        }
        let tangent_speed = tangent.norm();
        let mut tangent_impulse = 0.0;
        if tangent_speed > EPSILON {
            let direction = -tangent / tangent_speed;
            let tangent_denominator = effective(&direction);
            if tangent_denominator > EPSILON {
                let direct = tangent_speed / tangent_denominator;
                tangent_impulse = if direct < normal_impulse * self.static_friction {
                    direct
                } else {
                    normal_impulse * self.dynamic_friction
                };
                let jt = direction * tangent_impulse;
                body0.apply_impulse(&jt, &r0);
                body1.apply_impulse(&-jt, &r1);
            }
        }

        self.clamp_speeds(body0);
        self.clamp_speeds(body1);

        let resolution = Resolution {
            normal,
            contact0,
            contact1,
            normal_velocity,
            normal_impulse,
            tangent_impulse,
            impact0: ImpactData::measure(body0, pre0),
            impact1: ImpactData::measure(body1, pre1),
        };
        trace!(
            "CollisionResolver: vn {normal_velocity:.3} jn {normal_impulse:.3} jt {tangent_impulse:.3} force {:.3}",
            resolution.total_impact_force()
        );
        Some(resolution)
    }

    fn contact_normal(c0: &Vec3, c1: &Vec3, body0: &RigidBody, body1: &RigidBody) -> Vec3 {
        let separation = c0 - c1;
        if separation.norm_squared() > EPSILON * EPSILON {
            return separation.normalize();
        }
        // Coincident centres: oppose the relative velocity, or fall back to a fixed axis
        utils::normalize_or_default(&(body1.velocity - body0.velocity))
    }

    fn clamp_speeds(&self, body: &mut RigidBody) {
        body.velocity = utils::clamp_length(&body.velocity, self.max_linear_speed);
        body.angular_velocity = utils::clamp_length(&body.angular_velocity, self.max_angular_speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collision::OrientedBoundingBox;
    use approx::assert_relative_eq;

    fn resolver() -> CollisionResolver {
        CollisionResolver::new(&CollisionConfig::default())
    }

    fn sphere(position: Vec3, velocity: Vec3) -> RigidBody {
        RigidBody::new(position).with_sphere(1.0).with_velocity(velocity)
    }

    #[test]
    fn test_head_on_equal_masses_respects_restitution() {
        let mut a = sphere(Vec3::new(-0.9, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let mut b = sphere(Vec3::new(0.9, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let r = resolver();

        let res = r.resolve(&mut a, &mut b, &ContactPair::default(), false).unwrap();
        let pre = res.normal_velocity.abs();
        let post = (a.velocity - b.velocity).dot(&res.normal).abs();
        assert!(post <= r.restitution() * pre + 1e-5);
        assert_relative_eq!(post, 0.9 * 2.0, epsilon = 1e-5);
        assert_relative_eq!(a.velocity, Vec3::new(-0.9, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(b.velocity, Vec3::new(0.9, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(a.angular_velocity, Vec3::zeros(), epsilon = 1e-6);
        assert_relative_eq!(res.tangent_impulse, 0.0);
    }

    #[test]
    fn test_separating_bodies_are_not_resolved() {
        let mut a = sphere(Vec3::new(-0.9, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let mut b = sphere(Vec3::new(0.9, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(resolver().resolve(&mut a, &mut b, &ContactPair::default(), false).is_none());
        assert_relative_eq!(a.velocity, Vec3::new(-1.0, 0.0, 0.0));

        let forced = resolver().resolve(&mut a, &mut b, &ContactPair::default(), true).unwrap();
        assert_relative_eq!(forced.normal_impulse, 0.0);
    }

    #[test]
    fn test_bounce_off_static_box() {
        let mut ball = sphere(Vec3::new(1.5, 0.0, 0.0), Vec3::new(-5.0, 0.0, 0.0));
        let mut wall = RigidBody::new(Vec3::zeros())
            .with_collider(OrientedBoundingBox::new(Vec3::repeat(1.0)))
            .as_static();
        let collider = *wall.refreshed_collider().unwrap().data();
        let contact = ContactPair {
            collider1: Some(collider),
            ..ContactPair::default()
        };

        let res = resolver().resolve(&mut ball, &mut wall, &contact, false).unwrap();
        assert_relative_eq!(ball.velocity, Vec3::new(4.5, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(wall.velocity, Vec3::zeros());
        assert_relative_eq!(res.contact1, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(res.impact0.impact_force, 9.5, epsilon = 1e-4);
        assert_relative_eq!(res.impact1.impact_force, 0.0);
    }

    #[test]
    fn test_friction_reduces_sliding_and_spins() {
        let mut ball = sphere(Vec3::new(0.0, 1.9, 0.0), Vec3::new(3.0, -2.0, 0.0));
        let mut floor = RigidBody::new(Vec3::zeros())
            .with_collider(OrientedBoundingBox::new(Vec3::new(10.0, 1.0, 10.0)))
            .as_static();
        let collider = *floor.refreshed_collider().unwrap().data();
        let contact = ContactPair {
            collider1: Some(collider),
            ..ContactPair::default()
        };

        let res = resolver().resolve(&mut ball, &mut floor, &contact, false).unwrap();
        assert_relative_eq!(res.normal, Vec3::y());
        assert!(res.tangent_impulse > 0.0);
        assert!(ball.velocity.x < 3.0);
        assert!(ball.velocity.y > 0.0);
        // Friction at the bottom of the ball rolls it forward about -z
        assert!(ball.angular_velocity.z < 0.0);
        assert!(res.tangent_impulse <= res.normal_impulse * 0.7 + 1e-5);
    }

    #[test]
    fn test_coincident_centres_stay_finite() {
        let mut a = sphere(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        let mut b = sphere(Vec3::zeros(), Vec3::zeros());
        let res = resolver().resolve(&mut a, &mut b, &ContactPair::default(), false).unwrap();
        assert!(utils::is_finite(&res.normal));
        assert!(utils::is_finite(&a.velocity));
        assert!(utils::is_finite(&b.velocity));
        assert_relative_eq!(res.normal.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_two_static_bodies_are_ignored() {
        let mut a = RigidBody::new(Vec3::zeros()).as_static();
        let mut b = RigidBody::new(Vec3::new(1.0, 0.0, 0.0)).as_static();
        assert!(resolver().resolve(&mut a, &mut b, &ContactPair::default(), true).is_none());
    }
}
