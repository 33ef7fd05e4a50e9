//! Narrowphase and continuous intersection tests
//!
//! Every test is a pure function returning a value type describing the
//! result. Nothing here keeps state between calls, so separate callers (or
//! worker threads) never share scratch data.

use crate::foundation::math::{constants::EPSILON, Vec3};

use super::obb::{ObbData, OrientedBoundingBox};
use super::primitives::{BoundingSphere, Ray};

/// Which candidate axis produced the minimum SAT penetration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatAxis {
    /// Face normal `i` of the first box
    Face0(usize),
    /// Face normal `j` of the second box
    Face1(usize),
    /// Cross product of edge `i` of the first box and edge `j` of the second
    Edge(usize, usize),
}

/// Outcome of a separating-axis test between two boxes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatResult {
    /// Smallest overlap found over the tested axes
    pub penetration: f32,
    /// Axis that produced `penetration`
    pub axis: SatAxis,
    /// Centre offset (second minus first) projected onto the first box's axes
    pub axis_dist0: [f32; 3],
    /// Centre offset projected onto the second box's axes
    pub axis_dist1: [f32; 3],
    /// Unit axis of minimum penetration, pointing from the first box to the second
    pub normal: Vec3,
}

/// Separating-axis test between two oriented boxes
///
/// Tests the three face normals of each box and, unless any pair of axes is
/// parallel within `parallel_epsilon`, the nine edge cross products. Returns
/// `None` as soon as any axis separates the boxes.
pub fn sat_obb_vs_obb(b0: &ObbData, b1: &ObbData, parallel_epsilon: f32) -> Option<SatResult> {
    let cutoff = 1.0 - parallel_epsilon;
    let d = b1.centre - b0.centre;
    let e0 = b0.extents;
    let e1 = b1.extents;

    let mut dot01 = [[0.0_f32; 3]; 3];
    let mut abs01 = [[0.0_f32; 3]; 3];
    let mut parallel = false;
    let mut axis_dist0 = [0.0_f32; 3];
    let mut axis_dist1 = [0.0_f32; 3];

    let mut best = f32::MAX;
    let mut best_axis = SatAxis::Face0(0);
    let mut track = |penetration: f32, axis: SatAxis| {
        if penetration > EPSILON && penetration < best {
            best = penetration;
            best_axis = axis;
        }
    };

    // Face normals of box 0
    for i in 0..3 {
        for j in 0..3 {
            dot01[i][j] = b0.axes[i].dot(&b1.axes[j]);
            abs01[i][j] = dot01[i][j].abs();
            if abs01[i][j] > cutoff {
                parallel = true;
            }
        }
        axis_dist0[i] = d.dot(&b0.axes[i]);
        let r = axis_dist0[i].abs();
        let r01 = e0[i] + e1[0] * abs01[i][0] + e1[1] * abs01[i][1] + e1[2] * abs01[i][2];
        let penetration = r01 - r;
        if penetration < 0.0 {
            return None;
        }
        track(penetration, SatAxis::Face0(i));
    }

    // Face normals of box 1
    for j in 0..3 {
        axis_dist1[j] = d.dot(&b1.axes[j]);
        let r = axis_dist1[j].abs();
        let r01 = e0[0] * abs01[0][j] + e0[1] * abs01[1][j] + e0[2] * abs01[2][j] + e1[j];
        let penetration = r01 - r;
        if penetration < 0.0 {
            return None;
        }
        track(penetration, SatAxis::Face1(j));
    }

    // Edge cross products; skipped for near-parallel boxes where they degenerate
    if !parallel {
        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let r = (axis_dist0[i2] * dot01[i1][j] - axis_dist0[i1] * dot01[i2][j]).abs();
                let r0 = e0[i1] * abs01[i2][j] + e0[i2] * abs01[i1][j];
                let r1 = e1[j1] * abs01[i][j2] + e1[j2] * abs01[i][j1];
                let penetration = r0 + r1 - r;
                if penetration < 0.0 {
                    return None;
                }
                // Scale to a true distance along the unit axis
                let axis_len = (1.0 - dot01[i][j] * dot01[i][j]).max(0.0).sqrt();
                if axis_len > EPSILON {
                    track(penetration / axis_len, SatAxis::Edge(i, j));
                }
            }
        }
    }

    // All overlaps were at or below tolerance, e.g. boxes exactly touching
    if best == f32::MAX {
        best = 0.0;
    }

    let raw_normal = match best_axis {
        SatAxis::Face0(i) => b0.axes[i],
        SatAxis::Face1(j) => b1.axes[j],
        SatAxis::Edge(i, j) => b0.axes[i].cross(&b1.axes[j]),
    };
    let mut normal = raw_normal.try_normalize(EPSILON).unwrap_or(b0.axes[0]);
    if normal.dot(&d) < 0.0 {
        normal = -normal;
    }

    Some(SatResult {
        penetration: best,
        axis: best_axis,
        axis_dist0,
        axis_dist1,
        normal,
    })
}

/// `r² − |closest − c|²` for a sphere against a box; positive when they overlap
pub fn sphere_vs_obb_penetration(centre: &Vec3, radius: f32, obb: &ObbData) -> f32 {
    let closest = obb.closest_point(centre);
    radius * radius - (closest - centre).norm_squared()
}

/// True if the sphere overlaps the box
pub fn sphere_vs_obb(centre: &Vec3, radius: f32, obb: &ObbData) -> bool {
    sphere_vs_obb_penetration(centre, radius, obb) > 0.0
}

/// Sphere against an OBB hierarchy; returns the first colliding leaf
pub fn sphere_vs_obb_hierarchy(
    centre: &Vec3,
    radius: f32,
    obb: &OrientedBoundingBox,
) -> Option<ObbData> {
    if !sphere_vs_obb(centre, radius, obb.data()) {
        return None;
    }
    if obb.is_leaf() {
        return Some(*obb.data());
    }
    obb.children()
        .iter()
        .find_map(|child| sphere_vs_obb_hierarchy(centre, radius, child))
}

/// Leaf pair found by a hierarchy-vs-hierarchy test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HierarchyContact {
    /// Colliding leaf of the first hierarchy
    pub leaf0: ObbData,
    /// Colliding leaf of the second hierarchy
    pub leaf1: ObbData,
    /// SAT result for the leaf pair
    pub sat: SatResult,
}

/// Recursive SAT between two OBB hierarchies
///
/// Descends the first hierarchy while it has children, then the second,
/// until two leaves collide.
pub fn obb_hierarchy_vs_hierarchy(
    obb0: &OrientedBoundingBox,
    obb1: &OrientedBoundingBox,
    parallel_epsilon: f32,
) -> Option<HierarchyContact> {
    let sat = sat_obb_vs_obb(obb0.data(), obb1.data(), parallel_epsilon)?;

    match (obb0.is_leaf(), obb1.is_leaf()) {
        (true, true) => Some(HierarchyContact {
            leaf0: *obb0.data(),
            leaf1: *obb1.data(),
            sat,
        }),
        (false, _) => obb0
            .children()
            .iter()
            .find_map(|child| obb_hierarchy_vs_hierarchy(child, obb1, parallel_epsilon)),
        (true, false) => obb1
            .children()
            .iter()
            .find_map(|child| obb_hierarchy_vs_hierarchy(obb0, child, parallel_epsilon)),
    }
}

/// Result of a continuous (swept) test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousContact {
    /// Fraction of the step at which contact begins, in `[0, 1]`
    pub time: f32,
    /// Centre of the moving sphere at the time of contact
    pub position: Vec3,
    /// Contact point
    pub contact_point: Vec3,
}

/// Swept sphere against a stationary OBB
///
/// The sphere starts the step at `start` and moves by `displacement`. The
/// path is expressed in the box frame and tested as a point against the box
/// grown by the sphere radius.
pub fn continuous_sphere_vs_obb(
    start: &Vec3,
    displacement: &Vec3,
    radius: f32,
    obb: &ObbData,
) -> Option<ContinuousContact> {
    let ray = Ray::new(*start, *displacement).to_local_frame(&obb.centre, &obb.axes);
    let expanded = obb.local_aabb().expanded(radius);
    let hit = expanded.intersect_ray(&ray, 1.0)?;

    // A sphere already overlapping at the start of the step reports t = 0
    let time = hit.tmin.clamp(0.0, 1.0);
    let position = start + displacement * time;
    Some(ContinuousContact {
        time,
        position,
        contact_point: position,
    })
}

/// Two spheres both moving linearly over the step
///
/// Solves `|s + v t| = r0 + r1` for the earliest `t` in `[0, 1]`, where `s`
/// and `v` are the relative start offset and displacement.
pub fn continuous_sphere_vs_sphere(
    start0: &Vec3,
    displacement0: &Vec3,
    radius0: f32,
    start1: &Vec3,
    displacement1: &Vec3,
    radius1: f32,
) -> Option<ContinuousContact> {
    let s = start0 - start1;
    let v = displacement0 - displacement1;
    let r = radius0 + radius1;

    let c = s.norm_squared() - r * r;
    let time = if c < 0.0 {
        0.0
    } else {
        let b = v.dot(&s);
        if b >= 0.0 {
            return None;
        }
        let a = v.norm_squared();
        let d = b * b - a * c;
        if d < 0.0 {
            return None;
        }
        let t = (-b - d.sqrt()) / a;
        if t > 1.0 {
            return None;
        }
        t
    };

    let position0 = start0 + displacement0 * time;
    let position1 = start1 + displacement1 * time;
    let normal = (position1 - position0).try_normalize(EPSILON).unwrap_or_else(Vec3::x);
    Some(ContinuousContact {
        time,
        position: position0,
        contact_point: position0 + normal * radius0,
    })
}

/// Nearest ray parameter at which the ray enters an OBB hierarchy's leaves
pub fn ray_vs_obb_hierarchy(ray: &Ray, obb: &OrientedBoundingBox, t_limit: f32) -> Option<f32> {
    let hit = obb.data().intersect_ray(ray, t_limit)?;
    if obb.is_leaf() {
        return Some(hit.tmin.max(0.0));
    }
    obb.children()
        .iter()
        .filter_map(|child| ray_vs_obb_hierarchy(ray, child, t_limit))
        .min_by(f32::total_cmp)
}

/// Broadphase sphere test returning the cached squared penetration
pub fn broadphase(a: &BoundingSphere, b: &BoundingSphere) -> Option<f32> {
    let penetration_sq = a.penetration_sq(b);
    (penetration_sq > 0.0).then_some(penetration_sq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Transform};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const PARALLEL_EPS: f32 = 0.001;

    fn unit_cube(centre: Vec3) -> ObbData {
        ObbData::axis_aligned(centre, Vec3::new(1.0, 1.0, 1.0))
    }

    fn rotated_cube(centre: Vec3, axis: &nalgebra::Unit<Vector3<f32>>, angle: f32) -> ObbData {
        ObbData::from_transform(
            &Transform::from_position_rotation(centre, Quat::from_axis_angle(axis, angle)),
            Vec3::new(1.0, 1.0, 1.0),
        )
    }

    #[test]
    fn test_sat_identical_cubes_intersect() {
        let result = sat_obb_vs_obb(&unit_cube(Vec3::zeros()), &unit_cube(Vec3::zeros()), PARALLEL_EPS)
            .expect("coincident cubes must intersect");
        assert!(result.penetration > 0.0);
        assert_relative_eq!(result.penetration, 2.0);
    }

    #[test]
    fn test_sat_separated_cubes() {
        for axis in [Vec3::x(), Vec3::y(), Vec3::z()] {
            let b1 = unit_cube(axis * 2.1);
            assert!(sat_obb_vs_obb(&unit_cube(Vec3::zeros()), &b1, PARALLEL_EPS).is_none());
        }
    }

    #[test]
    fn test_sat_overlap_reports_min_axis() {
        let result = sat_obb_vs_obb(
            &unit_cube(Vec3::zeros()),
            &unit_cube(Vec3::new(1.5, 0.2, 0.0)),
            PARALLEL_EPS,
        )
        .unwrap();
        assert_eq!(result.axis, SatAxis::Face0(0));
        assert_relative_eq!(result.penetration, 0.5, epsilon = 1e-5);
        assert_relative_eq!(result.normal, Vec3::x(), epsilon = 1e-5);
        assert_relative_eq!(result.axis_dist0[0], 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_sat_rotated_boxes() {
        // Cubes rotated about different axes, separated along the first box's diagonal face
        let b0 = rotated_cube(Vec3::zeros(), &Vector3::z_axis(), std::f32::consts::FRAC_PI_4);
        let b1 = rotated_cube(Vec3::new(2.0, 2.0, 0.0), &Vector3::x_axis(), std::f32::consts::FRAC_PI_4);
        assert!(sat_obb_vs_obb(&b0, &b1, PARALLEL_EPS).is_none());

        let close = rotated_cube(Vec3::new(1.2, 1.2, 0.0), &Vector3::x_axis(), std::f32::consts::FRAC_PI_4);
        assert!(sat_obb_vs_obb(&b0, &close, PARALLEL_EPS).is_some());
    }

    #[test]
    fn test_sphere_vs_obb() {
        let obb = unit_cube(Vec3::zeros());
        assert!(sphere_vs_obb(&Vec3::new(1.5, 0.0, 0.0), 1.0, &obb));
        assert!(!sphere_vs_obb(&Vec3::new(1.5, 1.5, 1.5), 0.5, &obb));
        assert_relative_eq!(sphere_vs_obb_penetration(&Vec3::new(1.5, 0.0, 0.0), 1.0, &obb), 0.75);
    }

    fn dumbbell(position: Vec3) -> OrientedBoundingBox {
        let mut obb = OrientedBoundingBox::new(Vec3::new(5.0, 1.0, 1.0))
            .with_child(
                OrientedBoundingBox::new(Vec3::new(1.0, 1.0, 1.0))
                    .with_offset(Transform::from_position(Vec3::new(-4.0, 0.0, 0.0))),
            )
            .with_child(
                OrientedBoundingBox::new(Vec3::new(1.0, 1.0, 1.0))
                    .with_offset(Transform::from_position(Vec3::new(4.0, 0.0, 0.0))),
            );
        obb.update_from_transform(&Transform::from_position(position));
        obb
    }

    #[test]
    fn test_sphere_vs_hierarchy_first_leaf() {
        let obb = dumbbell(Vec3::zeros());
        // Inside the root but between the two leaves
        assert!(sphere_vs_obb_hierarchy(&Vec3::new(0.0, 0.0, 0.0), 0.5, &obb).is_none());

        let leaf = sphere_vs_obb_hierarchy(&Vec3::new(4.0, 1.2, 0.0), 0.5, &obb).unwrap();
        assert_relative_eq!(leaf.centre, Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_hierarchy_vs_hierarchy_descends_to_leaves() {
        let a = dumbbell(Vec3::zeros());
        let b = dumbbell(Vec3::new(0.0, 1.5, 0.0));
        let contact = obb_hierarchy_vs_hierarchy(&a, &b, PARALLEL_EPS).unwrap();
        assert_relative_eq!(contact.leaf0.centre.y, 0.0);
        assert_relative_eq!(contact.leaf1.centre.y, 1.5);
        assert_relative_eq!(contact.leaf0.centre.x, contact.leaf1.centre.x);

        // Roots overlap, leaves do not
        let offset = dumbbell(Vec3::new(0.0, 1.5, 0.0));
        let short = {
            let mut obb = OrientedBoundingBox::new(Vec3::new(5.0, 1.0, 1.0)).with_child(
                OrientedBoundingBox::new(Vec3::new(0.5, 1.0, 1.0)),
            );
            obb.update_from_transform(&Transform::identity());
            obb
        };
        assert!(obb_hierarchy_vs_hierarchy(&offset, &short, PARALLEL_EPS).is_none());
    }

    #[test]
    fn test_ccd_sphere_through_static_box() {
        let obb = unit_cube(Vec3::zeros());
        let contact = continuous_sphere_vs_obb(
            &Vec3::new(5.0, 0.0, 0.0),
            &Vec3::new(-5.0, 0.0, 0.0),
            1.0,
            &obb,
        )
        .unwrap();
        assert_relative_eq!(contact.time, 0.6, epsilon = 1e-5);
        assert_relative_eq!(contact.contact_point.x, 2.0, epsilon = 1e-5);
        assert!((0.0..=1.0).contains(&contact.time));
    }

    #[test]
    fn test_ccd_tunnelling_path_is_caught() {
        // Moves from one side to the other within a single step
        let obb = unit_cube(Vec3::zeros());
        let contact = continuous_sphere_vs_obb(
            &Vec3::new(-20.0, 0.5, 0.0),
            &Vec3::new(40.0, 0.0, 0.0),
            0.25,
            &obb,
        )
        .unwrap();
        let expanded = obb.local_aabb().expanded(0.25);
        assert_relative_eq!(contact.contact_point.x, expanded.min.x, epsilon = 1e-4);
    }

    #[test]
    fn test_ccd_rotated_box_misses() {
        let obb = rotated_cube(Vec3::zeros(), &Vector3::z_axis(), std::f32::consts::FRAC_PI_4);
        let miss = continuous_sphere_vs_obb(
            &Vec3::new(5.0, 2.0, 0.0),
            &Vec3::new(-10.0, 0.0, 0.0),
            0.1,
            &obb,
        );
        assert!(miss.is_none());
    }

    #[test]
    fn test_ccd_sphere_vs_sphere() {
        let contact = continuous_sphere_vs_sphere(
            &Vec3::new(-10.0, 0.0, 0.0),
            &Vec3::new(20.0, 0.0, 0.0),
            1.0,
            &Vec3::zeros(),
            &Vec3::zeros(),
            1.0,
        )
        .unwrap();
        assert_relative_eq!(contact.time, 0.4, epsilon = 1e-5);
        assert_relative_eq!(contact.position.x, -2.0, epsilon = 1e-4);
        assert_relative_eq!(contact.contact_point.x, -1.0, epsilon = 1e-4);

        let diverging = continuous_sphere_vs_sphere(
            &Vec3::new(-10.0, 0.0, 0.0),
            &Vec3::new(-20.0, 0.0, 0.0),
            1.0,
            &Vec3::zeros(),
            &Vec3::zeros(),
            1.0,
        );
        assert!(diverging.is_none());
    }

    #[test]
    fn test_ray_vs_hierarchy_hits_nearest_leaf() {
        let obb = dumbbell(Vec3::zeros());
        let ray = Ray::normalized(Vec3::new(20.0, 0.0, 0.0), -Vec3::x());
        let t = ray_vs_obb_hierarchy(&ray, &obb, f32::MAX).unwrap();
        assert_relative_eq!(t, 15.0, epsilon = 1e-4);

        let through_gap = Ray::normalized(Vec3::new(0.0, 20.0, 0.0), -Vec3::y());
        assert!(ray_vs_obb_hierarchy(&through_gap, &obb, f32::MAX).is_none());
    }
}
