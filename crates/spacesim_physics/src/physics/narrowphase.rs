//! Narrowphase dispatch
//!
//! Each side of a pair is either a bare bounding sphere or a sphere wrapping
//! an OBB hierarchy. The pair of geometry kinds indexes a table of test
//! functions, so adding a geometry kind means adding a row and a column.

use crate::foundation::math::Vec3;

use super::body::RigidBody;
use super::collision::{obb_hierarchy_vs_hierarchy, sphere_vs_obb_hierarchy, OrientedBoundingBox};
use super::resolver::ContactPair;

/// One side of a narrowphase test
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    /// Bounding sphere centre
    pub centre: Vec3,
    /// Bounding sphere radius
    pub radius: f32,
    /// OBB hierarchy, present only for full-geometry bodies
    pub collider: Option<&'a OrientedBoundingBox>,
}

impl<'a> Participant<'a> {
    /// Describe a body; its collider must already be refreshed
    pub fn of(body: &'a RigidBody) -> Self {
        Self {
            centre: body.position(),
            radius: body.collision_radius(),
            collider: body.uses_collider().then(|| body.collider()).flatten(),
        }
    }

    /// Row or column of the dispatch table
    pub const fn geometry(&self) -> usize {
        match self.collider {
            Some(_) => 1,
            None => 0,
        }
    }
}

type NarrowphaseTest = fn(&Participant<'_>, &Participant<'_>, f32) -> Option<ContactPair>;

const DISPATCH: [[NarrowphaseTest; 2]; 2] = [
    [sphere_vs_sphere, sphere_vs_hierarchy],
    [hierarchy_vs_sphere, hierarchy_vs_hierarchy],
];

/// Precise test for a pair that passed the broadphase
pub fn test_pair(a: &Participant<'_>, b: &Participant<'_>, parallel_epsilon: f32) -> Option<ContactPair> {
    DISPATCH[a.geometry()][b.geometry()](a, b, parallel_epsilon)
}

// Overlapping bounding spheres are the whole test
fn sphere_vs_sphere(_: &Participant<'_>, _: &Participant<'_>, _: f32) -> Option<ContactPair> {
    Some(ContactPair::default())
}

fn sphere_vs_hierarchy(a: &Participant<'_>, b: &Participant<'_>, _: f32) -> Option<ContactPair> {
    let leaf = sphere_vs_obb_hierarchy(&a.centre, a.radius, b.collider?)?;
    Some(ContactPair {
        collider1: Some(leaf),
        ..ContactPair::default()
    })
}

fn hierarchy_vs_sphere(a: &Participant<'_>, b: &Participant<'_>, _: f32) -> Option<ContactPair> {
    let leaf = sphere_vs_obb_hierarchy(&b.centre, b.radius, a.collider?)?;
    Some(ContactPair {
        collider0: Some(leaf),
        ..ContactPair::default()
    })
}

fn hierarchy_vs_hierarchy(a: &Participant<'_>, b: &Participant<'_>, parallel_epsilon: f32) -> Option<ContactPair> {
    let contact = obb_hierarchy_vs_hierarchy(a.collider?, b.collider?, parallel_epsilon)?;
    Some(ContactPair {
        collider0: Some(contact.leaf0),
        collider1: Some(contact.leaf1),
        ..ContactPair::default()
    })
}
