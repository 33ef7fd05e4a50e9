//! Oriented bounding boxes and compound OBB hierarchies
//!
//! An [`OrientedBoundingBox`] is owned by the body it bounds. Moving the body
//! only marks the box invalid; the world-space data is recomputed from the
//! body transform the next time a collision test asks for it.

use crate::foundation::math::{Transform, Vec3};

use super::primitives::{Aabb, Ray, RayIntersection};

/// World-space geometry of a single box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObbData {
    /// Box centre
    pub centre: Vec3,
    /// Orthonormal box axes
    pub axes: [Vec3; 3],
    /// Half-extents along each axis, never negative
    pub extents: Vec3,
}

impl Default for ObbData {
    fn default() -> Self {
        Self {
            centre: Vec3::zeros(),
            axes: [Vec3::x(), Vec3::y(), Vec3::z()],
            extents: Vec3::zeros(),
        }
    }
}

impl ObbData {
    /// Create box data; negative extents are taken by magnitude
    pub fn new(centre: Vec3, axes: [Vec3; 3], extents: Vec3) -> Self {
        Self {
            centre,
            axes,
            extents: extents.abs(),
        }
    }

    /// Axis-aligned box data
    pub fn axis_aligned(centre: Vec3, extents: Vec3) -> Self {
        Self::new(centre, [Vec3::x(), Vec3::y(), Vec3::z()], extents)
    }

    /// Box placed and oriented by `transform`
    pub fn from_transform(transform: &Transform, extents: Vec3) -> Self {
        let basis = transform.basis();
        Self::new(
            transform.position,
            [
                basis.column(0).into_owned(),
                basis.column(1).into_owned(),
                basis.column(2).into_owned(),
            ],
            extents,
        )
    }

    /// The box in its own frame: an AABB centred on the origin
    pub fn local_aabb(&self) -> Aabb {
        Aabb::from_center_extents(Vec3::zeros(), self.extents)
    }

    /// Half-length of the box's projection onto `direction`
    pub fn extent_along_axis(&self, direction: &Vec3) -> f32 {
        (0..3)
            .map(|i| self.extents[i] * self.axes[i].dot(direction).abs())
            .sum()
    }

    /// Radius of the sphere centred on the box that encloses it
    pub fn bounding_radius(&self) -> f32 {
        self.extents.norm()
    }

    /// Coordinates of `point` in the box frame
    pub fn to_local(&self, point: &Vec3) -> Vec3 {
        let rel = point - self.centre;
        Vec3::new(rel.dot(&self.axes[0]), rel.dot(&self.axes[1]), rel.dot(&self.axes[2]))
    }

    /// Closest point on or in the box to `point`
    pub fn closest_point(&self, point: &Vec3) -> Vec3 {
        let rel = point - self.centre;
        (0..3).fold(self.centre, |acc, i| {
            let e = self.extents[i];
            let d = rel.dot(&self.axes[i]).clamp(-e, e);
            acc + self.axes[i] * d
        })
    }

    /// Inclusive point containment
    pub fn contains_point(&self, point: &Vec3) -> bool {
        let local = self.to_local(point);
        (0..3).all(|i| local[i].abs() <= self.extents[i])
    }

    /// The eight corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::zeros(); 8];
        for (n, corner) in corners.iter_mut().enumerate() {
            *corner = (0..3).fold(self.centre, |acc, i| {
                let sign = if n & (1 << i) == 0 { -1.0 } else { 1.0 };
                acc + self.axes[i] * (self.extents[i] * sign)
            });
        }
        corners
    }

    /// World-space axis-aligned box enclosing this box
    pub fn enclosing_aabb(&self) -> Aabb {
        let half = Vec3::new(
            self.extent_along_axis(&Vec3::x()),
            self.extent_along_axis(&Vec3::y()),
            self.extent_along_axis(&Vec3::z()),
        );
        Aabb::from_center_extents(self.centre, half)
    }

    /// Ray test performed in the box frame
    pub fn intersect_ray(&self, ray: &Ray, t_limit: f32) -> Option<RayIntersection> {
        let local = ray.to_local_frame(&self.centre, &self.axes);
        self.local_aabb().intersect_ray(&local, t_limit)
    }
}

/// A node of a compound OBB hierarchy
///
/// Branch nodes bound their children and are tested first, so a miss against
/// a branch culls its whole subtree.
#[derive(Debug, Clone)]
pub struct OrientedBoundingBox {
    data: ObbData,
    local_extents: Vec3,
    offset: Option<Transform>,
    children: Vec<OrientedBoundingBox>,
    auto_fit: bool,
    invalidated: bool,
}

impl OrientedBoundingBox {
    /// Create a leaf box with the given half-extents, centred on its owner
    pub fn new(extents: Vec3) -> Self {
        Self {
            data: ObbData::default(),
            local_extents: extents.abs(),
            offset: None,
            children: Vec::new(),
            auto_fit: false,
            invalidated: true,
        }
    }

    /// Place this box relative to its parent frame
    pub fn with_offset(mut self, offset: Transform) -> Self {
        self.offset = Some(offset);
        self.invalidated = true;
        self
    }

    /// Attach a child box
    pub fn with_child(mut self, child: Self) -> Self {
        self.add_child(child);
        self
    }

    /// Size this box to enclose its children on every update
    pub fn with_auto_fit(mut self) -> Self {
        self.auto_fit = true;
        self.invalidated = true;
        self
    }

    /// Attach a child box
    pub fn add_child(&mut self, child: Self) {
        self.children.push(child);
        self.invalidated = true;
    }

    /// Detach all children
    pub fn clear_children(&mut self) {
        self.children.clear();
        self.invalidated = true;
    }

    /// Current world-space data; stale while [`Self::is_invalidated`] is true
    pub const fn data(&self) -> &ObbData {
        &self.data
    }

    /// Half-extents in the box's own frame
    pub const fn local_extents(&self) -> Vec3 {
        self.local_extents
    }

    /// Change the half-extents of this node
    pub fn set_local_extents(&mut self, extents: Vec3) {
        self.local_extents = extents.abs();
        self.invalidated = true;
    }

    /// Offset from the parent frame, if any
    pub const fn offset(&self) -> Option<&Transform> {
        self.offset.as_ref()
    }

    /// Child boxes
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// True if the box has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if the world-space data must be recomputed before use
    pub const fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Mark the world-space data stale
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Recompute world-space data for this node and all descendants
    pub fn update_from_transform(&mut self, owner: &Transform) {
        let frame = self
            .offset
            .as_ref()
            .map_or(*owner, |offset| owner.combine(offset));

        for child in &mut self.children {
            child.update_from_transform(&frame);
        }

        let mut data = ObbData::from_transform(&frame, self.local_extents);
        if self.auto_fit && !self.children.is_empty() {
            data.extents = Self::fit_extents(&data, &self.children);
        }
        self.data = data;
        self.invalidated = false;
    }

    /// Recompute only if invalidated; returns true if an update happened
    pub fn update_if_required(&mut self, owner: &Transform) -> bool {
        if self.invalidated {
            self.update_from_transform(owner);
            true
        } else {
            false
        }
    }

    /// Number of leaf boxes in the hierarchy
    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(Self::leaf_count).sum()
        }
    }

    /// Depth of the hierarchy; a single leaf has depth 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Self::depth).max().unwrap_or(0)
    }

    /// Visit every leaf box
    pub fn for_each_leaf<F: FnMut(&ObbData)>(&self, f: &mut F) {
        if self.is_leaf() {
            f(&self.data);
        } else {
            for child in &self.children {
                child.for_each_leaf(f);
            }
        }
    }

    fn fit_extents(frame: &ObbData, children: &[Self]) -> Vec3 {
        let mut extents = Vec3::zeros();
        for child in children {
            for corner in child.data.corners() {
                let local = frame.to_local(&corner);
                extents = extents.sup(&local.abs());
            }
        }
        extents
    }
}
