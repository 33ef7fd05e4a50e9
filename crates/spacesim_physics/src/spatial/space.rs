//! Coordinate spaces a spatial tree can partition
//!
//! The same tree type indexes free-flying bodies in open space and objects
//! inside an environment's element grid. The space decides where a node is
//! split, so element-space nodes always fall on element boundaries.

use std::fmt;

use crate::foundation::math::Vec3;

/// Splitting policy for one coordinate space
pub trait CoordinateSpace: Clone + fmt::Debug {
    /// Label used in log output
    const NAME: &'static str;

    /// Coordinate at which an axis spanning `[min, min + size]` is split, or
    /// `None` if the axis is already at the minimum node size
    fn split_point(&self, min: f32, size: f32, min_node_size: f32) -> Option<f32>;

    /// True if at least one axis of a node with edge lengths `size` can be split
    fn can_subdivide(&self, min: &Vec3, size: &Vec3, min_node_size: f32) -> bool {
        (0..3).any(|axis| self.split_point(min[axis], size[axis], min_node_size).is_some())
    }
}

/// Continuous space; nodes are halved until they reach the minimum size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeSpace;

impl CoordinateSpace for FreeSpace {
    const NAME: &'static str = "Space";

    fn split_point(&self, min: f32, size: f32, min_node_size: f32) -> Option<f32> {
        let half = size * 0.5;
        (half >= min_node_size).then_some(min + half)
    }
}

/// Discrete element grid; nodes cover whole elements
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementSpace {
    /// Edge length of one element
    pub element_size: f32,
}

impl ElementSpace {
    /// Create an element space with the given element edge length
    pub const fn new(element_size: f32) -> Self {
        Self { element_size }
    }

    /// Number of whole elements spanned by a length
    pub fn elements_in(&self, length: f32) -> u32 {
        // Lengths are element multiples; rounding absorbs float drift
        (length / self.element_size).round().max(0.0) as u32
    }

    /// Element index containing a local position (may be out of the grid)
    pub fn element_of(&self, position: &Vec3) -> [i32; 3] {
        let scaled = position / self.element_size;
        [scaled.x.floor() as i32, scaled.y.floor() as i32, scaled.z.floor() as i32]
    }

    /// Minimum corner of an element
    pub fn element_min(&self, element: [i32; 3]) -> Vec3 {
        Vec3::new(element[0] as f32, element[1] as f32, element[2] as f32) * self.element_size
    }

    /// Element a node of `n` elements splits at, counted from its first element
    pub const fn centre_element(n: u32) -> u32 {
        if n & 1 == 1 {
            n / 2 + 1
        } else {
            n / 2
        }
    }
}

impl CoordinateSpace for ElementSpace {
    const NAME: &'static str = "Element";

    fn split_point(&self, min: f32, size: f32, min_node_size: f32) -> Option<f32> {
        let n = self.elements_in(size);
        let min_elements = self.elements_in(min_node_size).max(1);
        if n <= min_elements {
            return None;
        }
        let centre = Self::centre_element(n).max(min_elements).min(n - 1);
        Some(min + centre as f32 * self.element_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_free_space_halves_until_minimum() {
        let space = FreeSpace;
        assert_relative_eq!(space.split_point(-8.0, 16.0, 1.0).unwrap(), 0.0);
        assert_relative_eq!(space.split_point(0.0, 2.0, 1.0).unwrap(), 1.0);
        assert!(space.split_point(0.0, 1.5, 1.0).is_none());
    }

    #[test]
    fn test_centre_element_rule() {
        assert_eq!(ElementSpace::centre_element(5), 3);
        assert_eq!(ElementSpace::centre_element(4), 2);
        assert_eq!(ElementSpace::centre_element(1), 1);
    }

    #[test]
    fn test_element_split_aligns_to_elements() {
        let space = ElementSpace::new(10.0);
        assert_relative_eq!(space.split_point(0.0, 50.0, 10.0).unwrap(), 30.0);
        assert_relative_eq!(space.split_point(20.0, 40.0, 10.0).unwrap(), 40.0);
        assert!(space.split_point(0.0, 10.0, 10.0).is_none());
        // Two elements split evenly
        assert_relative_eq!(space.split_point(0.0, 20.0, 10.0).unwrap(), 10.0);
    }

    #[test]
    fn test_element_lookup() {
        let space = ElementSpace::new(10.0);
        assert_eq!(space.element_of(&Vec3::new(15.0, 0.0, -0.5)), [1, 0, -1]);
        assert_relative_eq!(space.element_min([2, 1, 0]), Vec3::new(20.0, 10.0, 0.0));
    }

    #[test]
    fn test_can_subdivide_any_axis() {
        let space = ElementSpace::new(10.0);
        let min = Vec3::zeros();
        assert!(space.can_subdivide(&min, &Vec3::new(10.0, 10.0, 30.0), 10.0));
        assert!(!space.can_subdivide(&min, &Vec3::new(10.0, 10.0, 10.0), 10.0));
    }
}
