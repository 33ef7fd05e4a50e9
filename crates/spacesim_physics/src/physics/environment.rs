//! Interior environments
//!
//! An environment is a grid of cubic elements placed somewhere in the world
//! (typically the interior of a ship). Objects and terrain inside it use
//! environment-local coordinates, with the grid spanning
//! `[0, dimensions · element_size]` on each axis and `+y` as up. A spatial
//! tree over [`ElementSpace`] indexes both, so every node covers whole
//! elements and the contents of an element are those of its owning leaf.

use log::{debug, warn};

use crate::config::{EnvironmentConfig, SpatialConfig};
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::collections::{BodyHandle, SlotMap, TerrainHandle};
use crate::foundation::math::{Transform, Vec3};
use crate::spatial::{ElementSpace, ItemKind, ItemKinds, QueryFilter, SpatialTree};

use super::collision::{ray_vs_obb_hierarchy, Aabb, BoundingSphere, OrientedBoundingBox, Ray};

/// Element grid coordinates
pub type Element = [i32; 3];

/// Item stored in an environment's element tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentItem {
    /// A body placed in the environment
    Object(BodyHandle),
    /// A terrain block
    Terrain(TerrainHandle),
}

/// Static geometry inside an environment
#[derive(Debug, Clone)]
pub struct Terrain {
    transform: Transform,
    collider: OrientedBoundingBox,
}

impl Terrain {
    /// Terrain with an arbitrary OBB hierarchy placed at `transform`
    pub fn new(transform: Transform, mut collider: OrientedBoundingBox) -> Self {
        collider.update_from_transform(&transform);
        Self { transform, collider }
    }

    /// Axis-aligned block centred on `position`
    pub fn cuboid(position: Vec3, extents: Vec3) -> Self {
        Self::new(Transform::from_position(position), OrientedBoundingBox::new(extents))
    }

    /// Placement in environment space
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Collision hierarchy in environment space
    pub const fn collider(&self) -> &OrientedBoundingBox {
        &self.collider
    }

    /// Sphere enclosing the root box
    pub fn bounding_sphere(&self) -> BoundingSphere {
        let data = self.collider.data();
        BoundingSphere::new(data.centre, data.bounding_radius())
    }

    /// Height of the top face along `up`
    pub fn top(&self, up: &Vec3) -> f32 {
        let data = self.collider.data();
        data.centre.dot(up) + data.extent_along_axis(up)
    }
}

/// Objects and terrain owning an element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementContents {
    /// Bodies
    pub objects: Vec<BodyHandle>,
    /// Terrain blocks
    pub terrain: Vec<TerrainHandle>,
}

/// An element grid with its own spatial tree
#[derive(Debug)]
pub struct Environment {
    transform: Transform,
    dimensions: [u32; 3],
    tree: SpatialTree<ElementSpace, EnvironmentItem>,
    terrain: SlotMap<TerrainHandle, Terrain>,
    objects: Vec<BodyHandle>,
}

impl Environment {
    /// Create an empty environment of `dimensions` elements placed at `transform`
    pub fn new(
        transform: Transform,
        dimensions: [u32; 3],
        config: &EnvironmentConfig,
        spatial: &SpatialConfig,
    ) -> PhysicsResult<Self> {
        if dimensions.iter().any(|&d| d == 0) {
            return Err(PhysicsError::InvalidParameter(format!(
                "environment dimensions must be non-zero, got {dimensions:?}"
            )));
        }
        let space = ElementSpace::new(config.element_size);
        let extent = Vec3::new(dimensions[0] as f32, dimensions[1] as f32, dimensions[2] as f32)
            * config.element_size;
        let tree_config = SpatialConfig {
            max_items_per_node: config.max_items_per_node,
            min_node_size: config.element_size,
            ..spatial.clone()
        };
        let tree = SpatialTree::new(space, Aabb::new(Vec3::zeros(), extent), tree_config)?;
        debug!("Environment: created {dimensions:?} elements of {}", config.element_size);
        Ok(Self {
            transform,
            dimensions,
            tree,
            terrain: SlotMap::with_key(),
            objects: Vec::new(),
        })
    }

    /// World placement
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Move the whole environment; local contents are unaffected
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Grid size in elements
    pub const fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    /// Edge length of one element
    pub const fn element_size(&self) -> f32 {
        self.tree.space().element_size
    }

    /// Local bounds of the grid
    pub fn bounds(&self) -> Aabb {
        self.tree.bounds()
    }

    /// Element tree
    pub const fn tree(&self) -> &SpatialTree<ElementSpace, EnvironmentItem> {
        &self.tree
    }

    /// World point to environment space
    pub fn to_local(&self, point: &Vec3) -> Vec3 {
        self.transform.inverse_transform_point(point)
    }

    /// Environment point to world space
    pub fn to_world(&self, point: &Vec3) -> Vec3 {
        self.transform.transform_point(point)
    }

    /// World ray to environment space, preserving the parameterisation
    pub fn ray_to_local(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.to_local(&ray.origin),
            self.transform.inverse_transform_vector(&ray.direction),
        )
    }

    /// Add a terrain block
    pub fn add_terrain(&mut self, terrain: Terrain) -> PhysicsResult<TerrainHandle> {
        let sphere = terrain.bounding_sphere();
        let handle = self.terrain.insert(terrain);
        if let Err(err) = self.tree.insert(
            EnvironmentItem::Terrain(handle),
            sphere.center,
            sphere.radius,
            ItemKind::Terrain,
        ) {
            warn!("Environment: terrain rejected: {err}");
            self.terrain.remove(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Remove a terrain block
    pub fn remove_terrain(&mut self, handle: TerrainHandle) -> Option<Terrain> {
        let terrain = self.terrain.remove(handle)?;
        self.tree.remove(&EnvironmentItem::Terrain(handle));
        Some(terrain)
    }

    /// Look up a terrain block
    pub fn terrain(&self, handle: TerrainHandle) -> Option<&Terrain> {
        self.terrain.get(handle)
    }

    /// All terrain blocks
    pub fn terrain_iter(&self) -> impl Iterator<Item = (TerrainHandle, &Terrain)> {
        self.terrain.iter()
    }

    /// Bodies placed in the environment
    pub fn objects(&self) -> &[BodyHandle] {
        &self.objects
    }

    /// True if the body is placed here
    pub fn contains_object(&self, handle: BodyHandle) -> bool {
        self.tree.contains(&EnvironmentItem::Object(handle))
    }

    pub(crate) fn insert_object(&mut self, handle: BodyHandle, position: Vec3, radius: f32) -> PhysicsResult<()> {
        self.tree
            .insert(EnvironmentItem::Object(handle), position, radius, ItemKind::Object)?;
        if !self.objects.contains(&handle) {
            self.objects.push(handle);
        }
        Ok(())
    }

    pub(crate) fn move_object(&mut self, handle: BodyHandle, position: Vec3, radius: f32) -> PhysicsResult<()> {
        self.tree
            .move_item(EnvironmentItem::Object(handle), position, radius)
            .map(|_| ())
    }

    pub(crate) fn remove_object(&mut self, handle: BodyHandle) -> bool {
        self.objects.retain(|h| *h != handle);
        self.tree.remove(&EnvironmentItem::Object(handle))
    }

    /// Collapse parts of the tree emptied by removals and moves
    pub fn prune(&mut self) {
        self.tree.pruning_check();
    }

    /// Element holding a local position, or `None` outside the grid
    pub fn element_at(&self, position: &Vec3) -> Option<Element> {
        let element = self.tree.space().element_of(position);
        self.in_grid(element).then_some(element)
    }

    /// Local bounds of an element, or `None` outside the grid
    pub fn element_bounds(&self, element: Element) -> Option<Aabb> {
        if !self.in_grid(element) {
            return None;
        }
        let space = self.tree.space();
        Some(Aabb::from_min_size(
            space.element_min(element),
            Vec3::repeat(space.element_size),
        ))
    }

    /// Objects and terrain stored in the leaf owning an element
    pub fn element_contents(&self, element: Element) -> Option<ElementContents> {
        let centre = self.element_bounds(element)?.center();
        let node = self.tree.node(self.tree.node_containing(&centre)?)?;
        let mut contents = ElementContents::default();
        for stored in node.items(ItemKind::Object).iter().chain(node.items(ItemKind::Terrain)) {
            match stored.item {
                EnvironmentItem::Object(h) => contents.objects.push(h),
                EnvironmentItem::Terrain(h) => contents.terrain.push(h),
            }
        }
        Some(contents)
    }

    /// Element nearest a local position, clamped onto the grid
    pub fn nearest_element(&self, position: &Vec3) -> Element {
        self.clamp_element(self.tree.space().element_of(position))
    }

    /// Inclusive element range touched by a sphere, clamped onto the grid
    pub fn element_range(&self, position: &Vec3, radius: f32) -> (Element, Element) {
        let space = self.tree.space();
        let reach = Vec3::repeat(radius);
        let low = self.clamp_element(space.element_of(&(position - reach)));
        let high = self.clamp_element(space.element_of(&(position + reach)));
        (low, high)
    }

    /// Items overlapping the elements touched by a sphere
    pub fn items_near(&self, position: &Vec3, radius: f32, kinds: ItemKinds, out: &mut Vec<EnvironmentItem>) {
        let (low, high) = self.element_range(position, radius);
        let space = self.tree.space();
        let area = Aabb::new(
            space.element_min(low),
            space.element_min([high[0] + 1, high[1] + 1, high[2] + 1]),
        );
        self.tree.query_aabb_into(&area, kinds, out);
    }

    /// Objects within `radius` of a local position
    pub fn objects_within(&self, position: &Vec3, radius: f32, out: &mut Vec<BodyHandle>) {
        let mut items = Vec::new();
        self.tree
            .range_query_into(position, radius, QueryFilter::overlapping_objects(), &mut items);
        out.extend(items.into_iter().filter_map(|item| match item {
            EnvironmentItem::Object(h) => Some(h),
            EnvironmentItem::Terrain(_) => None,
        }));
    }

    /// Nearest terrain hit by a local ray within `max_distance`
    ///
    /// The ray direction is normalised first, so the returned value is a
    /// distance in environment units.
    pub fn ray_vs_terrain(&self, ray: &Ray, max_distance: f32) -> Option<(TerrainHandle, f32)> {
        if ray.direction.norm_squared() == 0.0 {
            return None;
        }
        let ray = Ray::normalized(ray.origin, ray.direction);
        self.terrain
            .iter()
            .filter(|(_, terrain)| {
                terrain
                    .bounding_sphere()
                    .intersect_ray(&ray)
                    .is_some_and(|t| t <= max_distance)
            })
            .filter_map(|(handle, terrain)| {
                ray_vs_obb_hierarchy(&ray, terrain.collider(), max_distance).map(|t| (handle, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn in_grid(&self, element: Element) -> bool {
        element
            .iter()
            .zip(self.dimensions)
            .all(|(&e, d)| e >= 0 && i64::from(e) < i64::from(d))
    }

    fn clamp_element(&self, element: Element) -> Element {
        let mut clamped = element;
        for (axis, value) in clamped.iter_mut().enumerate() {
            let max = self.dimensions[axis] as i32 - 1;
            *value = (*value).clamp(0, max);
        }
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn environment() -> Environment {
        Environment::new(
            Transform::from_position(Vec3::new(100.0, 0.0, 0.0)),
            [5, 3, 4],
            &EnvironmentConfig::default(),
            &SpatialConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_grid() {
        let result = Environment::new(
            Transform::identity(),
            [4, 0, 4],
            &EnvironmentConfig::default(),
            &SpatialConfig::default(),
        );
        assert!(matches!(result, Err(PhysicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_element_lookup() {
        let env = environment();
        assert_eq!(env.element_at(&Vec3::new(15.0, 5.0, 39.0)), Some([1, 0, 3]));
        assert_eq!(env.element_at(&Vec3::new(-0.5, 5.0, 5.0)), None);
        assert_eq!(env.element_at(&Vec3::new(5.0, 30.0, 5.0)), None);

        let bounds = env.element_bounds([2, 1, 0]).unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(20.0, 10.0, 0.0));
        assert_relative_eq!(bounds.max, Vec3::new(30.0, 20.0, 10.0));
        assert!(env.element_bounds([5, 0, 0]).is_none());
    }

    #[test]
    fn test_nearest_element_clamps_to_grid() {
        let env = environment();
        assert_eq!(env.nearest_element(&Vec3::new(-50.0, 12.0, 500.0)), [0, 1, 3]);
        assert_eq!(env.nearest_element(&Vec3::new(25.0, 5.0, 5.0)), [2, 0, 0]);
    }

    #[test]
    fn test_element_range_from_sphere() {
        let env = environment();
        let (low, high) = env.element_range(&Vec3::new(15.0, 5.0, 15.0), 6.0);
        assert_eq!(low, [0, 0, 0]);
        assert_eq!(high, [2, 1, 2]);
    }

    #[test]
    fn test_element_contents_and_queries() {
        let mut env = environment();
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let a = bodies.insert(());
        let b = bodies.insert(());
        env.insert_object(a, Vec3::new(5.0, 5.0, 5.0), 1.0).unwrap();
        env.insert_object(b, Vec3::new(45.0, 25.0, 35.0), 1.0).unwrap();
        let floor = env.add_terrain(Terrain::cuboid(Vec3::new(5.0, 1.0, 5.0), Vec3::new(4.0, 1.0, 4.0))).unwrap();

        let contents = env.element_contents([0, 0, 0]).unwrap();
        assert!(contents.objects.contains(&a));
        assert!(contents.terrain.contains(&floor));
        assert!(env.element_contents([9, 0, 0]).is_none());

        let mut near = Vec::new();
        env.items_near(&Vec3::new(5.0, 5.0, 5.0), 1.0, ItemKinds::ALL, &mut near);
        assert!(near.contains(&EnvironmentItem::Object(a)));
        assert!(near.contains(&EnvironmentItem::Terrain(floor)));
        assert!(!near.contains(&EnvironmentItem::Object(b)));

        let mut within = Vec::new();
        env.objects_within(&Vec3::new(40.0, 25.0, 35.0), 6.0, &mut within);
        assert_eq!(within, vec![b]);

        assert!(env.remove_object(a));
        assert!(!env.contains_object(a));
        assert_eq!(env.objects(), &[b]);
    }

    #[test]
    fn test_ray_hits_nearest_terrain() {
        let mut env = environment();
        let near = env.add_terrain(Terrain::cuboid(Vec3::new(20.0, 5.0, 5.0), Vec3::repeat(1.0))).unwrap();
        env.add_terrain(Terrain::cuboid(Vec3::new(40.0, 5.0, 5.0), Vec3::repeat(1.0))).unwrap();

        let ray = Ray::new(Vec3::new(0.0, 5.0, 5.0), Vec3::new(2.0, 0.0, 0.0));
        let (handle, distance) = env.ray_vs_terrain(&ray, 100.0).unwrap();
        assert_eq!(handle, near);
        assert_relative_eq!(distance, 19.0, epsilon = 1e-4);
        assert!(env.ray_vs_terrain(&ray, 10.0).is_none());

        // World-space rays go through the environment placement
        let world = Ray::new(Vec3::new(100.0, 5.0, 5.0), Vec3::x());
        let (handle, _) = env.ray_vs_terrain(&env.ray_to_local(&world), 100.0).unwrap();
        assert_eq!(handle, near);
    }

    #[test]
    fn test_terrain_top() {
        let block = Terrain::cuboid(Vec3::new(0.0, 2.0, 0.0), Vec3::new(3.0, 0.5, 3.0));
        assert_relative_eq!(block.top(&Vec3::y()), 2.5);
    }
}
