//! Octree spatial partitioning
//!
//! [`SpatialTree`] indexes items by position. Leaves hold up to
//! `max_items_per_node` items before splitting into as many as eight
//! children; axes already at the minimum node size are not split. Every
//! stored item is recorded against its owning node and its slot in that
//! node's list, which gives O(1) removal and lets moves start from the
//! item's current node instead of the root.

use std::collections::HashMap;
use std::hash::Hash;

use log::{trace, warn};

use crate::config::SpatialConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::collections::NodeKey;
use crate::foundation::math::Vec3;
use crate::physics::collision::Aabb;

use super::node_pool::{ItemKind, ItemKinds, NodePool, SpatialNode, StoredItem};
use super::space::CoordinateSpace;

/// Where an item is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ItemSlot {
    node: NodeKey,
    kind: ItemKind,
    index: usize,
}

/// Filter applied by range queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryFilter {
    /// Kinds to return
    pub kinds: ItemKinds,
    /// Grow the query radius by each item's own radius
    pub include_item_radius: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            kinds: ItemKinds::ALL,
            include_item_radius: false,
        }
    }
}

impl QueryFilter {
    /// Objects only, matching anything whose bounding sphere reaches the query sphere
    pub const fn overlapping_objects() -> Self {
        Self {
            kinds: ItemKinds::OBJECTS,
            include_item_radius: true,
        }
    }
}

/// Octree over a coordinate space `S`, storing items identified by `T`
#[derive(Debug)]
pub struct SpatialTree<S: CoordinateSpace, T: Copy + Eq + Hash> {
    space: S,
    config: SpatialConfig,
    pool: NodePool<T>,
    root: NodeKey,
    slots: HashMap<T, ItemSlot>,
    /// Largest stored radius per item kind; widens query culling
    max_item_radius: [f32; ItemKind::COUNT],
    /// Set when the largest item of a kind shrank or left
    radius_stale: bool,
}

impl<S: CoordinateSpace, T: Copy + Eq + Hash> SpatialTree<S, T> {
    /// Create an empty tree covering `bounds`
    pub fn new(space: S, bounds: Aabb, config: SpatialConfig) -> PhysicsResult<Self> {
        let mut pool = NodePool::new(
            config.preallocated_nodes,
            config.node_pool_capacity,
            config.max_items_per_node,
        );
        let root = pool.acquire(bounds, None, 0)?;
        let mut tree = Self {
            space,
            config,
            pool,
            root,
            slots: HashMap::new(),
            max_item_radius: [0.0; ItemKind::COUNT],
            radius_stale: false,
        };
        tree.init_node(root);
        Ok(tree)
    }

    /// Coordinate space of the tree
    pub const fn space(&self) -> &S {
        &self.space
    }

    /// Tree configuration
    pub const fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Root node key
    pub const fn root(&self) -> NodeKey {
        self.root
    }

    /// Bounds of the whole tree
    pub fn bounds(&self) -> Aabb {
        self.pool
            .get(self.root)
            .map_or_else(|| Aabb::new(Vec3::zeros(), Vec3::zeros()), |n| n.bounds)
    }

    /// Look up a node
    pub fn node(&self, key: NodeKey) -> Option<&SpatialNode<T>> {
        self.pool.get(key)
    }

    /// Number of items stored
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    /// Number of leaf nodes
    pub fn leaf_count(&self) -> usize {
        self.pool.iter().filter(|(_, n)| n.is_leaf()).count()
    }

    /// Greatest node depth in the tree
    pub fn depth(&self) -> u32 {
        self.pool.iter().map(|(_, n)| n.depth).max().unwrap_or(0)
    }

    /// True if the item is stored
    pub fn contains(&self, item: &T) -> bool {
        self.slots.contains_key(item)
    }

    /// Node currently holding the item
    pub fn node_of(&self, item: &T) -> Option<NodeKey> {
        self.slots.get(item).map(|slot| slot.node)
    }

    /// Stored record for the item
    pub fn get(&self, item: &T) -> Option<&StoredItem<T>> {
        let slot = self.slots.get(item)?;
        self.pool
            .get(slot.node)?
            .items[slot.kind.index()]
            .get(slot.index)
    }

    /// Kind the item was stored as
    pub fn kind_of(&self, item: &T) -> Option<ItemKind> {
        self.slots.get(item).map(|slot| slot.kind)
    }

    /// Iterate every stored item
    pub fn iter(&self) -> impl Iterator<Item = &StoredItem<T>> {
        self.pool
            .iter()
            .flat_map(|(_, node)| node.items.iter().flat_map(|list| list.iter()))
    }

    /// Store an item, descending from the root
    pub fn insert(&mut self, item: T, position: Vec3, radius: f32, kind: ItemKind) -> PhysicsResult<NodeKey> {
        self.insert_from(item, position, radius, kind, None)
    }

    /// Store an item, starting the search at `hint`
    ///
    /// The search walks up from the hint until a node contains the position,
    /// then descends, splitting full leaves on the way. Inserting an item that
    /// is already stored moves it instead.
    pub fn insert_from(
        &mut self,
        item: T,
        position: Vec3,
        radius: f32,
        kind: ItemKind,
        hint: Option<NodeKey>,
    ) -> PhysicsResult<NodeKey> {
        if self.slots.contains_key(&item) {
            return self.move_item(item, position, radius);
        }
        let start = self.find_containing_ancestor(hint, &position)?;
        self.descend_and_store(start, StoredItem { item, position, radius }, kind, false)
    }

    /// Remove an item; returns false if it was not stored
    pub fn remove(&mut self, item: &T) -> bool {
        let Some(slot) = self.slots.remove(item) else {
            return false;
        };
        let Some(node) = self.pool.get_mut(slot.node) else {
            debug_assert!(false, "item slot refers to a released node");
            return false;
        };
        let list = &mut node.items[slot.kind.index()];
        let removed = list.swap_remove(slot.index);
        if removed.radius >= self.max_item_radius[slot.kind.index()] {
            self.radius_stale = true;
        }
        if let Some(moved) = list.get(slot.index) {
            if let Some(moved_slot) = self.slots.get_mut(&moved.item) {
                moved_slot.index = slot.index;
            }
        }
        self.mark_for_pruning(slot.node);
        true
    }

    /// Update an item's position and radius
    ///
    /// An item that leaves its node is removed and re-inserted starting from
    /// that node's parent. If the pool is exhausted during re-insertion the
    /// item is kept in an over-full leaf and the error is still returned.
    pub fn move_item(&mut self, item: T, position: Vec3, radius: f32) -> PhysicsResult<NodeKey> {
        let slot = *self.slots.get(&item).ok_or(PhysicsError::UnknownItem)?;
        let node = self.pool.get_mut(slot.node).ok_or(PhysicsError::UnknownItem)?;

        if node.is_leaf() && node.bounds.contains_point(&position) {
            let max_radius = &mut self.max_item_radius[slot.kind.index()];
            if let Some(stored) = node.items[slot.kind.index()].get_mut(slot.index) {
                if radius < stored.radius && stored.radius >= *max_radius {
                    self.radius_stale = true;
                }
                stored.position = position;
                stored.radius = radius;
            }
            *max_radius = max_radius.max(radius);
            return Ok(slot.node);
        }

        let parent = node.parent.unwrap_or(slot.node);
        self.remove(&item);
        let start = self.find_containing_ancestor(Some(parent), &position)?;
        let stored = StoredItem { item, position, radius };
        match self.descend_and_store(start, stored, slot.kind, false) {
            Err(PhysicsError::NodePoolExhausted { capacity }) => {
                warn!("{} tree: node pool exhausted while moving item; storing in full leaf", S::NAME);
                self.descend_and_store(start, stored, slot.kind, true)?;
                Err(PhysicsError::NodePoolExhausted { capacity })
            }
            other => other,
        }
    }

    /// Remove every item and collapse the tree to its root
    pub fn clear(&mut self) {
        let bounds = self.bounds();
        self.pool.release_all();
        self.slots.clear();
        self.max_item_radius = [0.0; ItemKind::COUNT];
        self.radius_stale = false;
        // A released pool always has room for the root
        if let Ok(root) = self.pool.acquire(bounds, None, 0) {
            self.root = root;
            self.init_node(root);
        }
    }

    /// Collapse subtrees that have shrunk below the per-node maximum
    ///
    /// Only nodes flagged by removals are visited. Children are checked before
    /// their parent, so a single pass can collapse several levels. The
    /// per-kind radius margins are recomputed here if they went stale.
    pub fn pruning_check(&mut self) {
        let root = self.root;
        self.prune_node(root);
        if self.radius_stale {
            self.recompute_max_item_radius();
        }
    }

    /// Largest radius currently used to widen queries for `kind`
    ///
    /// May overestimate until the next [`Self::pruning_check`].
    pub fn max_item_radius(&self, kind: ItemKind) -> f32 {
        self.max_item_radius[kind.index()]
    }

    fn recompute_max_item_radius(&mut self) {
        let mut max_radius = [0.0_f32; ItemKind::COUNT];
        for (_, node) in self.pool.iter() {
            for kind in ItemKind::ALL {
                for stored in &node.items[kind.index()] {
                    max_radius[kind.index()] = max_radius[kind.index()].max(stored.radius);
                }
            }
        }
        trace!("{} tree: item radius margins now {max_radius:?}", S::NAME);
        self.max_item_radius = max_radius;
        self.radius_stale = false;
    }

    fn radius_margin(&self, kinds: ItemKinds) -> f32 {
        ItemKind::ALL
            .into_iter()
            .filter(|kind| kinds.contains(kind.mask()))
            .map(|kind| self.max_item_radius[kind.index()])
            .fold(0.0, f32::max)
    }

    /// Leaf containing `point`, if it lies inside the tree
    pub fn node_containing(&self, point: &Vec3) -> Option<NodeKey> {
        let mut key = self.root;
        let mut node = self.pool.get(key)?;
        if !node.bounds.contains_point(point) {
            return None;
        }
        while !node.is_leaf() {
            key = Self::child_for(node, point)?;
            node = self.pool.get(key)?;
        }
        Some(key)
    }

    /// Items whose position lies within `radius` of `origin`
    pub fn range_query(&self, origin: &Vec3, radius: f32) -> Vec<T> {
        let mut out = Vec::new();
        self.range_query_into(origin, radius, QueryFilter::default(), &mut out);
        out
    }

    /// Range query appending into a caller-owned buffer
    pub fn range_query_into(&self, origin: &Vec3, radius: f32, filter: QueryFilter, out: &mut Vec<T>) {
        let reach = if filter.include_item_radius {
            radius + self.radius_margin(filter.kinds)
        } else {
            radius
        };
        let query_box = Aabb::from_center_extents(*origin, Vec3::repeat(reach));
        let start = self.smallest_covering_node(&query_box);
        self.collect_in_sphere(start, origin, radius, reach, filter, out);
    }

    /// Items whose bounding sphere overlaps `area`
    pub fn query_aabb_into(&self, area: &Aabb, kinds: ItemKinds, out: &mut Vec<T>) {
        let reach = area.expanded(self.radius_margin(kinds));
        let start = self.smallest_covering_node(&reach);
        self.collect_in_box(start, area, &reach, kinds, out);
    }

    /// Nearest item of the given kinds to `point`, with its distance
    pub fn nearest(&self, point: &Vec3, kinds: ItemKinds) -> Option<(T, f32)> {
        let mut best: Option<(T, f32)> = None;
        self.nearest_in(self.root, point, kinds, &mut best);
        best.map(|(item, dist_sq)| (item, dist_sq.sqrt()))
    }

    /// Check that node lists and item records agree
    ///
    /// Every record must point at a live leaf holding the item at the
    /// recorded index, and every listed item must have a record pointing back.
    pub fn validate(&self) -> Result<(), String> {
        let mut listed = 0;
        for (key, node) in self.pool.iter() {
            if !node.is_leaf() && node.item_count() > 0 {
                return Err(format!("branch node {key:?} holds {} items", node.item_count()));
            }
            for kind in ItemKind::ALL {
                for (index, stored) in node.items[kind.index()].iter().enumerate() {
                    listed += 1;
                    let expected = ItemSlot { node: key, kind, index };
                    if self.slots.get(&stored.item) != Some(&expected) {
                        return Err(format!("item in node {key:?} slot {index} has a stale record"));
                    }
                }
            }
            for child in node.children() {
                if self.pool.get(child).and_then(|c| c.parent) != Some(key) {
                    return Err(format!("child {child:?} does not point back to {key:?}"));
                }
            }
        }
        if listed != self.slots.len() {
            return Err(format!("{} records but {listed} listed items", self.slots.len()));
        }
        Ok(())
    }

    fn init_node(&mut self, key: NodeKey) {
        let min_size = self.config.min_node_size;
        let space = self.space.clone();
        if let Some(node) = self.pool.get_mut(key) {
            let size = node.bounds.size();
            for axis in 0..3 {
                node.splits[axis] = space.split_point(node.bounds.min[axis], size[axis], min_size);
            }
            node.can_subdivide = node.splits.iter().any(Option::is_some);
        }
    }

    fn find_containing_ancestor(&self, hint: Option<NodeKey>, position: &Vec3) -> PhysicsResult<NodeKey> {
        let mut key = hint.filter(|k| self.pool.contains(*k)).unwrap_or(self.root);
        loop {
            let node = self.pool.get(key).ok_or(PhysicsError::UnknownItem)?;
            if node.bounds.contains_point(position) {
                return Ok(key);
            }
            match node.parent {
                Some(parent) => key = parent,
                None => return Err(PhysicsError::PositionOutsideTree { position: *position }),
            }
        }
    }

    fn descend_and_store(
        &mut self,
        start: NodeKey,
        stored: StoredItem<T>,
        kind: ItemKind,
        allow_overflow: bool,
    ) -> PhysicsResult<NodeKey> {
        let max_items = self.config.max_items_per_node;
        let mut key = start;
        loop {
            let node = self.pool.get(key).ok_or(PhysicsError::UnknownItem)?;
            if !node.is_leaf() {
                match Self::child_for(node, &stored.position) {
                    Some(child) => {
                        key = child;
                        continue;
                    }
                    None => break,
                }
            }
            if node.item_count() < max_items || !node.can_subdivide || allow_overflow {
                break;
            }
            self.subdivide(key)?;
        }

        let node = self.pool.get_mut(key).ok_or(PhysicsError::UnknownItem)?;
        let list = &mut node.items[kind.index()];
        list.push(stored);
        self.slots.insert(
            stored.item,
            ItemSlot {
                node: key,
                kind,
                index: list.len() - 1,
            },
        );
        let max_radius = &mut self.max_item_radius[kind.index()];
        *max_radius = max_radius.max(stored.radius);
        Ok(key)
    }

    fn child_for(node: &SpatialNode<T>, position: &Vec3) -> Option<NodeKey> {
        let octant = (0..3).fold(0, |acc, axis| match node.splits[axis] {
            Some(split) if position[axis] >= split => acc | (1 << axis),
            _ => acc,
        });
        let child = node.children[octant];
        debug_assert!(child.is_some(), "missing child for octant {octant}");
        child
    }

    fn child_bounds(bounds: &Aabb, splits: &[Option<f32>; 3], octant: usize) -> Option<Aabb> {
        let mut min = bounds.min;
        let mut max = bounds.max;
        for axis in 0..3 {
            let upper = octant & (1 << axis) != 0;
            match (splits[axis], upper) {
                (Some(split), false) => max[axis] = split,
                (Some(split), true) => min[axis] = split,
                (None, true) => return None,
                (None, false) => {}
            }
        }
        Some(Aabb::new(min, max))
    }

    fn subdivide(&mut self, key: NodeKey) -> PhysicsResult<()> {
        let (bounds, splits, depth) = {
            let node = self.pool.get(key).ok_or(PhysicsError::UnknownItem)?;
            (node.bounds, node.splits, node.depth)
        };

        let mut children = [None; 8];
        for octant in 0..8 {
            let Some(child_bounds) = Self::child_bounds(&bounds, &splits, octant) else {
                continue;
            };
            match self.pool.acquire(child_bounds, Some(key), depth + 1) {
                Ok(child) => {
                    self.init_node(child);
                    children[octant] = Some(child);
                }
                Err(err) => {
                    for acquired in children.iter().flatten() {
                        self.pool.release(*acquired);
                    }
                    warn!("{} tree: cannot subdivide node at depth {depth}: {err}", S::NAME);
                    return Err(err);
                }
            }
        }

        let node = self.pool.get_mut(key).ok_or(PhysicsError::UnknownItem)?;
        node.children = children;
        node.child_count = children.iter().flatten().count();
        let lists = std::mem::take(&mut node.items);
        trace!(
            "{} tree: split node at depth {depth} into {} children",
            S::NAME,
            node.child_count
        );

        for kind in ItemKind::ALL {
            for stored in &lists[kind.index()] {
                let Some(child_key) = self
                    .pool
                    .get(key)
                    .and_then(|n| Self::child_for(n, &stored.position))
                else {
                    continue;
                };
                if let Some(child) = self.pool.get_mut(child_key) {
                    let list = &mut child.items[kind.index()];
                    list.push(*stored);
                    self.slots.insert(
                        stored.item,
                        ItemSlot {
                            node: child_key,
                            kind,
                            index: list.len() - 1,
                        },
                    );
                }
            }
        }

        // Hand the emptied buffers back to the node for reuse
        if let Some(node) = self.pool.get_mut(key) {
            for (target, mut list) in node.items.iter_mut().zip(lists) {
                list.clear();
                *target = list;
            }
        }
        Ok(())
    }

    fn mark_for_pruning(&mut self, from: NodeKey) {
        let mut key = self.pool.get(from).and_then(|n| n.parent);
        while let Some(current) = key {
            match self.pool.get_mut(current) {
                Some(node) => {
                    node.pruning_flag = true;
                    key = node.parent;
                }
                None => break,
            }
        }
    }

    fn prune_node(&mut self, key: NodeKey) {
        let children: Vec<NodeKey> = match self.pool.get_mut(key) {
            Some(node) if node.pruning_flag && !node.is_leaf() => {
                node.pruning_flag = false;
                node.children().collect()
            }
            Some(node) => {
                node.pruning_flag = false;
                return;
            }
            None => return,
        };

        for &child in &children {
            if self.pool.get(child).is_some_and(|c| !c.is_leaf()) {
                self.prune_node(child);
            }
        }

        let mut total = 0;
        for &child in &children {
            match self.pool.get(child) {
                Some(c) if c.is_leaf() => total += c.item_count(),
                _ => return,
            }
        }
        if total >= self.config.max_items_per_node {
            return;
        }
        self.collapse(key, &children);
    }

    fn collapse(&mut self, key: NodeKey, children: &[NodeKey]) {
        let mut gathered: [Vec<StoredItem<T>>; ItemKind::COUNT] = Default::default();
        for &child in children {
            if let Some(node) = self.pool.get_mut(child) {
                for kind in ItemKind::ALL {
                    gathered[kind.index()].append(&mut node.items[kind.index()]);
                }
            }
            self.pool.release(child);
        }

        let Some(node) = self.pool.get_mut(key) else {
            return;
        };
        node.children = [None; 8];
        node.child_count = 0;
        for kind in ItemKind::ALL {
            let list = &mut node.items[kind.index()];
            for stored in gathered[kind.index()].drain(..) {
                list.push(stored);
                self.slots.insert(
                    stored.item,
                    ItemSlot {
                        node: key,
                        kind,
                        index: list.len() - 1,
                    },
                );
            }
        }
        trace!("{} tree: collapsed {} children at depth {}", S::NAME, children.len(), node.depth);
        if let Some(parent) = node.parent {
            if let Some(p) = self.pool.get_mut(parent) {
                p.pruning_flag = true;
            }
        }
    }

    fn smallest_covering_node(&self, area: &Aabb) -> NodeKey {
        let mut key = self.root;
        while let Some(node) = self.pool.get(key) {
            let next = node
                .children()
                .find(|c| self.pool.get(*c).is_some_and(|n| n.bounds.contains_aabb(area)));
            match next {
                Some(child) => key = child,
                None => break,
            }
        }
        key
    }

    fn collect_in_sphere(
        &self,
        key: NodeKey,
        origin: &Vec3,
        radius: f32,
        reach: f32,
        filter: QueryFilter,
        out: &mut Vec<T>,
    ) {
        let Some(node) = self.pool.get(key) else {
            return;
        };
        if !node.bounds.intersects_sphere(origin, reach) {
            return;
        }
        for kind in ItemKind::ALL {
            if !filter.kinds.contains(kind.mask()) {
                continue;
            }
            for stored in &node.items[kind.index()] {
                let r = if filter.include_item_radius {
                    radius + stored.radius
                } else {
                    radius
                };
                if (stored.position - origin).norm_squared() <= r * r {
                    out.push(stored.item);
                }
            }
        }
        for child in node.children() {
            self.collect_in_sphere(child, origin, radius, reach, filter, out);
        }
    }

    fn collect_in_box(&self, key: NodeKey, area: &Aabb, reach: &Aabb, kinds: ItemKinds, out: &mut Vec<T>) {
        let Some(node) = self.pool.get(key) else {
            return;
        };
        if !node.bounds.intersects(reach) {
            return;
        }
        for kind in ItemKind::ALL {
            if !kinds.contains(kind.mask()) {
                continue;
            }
            for stored in &node.items[kind.index()] {
                if area.intersects_sphere(&stored.position, stored.radius) {
                    out.push(stored.item);
                }
            }
        }
        for child in node.children() {
            self.collect_in_box(child, area, reach, kinds, out);
        }
    }

    fn nearest_in(&self, key: NodeKey, point: &Vec3, kinds: ItemKinds, best: &mut Option<(T, f32)>) {
        let Some(node) = self.pool.get(key) else {
            return;
        };
        if let Some((_, best_sq)) = best {
            if node.bounds.distance_sq_to_point(point) > *best_sq {
                return;
            }
        }
        for kind in ItemKind::ALL {
            if !kinds.contains(kind.mask()) {
                continue;
            }
            for stored in &node.items[kind.index()] {
                let d = (stored.position - point).norm_squared();
                if best.map_or(true, |(_, b)| d < b) {
                    *best = Some((stored.item, d));
                }
            }
        }

        // Visit nearer children first so later ones are culled
        let mut order: Vec<(f32, NodeKey)> = node
            .children()
            .filter_map(|c| {
                self.pool
                    .get(c)
                    .map(|n| (n.bounds.distance_sq_to_point(point), c))
            })
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, child) in order {
            self.nearest_in(child, point, kinds, best);
        }
    }
}
