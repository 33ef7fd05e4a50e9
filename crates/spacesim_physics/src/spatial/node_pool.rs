//! Pooled storage for spatial tree nodes
//!
//! Nodes live in a generation-checked arena. Released nodes keep their item
//! buffers and are handed out again on the next subdivision, so a running
//! tree stops allocating once it reaches its working size.

use bitflags::bitflags;

use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::collections::{NodeKey, SlotMap};
use crate::foundation::math::Vec3;
use crate::physics::collision::Aabb;

/// Category of a stored item; each category has its own list per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Moving or movable objects
    Object,
    /// Static terrain
    Terrain,
}

impl ItemKind {
    /// Number of item kinds
    pub const COUNT: usize = 2;

    /// All kinds in list order
    pub const ALL: [Self; Self::COUNT] = [Self::Object, Self::Terrain];

    /// Index of this kind's list
    pub const fn index(self) -> usize {
        match self {
            Self::Object => 0,
            Self::Terrain => 1,
        }
    }

    /// Mask containing only this kind
    pub const fn mask(self) -> ItemKinds {
        match self {
            Self::Object => ItemKinds::OBJECTS,
            Self::Terrain => ItemKinds::TERRAIN,
        }
    }
}

bitflags! {
    /// Set of item kinds a query should return
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ItemKinds: u8 {
        /// Objects
        const OBJECTS = 1 << 0;
        /// Terrain
        const TERRAIN = 1 << 1;
        /// Every kind
        const ALL = Self::OBJECTS.bits() | Self::TERRAIN.bits();
    }
}

/// An item as stored in a node list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredItem<T> {
    /// Caller's identifier for the item
    pub item: T,
    /// Position used for partitioning
    pub position: Vec3,
    /// Bounding radius around `position`
    pub radius: f32,
}

/// A node of a spatial tree
#[derive(Debug, Clone)]
pub struct SpatialNode<T> {
    pub(crate) bounds: Aabb,
    pub(crate) splits: [Option<f32>; 3],
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: [Option<NodeKey>; 8],
    pub(crate) child_count: usize,
    pub(crate) items: [Vec<StoredItem<T>>; ItemKind::COUNT],
    pub(crate) can_subdivide: bool,
    pub(crate) pruning_flag: bool,
    pub(crate) depth: u32,
}

impl<T> SpatialNode<T> {
    fn empty(list_capacity: usize) -> Self {
        Self {
            bounds: Aabb::new(Vec3::zeros(), Vec3::zeros()),
            splits: [None; 3],
            parent: None,
            children: [None; 8],
            child_count: 0,
            items: [Vec::with_capacity(list_capacity), Vec::with_capacity(list_capacity)],
            can_subdivide: false,
            pruning_flag: false,
            depth: 0,
        }
    }

    fn reset(&mut self) {
        self.splits = [None; 3];
        self.parent = None;
        self.children = [None; 8];
        self.child_count = 0;
        for list in &mut self.items {
            list.clear();
        }
        self.can_subdivide = false;
        self.pruning_flag = false;
        self.depth = 0;
    }

    /// Bounds of the node
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Parent node, `None` for the root
    pub const fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Child node keys
    pub fn children(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Number of children
    pub const fn child_count(&self) -> usize {
        self.child_count
    }

    /// True if the node has no children
    pub const fn is_leaf(&self) -> bool {
        self.child_count == 0
    }

    /// Items of one kind held directly by this node
    pub fn items(&self, kind: ItemKind) -> &[StoredItem<T>] {
        &self.items[kind.index()]
    }

    /// Total items of all kinds held directly by this node
    pub fn item_count(&self) -> usize {
        self.items.iter().map(Vec::len).sum()
    }

    /// True if the node is larger than the minimum size on some axis
    pub const fn can_subdivide(&self) -> bool {
        self.can_subdivide
    }

    /// Depth below the root
    pub const fn depth(&self) -> u32 {
        self.depth
    }
}

/// Bounded pool of spatial nodes
#[derive(Debug)]
pub struct NodePool<T> {
    nodes: SlotMap<NodeKey, SpatialNode<T>>,
    recycled: Vec<SpatialNode<T>>,
    capacity: usize,
    list_capacity: usize,
}

impl<T> NodePool<T> {
    /// Create a pool holding at most `capacity` live nodes, with
    /// `preallocated` nodes built up front
    pub fn new(preallocated: usize, capacity: usize, list_capacity: usize) -> Self {
        let preallocated = preallocated.min(capacity);
        Self {
            nodes: SlotMap::with_capacity_and_key(preallocated),
            recycled: (0..preallocated)
                .map(|_| SpatialNode::empty(list_capacity))
                .collect(),
            capacity,
            list_capacity,
        }
    }

    /// Draw a node from the pool
    pub fn acquire(
        &mut self,
        bounds: Aabb,
        parent: Option<NodeKey>,
        depth: u32,
    ) -> PhysicsResult<NodeKey> {
        if self.nodes.len() >= self.capacity {
            return Err(PhysicsError::NodePoolExhausted {
                capacity: self.capacity,
            });
        }
        let mut node = self
            .recycled
            .pop()
            .unwrap_or_else(|| SpatialNode::empty(self.list_capacity));
        node.reset();
        node.bounds = bounds;
        node.parent = parent;
        node.depth = depth;
        Ok(self.nodes.insert(node))
    }

    /// Return a node to the pool; stale keys are ignored
    pub fn release(&mut self, key: NodeKey) {
        if let Some(mut node) = self.nodes.remove(key) {
            node.reset();
            self.recycled.push(node);
        }
    }

    /// Look up a live node
    pub fn get(&self, key: NodeKey) -> Option<&SpatialNode<T>> {
        self.nodes.get(key)
    }

    /// Look up a live node mutably
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SpatialNode<T>> {
        self.nodes.get_mut(key)
    }

    /// True if the key refers to a live node
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Live node count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no nodes are live
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Hard limit on live nodes
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Nodes waiting for reuse
    pub fn recycled(&self) -> usize {
        self.recycled.len()
    }

    /// Iterate all live nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &SpatialNode<T>)> {
        self.nodes.iter()
    }

    /// Release every node
    pub fn release_all(&mut self) {
        let keys: Vec<NodeKey> = self.nodes.keys().collect();
        for key in keys {
            self.release(key);
        }
    }
}
