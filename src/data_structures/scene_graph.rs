//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in a slotmap owned by the [`Scene`] and refer to each other by
//! [`NodeId`]. A node is only ever inserted as a new root or as a new child of
//! an existing node, so every node has exactly one owner and the hierarchy is a
//! strict tree without any runtime cycle checks. Removing a node removes its
//! whole subtree; the removed ids go stale and are never reused.
//!
//! Global transforms are never stored: [`Scene::global_transform`] multiplies
//! the local transforms along the ancestor chain each time it is asked.

use cgmath::{Matrix4, SquareMatrix};
use serde::Deserialize;
use slotmap::{SlotMap, new_key_type};

use crate::data_structures::{camera::Camera, fragment::Fragment, model::Model};

new_key_type! {
    /// Key of a node inside its scene's arena.
    ///
    /// Ids are scene-local. A scene rejects ids it never handed out only when
    /// their slot is unused; an id taken from another scene whose slot happens
    /// to be occupied here resolves to this scene's node in that slot.
    pub struct NodeId;
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A pure transform node.
    Plain,
    Camera(Camera),
    Model(Model),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: Option<String>,
    /// Local transform in the parent's space.
    pub transform: Matrix4<f32>,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, transform: Matrix4<f32>) -> Self {
        Self {
            name: None,
            transform,
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn plain(transform: Matrix4<f32>) -> Self {
        Self::new(NodeKind::Plain, transform)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Lookup only; the parent does not own anything through this link.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn camera(&self) -> Option<&Camera> {
        match &self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.kind {
            NodeKind::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&Model> {
        match &self.kind {
            NodeKind::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        match &mut self.kind {
            NodeKind::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self.kind, NodeKind::Camera(_))
    }
}

/// Depth-first visitor. `before` fires when a node is entered, `after` once all
/// of its children have been visited.
pub trait Visit {
    fn before(&mut self, id: NodeId, node: &Node);

    fn after(&mut self, _id: NodeId, _node: &Node) {}
}

struct Hooks<B, A> {
    before: B,
    after: A,
}

impl<B, A> Visit for Hooks<B, A>
where
    B: FnMut(NodeId, &Node),
    A: FnMut(NodeId, &Node),
{
    fn before(&mut self, id: NodeId, node: &Node) {
        (self.before)(id, node)
    }

    fn after(&mut self, id: NodeId, node: &Node) {
        (self.after)(id, node)
    }
}

/// How the active camera is picked from a scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraDiscovery {
    /// The first camera met in traversal order, at any depth.
    #[default]
    FirstInTraversal,
    /// Only looks at root nodes and their first child: a root's first child
    /// wins over the root itself, the first root that matches wins overall.
    Shallow,
}

#[derive(Debug, Default)]
pub struct Scene {
    arena: SlotMap<NodeId, Node>,
    nodes: Vec<NodeId>,
    fragments: Vec<Fragment>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `node` to the root list. Root order is draw order.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.insert(node, None);
        self.nodes.push(id);
        id
    }

    /// Appends `node` as the last child of `parent`. Returns `None` if `parent`
    /// is not part of this scene.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Option<NodeId> {
        if !self.arena.contains_key(parent) {
            return None;
        }
        let id = self.insert(node, Some(parent));
        self.arena.get_mut(parent)?.children.push(id);
        Some(id)
    }

    fn insert(&mut self, mut node: Node, parent: Option<NodeId>) -> NodeId {
        node.parent = parent;
        node.children.clear();
        self.arena.insert(node)
    }

    /// Detaches `id` from its parent (or the root list) and removes it together
    /// with its descendants. Returns the removed nodes in traversal order.
    pub fn remove(&mut self, id: NodeId) -> Option<Vec<Node>> {
        let parent = self.arena.get(id)?.parent;
        match parent.and_then(|parent| self.arena.get_mut(parent)) {
            Some(parent) => parent.children.retain(|&child| child != id),
            None => self.nodes.retain(|&root| root != id),
        }

        let mut order = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.arena.get(next) {
                order.push(next);
                pending.extend(node.children.iter().rev());
            }
        }
        Some(
            order
                .into_iter()
                .filter_map(|id| self.arena.remove(id))
                .collect(),
        )
    }

    /// Root nodes in insertion order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.arena.get_mut(id)
    }

    pub fn camera(&self, id: NodeId) -> Option<&Camera> {
        self.node(id).and_then(Node::camera)
    }

    pub fn camera_mut(&mut self, id: NodeId) -> Option<&mut Camera> {
        self.node_mut(id).and_then(Node::camera_mut)
    }

    /// Total number of nodes, roots and descendants.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub(crate) fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Visits roots in order, each subtree pre-order with children in their own order.
    pub fn walk<V: Visit + ?Sized>(&self, visitor: &mut V) {
        for &root in &self.nodes {
            self.walk_node(root, visitor);
        }
    }

    fn walk_node<V: Visit + ?Sized>(&self, id: NodeId, visitor: &mut V) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        visitor.before(id, node);
        for &child in &node.children {
            self.walk_node(child, visitor);
        }
        visitor.after(id, node);
    }

    /// Closure form of [`Scene::walk`].
    pub fn traverse<B, A>(&self, before: B, after: A)
    where
        B: FnMut(NodeId, &Node),
        A: FnMut(NodeId, &Node),
    {
        self.walk(&mut Hooks { before, after });
    }

    /// All node ids in traversal order.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.arena.len());
        self.traverse(|id, _| order.push(id), |_, _| ());
        order
    }

    /// Ancestors of `id`, root first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent)?.parent;
        }
        chain.reverse();
        Some(chain)
    }

    /// Product of the ancestors' local transforms, root first, times the node's own.
    pub fn global_transform(&self, id: NodeId) -> Option<Matrix4<f32>> {
        let own = self.node(id)?.transform;
        let mut global = Matrix4::identity();
        for ancestor in self.ancestors(id)? {
            global = global * self.node(ancestor)?.transform;
        }
        Some(global * own)
    }

    pub fn find_camera(&self, discovery: CameraDiscovery) -> Option<NodeId> {
        match discovery {
            CameraDiscovery::FirstInTraversal => self
                .depth_first()
                .into_iter()
                .find(|&id| self.node(id).is_some_and(Node::is_camera)),
            CameraDiscovery::Shallow => self.nodes.iter().find_map(|&root| {
                let node = self.node(root)?;
                match node.children.first() {
                    Some(&first) if self.node(first).is_some_and(Node::is_camera) => Some(first),
                    _ if node.is_camera() => Some(root),
                    _ => None,
                }
            }),
        }
    }
}
