use std::cell::Cell;
use std::sync::Arc;

use glam::Mat4;
use slotmap::SlotMap;

use crate::resources::geometry::BoundingBox;
use crate::resources::texture::Texture;
use crate::scene::light::Light;
use crate::scene::node::{Node, WorldCache};
use crate::scene::{LightKey, NodeKey};

/// Scene graph: a node arena rooted at one node, plus lights and sky.
///
/// World matrices are computed on demand. A node's cached matrix stays valid
/// while its local transform equals the snapshot it was built from and its
/// parent's cache revision is unchanged, so editing a transform invalidates
/// the whole subtree without touching it.
#[derive(Debug)]
pub struct Scene {
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    lights: SlotMap<LightKey, Light>,
    sky: Option<Arc<Texture>>,
    revision: Cell<u64>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new("Root"));
        Self {
            nodes,
            root,
            lights: SlotMap::with_key(),
            sky: None,
            revision: Cell::new(0),
        }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeKey {
        self.root
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Adds `node` under the root.
    pub fn add_node(&mut self, node: Node) -> NodeKey {
        let root = self.root;
        self.insert_under(root, node)
    }

    /// Adds `node` under `parent`. Returns `None` if `parent` is gone.
    pub fn add_child(&mut self, parent: NodeKey, node: Node) -> Option<NodeKey> {
        self.nodes.contains_key(parent).then(|| self.insert_under(parent, node))
    }

    fn insert_under(&mut self, parent: NodeKey, mut node: Node) -> NodeKey {
        node.parent = Some(parent);
        node.children.clear();
        node.world.set(None);
        let key = self.nodes.insert(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(key);
        }
        key
    }

    /// Moves `child` under `parent`. Refuses to create cycles or move the root.
    pub fn attach(&mut self, child: NodeKey, parent: NodeKey) -> bool {
        if child == self.root || !self.nodes.contains_key(child) || !self.nodes.contains_key(parent)
        {
            return false;
        }
        // `parent` must not live inside `child`'s subtree.
        let mut cursor = Some(parent);
        while let Some(key) = cursor {
            if key == child {
                return false;
            }
            cursor = self.nodes.get(key).and_then(|n| n.parent);
        }

        if let Some(old) = self.nodes.get(child).and_then(|n| n.parent)
            && let Some(old_parent) = self.nodes.get_mut(old)
        {
            old_parent.children.retain(|&c| c != child);
        }
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            c.world.set(None);
        }
        true
    }

    /// Removes `key` and its whole subtree. The root cannot be removed.
    pub fn remove_node(&mut self, key: NodeKey) -> bool {
        if key == self.root || !self.nodes.contains_key(key) {
            return false;
        }
        if let Some(parent) = self.nodes.get(key).and_then(|n| n.parent)
            && let Some(p) = self.nodes.get_mut(parent)
        {
            p.children.retain(|&c| c != key);
        }
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
        true
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    /// World matrix of `key`, recomputed only along stale ancestors.
    #[must_use]
    pub fn world_matrix(&self, key: NodeKey) -> Mat4 {
        self.validate(key).map_or(Mat4::IDENTITY, |c| c.matrix)
    }

    fn validate(&self, key: NodeKey) -> Option<WorldCache> {
        self.nodes.get(key)?;
        // Leaf to root, then resolved root first.
        let mut chain = Vec::new();
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            let Some(node) = self.nodes.get(current) else {
                break;
            };
            chain.push(node);
            cursor = node.parent;
        }

        let mut parent = None;
        for node in chain.into_iter().rev() {
            parent = Some(self.resolve(node, parent.as_ref()));
        }
        parent
    }

    /// Returns the node's cached world matrix, refreshing it if its local
    /// transform or its parent's revision changed.
    fn resolve(&self, node: &Node, parent: Option<&WorldCache>) -> WorldCache {
        let (parent_matrix, parent_revision) =
            parent.map_or((Mat4::IDENTITY, 0), |p| (p.matrix, p.revision));

        if let Some(cached) = node.world.get()
            && cached.local == node.transform
            && cached.parent_revision == parent_revision
        {
            return cached;
        }

        let revision = self.revision.get() + 1;
        self.revision.set(revision);
        let cache = WorldCache {
            matrix: parent_matrix * node.transform.local_matrix(),
            local: node.transform,
            parent_revision,
            revision,
        };
        node.world.set(Some(cache));
        cache
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Depth-first, parents before children, children in insertion order.
    pub fn traverse(&self, mut visit: impl FnMut(NodeKey, &Node, &Mat4)) {
        let mut stack: Vec<(NodeKey, Option<WorldCache>)> = vec![(self.root, None)];
        while let Some((key, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            let world = self.resolve(node, parent.as_ref());
            visit(key, node, &world.matrix);
            stack.extend(node.children.iter().rev().map(|&child| (child, Some(world))));
        }
    }

    /// Nodes with geometry and material, in traversal order.
    #[must_use]
    pub fn drawables(&self) -> Vec<NodeKey> {
        let mut keys = Vec::new();
        self.traverse(|key, node, _| {
            if node.is_drawable() {
                keys.push(key);
            }
        });
        keys
    }

    /// Union of the world-space bounds of every drawable.
    #[must_use]
    pub fn scene_bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::EMPTY;
        self.traverse(|_, node, world| {
            if node.is_drawable()
                && let Some(geometry) = &node.geometry
            {
                bounds = bounds.union(&geometry.bounds().transform(world));
            }
        });
        bounds
    }

    // ========================================================================
    // Lights & Sky
    // ========================================================================

    pub fn add_light(&mut self, light: Light) -> LightKey {
        self.lights.insert(light)
    }

    pub fn remove_light(&mut self, key: LightKey) -> Option<Light> {
        self.lights.remove(key)
    }

    #[must_use]
    pub fn light(&self, key: LightKey) -> Option<&Light> {
        self.lights.get(key)
    }

    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightKey, &Light)> {
        self.lights.iter()
    }

    #[must_use]
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    #[must_use]
    pub fn sky(&self) -> Option<&Arc<Texture>> {
        self.sky.as_ref()
    }

    pub fn set_sky(&mut self, sky: Option<Arc<Texture>>) {
        self.sky = sky;
    }
}
