use std::cell::Cell;
use std::sync::Arc;

use glam::Mat4;

use crate::resources::geometry::Geometry;
use crate::resources::material::SharedMaterial;
use crate::scene::NodeKey;
use crate::scene::transform::Transform;

/// Cached world matrix and the inputs it was computed from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorldCache {
    pub matrix: Mat4,
    pub local: Transform,
    pub parent_revision: u64,
    pub revision: u64,
}

/// A scene graph node.
///
/// Ownership flows from parent to children through the scene arena; the
/// parent link is a plain key. The world matrix is cached and revalidated
/// lazily when read (see [`Scene::world_matrix`](crate::scene::Scene::world_matrix)).
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,

    pub transform: Transform,

    pub geometry: Option<Arc<Geometry>>,
    pub material: Option<SharedMaterial>,
    /// Rendered into shadow maps.
    pub cast_shadows: bool,
    pub visible: bool,

    pub(crate) world: Cell<Option<WorldCache>>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new("Node")
    }
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            transform: Transform::IDENTITY,
            geometry: None,
            material: None,
            cast_shadows: true,
            visible: true,
            world: Cell::new(None),
        }
    }

    /// Node drawing `geometry` with `material`.
    #[must_use]
    pub fn with_mesh(
        name: impl Into<String>,
        geometry: Arc<Geometry>,
        material: SharedMaterial,
    ) -> Self {
        Self {
            geometry: Some(geometry),
            material: Some(material),
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Has something to draw.
    #[inline]
    #[must_use]
    pub fn is_drawable(&self) -> bool {
        self.visible && self.geometry.is_some() && self.material.is_some()
    }
}
