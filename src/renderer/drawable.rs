use std::fmt;
use std::sync::Arc;

use glam::Mat3;

use crate::resources::geometry::Geometry;
use crate::resources::material::{Material, SharedMaterial};
use crate::scene::{NodeKey, Scene};

/// The unit submitted to a draw call.
///
/// The hooks run with the material locked, right before and after the draw.
/// Uniforms set in [`pre_render`](Self::pre_render) are flushed when the
/// renderer binds the material.
pub trait Drawable: fmt::Debug {
    fn geometry(&self) -> &Arc<Geometry>;

    fn material(&self) -> &SharedMaterial;

    /// Included in shadow map passes.
    fn casts_shadows(&self) -> bool {
        true
    }

    fn pre_render(&self, _scene: Option<&Scene>, _material: &mut Material) {}

    fn post_render(&self, _scene: Option<&Scene>, _material: &mut Material) {}
}

/// A scene node's mesh. Pushes its world and normal matrices before drawing.
#[derive(Debug, Clone)]
pub struct SceneDrawable {
    node: NodeKey,
    geometry: Arc<Geometry>,
    material: SharedMaterial,
    cast_shadows: bool,
}

impl SceneDrawable {
    /// `None` unless the node is drawable.
    #[must_use]
    pub fn from_node(scene: &Scene, key: NodeKey) -> Option<Self> {
        let node = scene.node(key)?;
        if !node.is_drawable() {
            return None;
        }
        Some(Self {
            node: key,
            geometry: Arc::clone(node.geometry.as_ref()?),
            material: Arc::clone(node.material.as_ref()?),
            cast_shadows: node.cast_shadows,
        })
    }

    /// Every drawable node of `scene` in traversal order.
    #[must_use]
    pub fn collect(scene: &Scene) -> Vec<Arc<dyn Drawable>> {
        scene
            .drawables()
            .into_iter()
            .filter_map(|key| Self::from_node(scene, key))
            .map(|d| Arc::new(d) as Arc<dyn Drawable>)
            .collect()
    }

    #[inline]
    #[must_use]
    pub fn node(&self) -> NodeKey {
        self.node
    }
}

impl Drawable for SceneDrawable {
    fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    fn material(&self) -> &SharedMaterial {
        &self.material
    }

    fn casts_shadows(&self) -> bool {
        self.cast_shadows
    }

    fn pre_render(&self, scene: Option<&Scene>, material: &mut Material) {
        let Some(scene) = scene else {
            return;
        };
        let model = scene.world_matrix(self.node);
        let normal = Mat3::from_mat4(model).inverse().transpose();
        material.set_uniform("modelMatrix", model);
        material.set_uniform("normalMatrix", normal);
    }
}

/// Geometry drawn without a scene node (gizmos, skybox).
#[derive(Debug, Clone)]
pub struct Primitive {
    geometry: Arc<Geometry>,
    material: SharedMaterial,
}

impl Primitive {
    #[must_use]
    pub fn new(geometry: Arc<Geometry>, material: SharedMaterial) -> Self {
        Self { geometry, material }
    }
}

impl Drawable for Primitive {
    fn geometry(&self) -> &Arc<Geometry> {
        &self.geometry
    }

    fn material(&self) -> &SharedMaterial {
        &self.material
    }

    fn casts_shadows(&self) -> bool {
        false
    }
}
