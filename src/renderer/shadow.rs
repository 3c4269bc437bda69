//! Shadow map setup and light-space math.
//!
//! Each shadow-casting directional light gets one depth-only target and one
//! override material. The light-space matrix is an orthographic projection
//! fitted around the scene bounds as seen from the light, recomputed every
//! frame so moving geometry stays covered.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::api::Device;
use crate::errors::Result;
use crate::renderer::resource_manager::ResourceManager;
use crate::resources::geometry::BoundingBox;
use crate::resources::material::SharedMaterial;
use crate::resources::material_library::programs;
use crate::resources::render_target::RenderTarget;
use crate::resources::shader::ShaderProgram;
use crate::resources::texture::{Sampler, Texture, TextureFormat};
use crate::scene::LightKey;

/// Maps clip space [-1, 1] to texture space [0, 1].
pub const BIAS_MATRIX: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.5, 0.5, 0.5, 1.0,
]);

/// Shared by every shadow default, cleared before re-registration.
pub const SHADOW_UNIFORM_PREFIX: &str = "_shadowMap";
pub const SHADOW_MAPS_UNIFORM: &str = "_shadowMaps";
pub const SHADOW_MAP_DIM_UNIFORM: &str = "_shadowMapDim";
pub const WORLD_TO_LIGHT_UNIFORM: &str = "worldToLight";

/// World-to-light matrix of a directional light covering `bounds`.
///
/// The view looks along `direction` through the bounds center; the
/// orthographic volume is the bounds' extent in light space.
#[must_use]
pub fn light_space_matrix(direction: Vec3, bounds: &BoundingBox) -> Mat4 {
    let bounds = if bounds.is_empty() {
        BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE)
    } else {
        *bounds
    };
    let direction = direction.normalize_or(Vec3::NEG_Y);
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::X
    } else {
        Vec3::Y
    };

    let center = bounds.center();
    let view = Mat4::look_at_rh(center, center + direction, up);
    let local = bounds.transform(&view);

    // View space looks down -Z: near/far are negated z extents.
    let projection = Mat4::orthographic_rh_gl(
        local.min.x,
        local.max.x,
        local.min.y,
        local.max.y,
        -local.max.z,
        -local.min.z,
    );
    projection * view
}

/// Per-light shadow resources.
#[derive(Debug, Clone)]
pub struct ShadowData {
    pub light: LightKey,
    /// Shadow slot in the `_shadowMaps` array.
    pub index: usize,
    /// World to light clip space.
    pub light_matrix: Mat4,
    pub target: Arc<RenderTarget>,
    pub material: SharedMaterial,
}

impl ShadowData {
    /// Allocates the depth-only target and override material of slot `index`.
    pub fn new(
        device: &mut dyn Device,
        resources: &ResourceManager,
        light: LightKey,
        index: usize,
        map_size: u32,
    ) -> Result<Self> {
        let depth = Arc::new(
            Texture::new_2d(map_size, map_size, TextureFormat::DepthFloat, Sampler::shadow_map())
                .with_name(format!("Shadow Map #{index}")),
        );
        let target = RenderTarget::depth_only(depth).with_name(format!("Shadow Target #{index}"));
        let target = resources
            .create_render_target(device, target)
            .ok_or_else(|| {
                crate::errors::SquareError::InvalidRenderTarget(format!(
                    "shadow map #{index} could not be allocated"
                ))
            })?;
        let material = resources.instantiate(programs::SHADOW_MAPPING, &format!("Shadow #{index}"))?;
        material
            .write()
            .set_uniform(WORLD_TO_LIGHT_UNIFORM, Mat4::IDENTITY);

        Ok(Self {
            light,
            index,
            light_matrix: Mat4::IDENTITY,
            target,
            material,
        })
    }

    /// Refits the light-space matrix and pushes it to the override material.
    pub fn update(&mut self, direction: Vec3, bounds: &BoundingBox) {
        self.light_matrix = light_space_matrix(direction, bounds);
        self.material
            .write()
            .set_uniform(WORLD_TO_LIGHT_UNIFORM, self.light_matrix);
    }

    /// World to shadow-map texture space.
    #[must_use]
    pub fn biased_matrix(&self) -> Mat4 {
        BIAS_MATRIX * self.light_matrix
    }

    /// Registers this map as a default on `program`.
    pub fn register(&self, program: &ShaderProgram) {
        if let Some(texture) = self.target.depth_texture() {
            program.set_texture_default_at(SHADOW_MAPS_UNIFORM, self.index, Arc::clone(texture));
        }
        let dim: Vec4 = self.target.dimensions();
        program.set_uniform_default_at(SHADOW_MAP_DIM_UNIFORM, self.index, dim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn bounds_center_maps_to_map_center() {
        let bounds = BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE);
        let m = BIAS_MATRIX * light_space_matrix(Vec3::new(-1.0, -1.0, -0.5), &bounds);
        let p = m.project_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::splat(0.5), EPSILON), "{p}");
    }

    #[test]
    fn all_corners_fit_the_volume() {
        let bounds = BoundingBox::new(Vec3::new(-3.0, 0.0, -1.0), Vec3::new(5.0, 2.0, 4.0));
        let m = light_space_matrix(Vec3::new(0.3, -1.0, 0.2), &bounds);
        for corner in bounds.corners() {
            let p = m.project_point3(corner);
            assert!(p.abs().max_element() <= 1.0 + EPSILON, "{corner} -> {p}");
        }
    }

    #[test]
    fn straight_down_light_uses_fallback_up() {
        let bounds = BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE);
        let m = light_space_matrix(Vec3::NEG_Y, &bounds);
        assert!(m.is_finite());
        let p = m.project_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::ZERO, EPSILON));
    }
}
