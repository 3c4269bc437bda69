//! Image-based lighting precomputation.
//!
//! All cubemap renders are layered: the whole cubemap (one mip level) is the
//! target, the skybox cube is drawn once and the program routes each face to
//! its layer with `cubeViewProjections[face]`.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::api::Allocate;
use crate::errors::{Result, SquareError};
use crate::renderer::passes::FrameContext;
use crate::renderer::state::{CullMode, DepthTest, RendererState};
use crate::resources::geometry::Geometry;
use crate::resources::material::SharedMaterial;
use crate::resources::material_library::programs;
use crate::resources::primitives::MeshBuilder;
use crate::resources::render_target::RenderTarget;
use crate::resources::shader::ShaderProgram;
use crate::resources::texture::{Sampler, Texture, TextureFormat, TextureWrap};

pub const DIFFUSE_SIZE: u32 = 32;
pub const SPECULAR_SIZE: u32 = 128;
pub const BRDF_LUT_SIZE: u32 = 512;

pub const IRRADIANCE_MAP_UNIFORM: &str = "irradianceMap";
pub const PREFILTER_MAP_UNIFORM: &str = "prefilterMap";
pub const BRDF_LUT_UNIFORM: &str = "brdfLUT";

const FACE_VIEW_PROJECTIONS_UNIFORM: &str = "cubeViewProjections";
const ENVIRONMENT_UNIFORM: &str = "environmentMap";

/// View-projection of each cubemap face in +X, -X, +Y, -Y, +Z, -Z order.
#[must_use]
pub fn cube_face_view_projections() -> [Mat4; 6] {
    let projection = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, 0.1, 10.0);
    let faces = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    faces.map(|(forward, up)| projection * Mat4::look_at_rh(Vec3::ZERO, forward, up))
}

/// Precomputed lighting maps of one environment.
#[derive(Debug, Clone)]
pub struct IblMaps {
    pub irradiance: Arc<Texture>,
    pub prefilter: Arc<Texture>,
    pub brdf_lut: Arc<Texture>,
}

impl IblMaps {
    /// Registers the maps as defaults on `program`.
    pub fn register(&self, program: &ShaderProgram) {
        program.set_texture_default(IRRADIANCE_MAP_UNIFORM, Arc::clone(&self.irradiance));
        program.set_texture_default(PREFILTER_MAP_UNIFORM, Arc::clone(&self.prefilter));
        program.set_texture_default(BRDF_LUT_UNIFORM, Arc::clone(&self.brdf_lut));
    }
}

fn clamped(mipmapping: bool) -> Sampler {
    Sampler {
        wrap: TextureWrap::ClampToEdge,
        mipmapping,
        ..Sampler::default()
    }
}

fn cube_state() -> RendererState {
    RendererState {
        clear_color: true,
        clear_depth: false,
        write_depth: false,
        depth_test: DepthTest::Disabled,
        cull_mode: CullMode::None,
        seamless_cubemap: true,
        ..RendererState::default()
    }
}

fn cube_material(ctx: &FrameContext<'_>, program: &str, name: &str) -> Result<SharedMaterial> {
    let material = ctx.resources.instantiate(program, name)?;
    {
        let mut m = material.write();
        for (face, view_projection) in cube_face_view_projections().into_iter().enumerate() {
            m.set_uniform_at(FACE_VIEW_PROJECTIONS_UNIFORM, face, view_projection);
        }
    }
    Ok(material)
}

fn draw_into(
    ctx: &mut FrameContext<'_>,
    target: RenderTarget,
    state: &RendererState,
    geometry: &Geometry,
    material: &SharedMaterial,
) -> Result<()> {
    target.allocate(ctx.device)?;
    ctx.renderer.set_target(ctx.device, &target);
    ctx.renderer.apply_state(ctx.device, state);
    if ctx.renderer.render(ctx.device, geometry, &mut material.write()) {
        Ok(())
    } else {
        Err(SquareError::Device(format!(
            "'{}' could not be drawn into '{}'",
            material.read().name(),
            target.name()
        )))
    }
}

/// Precomputes the diffuse irradiance cubemap, the prefiltered specular
/// cubemap and the integrated BRDF lookup table for `environment`.
pub fn compute_ibl(ctx: &mut FrameContext<'_>, environment: &Arc<Texture>) -> Result<IblMaps> {
    let cube = MeshBuilder::skybox().with_name("IBL Cube");
    cube.allocate(ctx.device)?;
    environment.allocate(ctx.device)?;
    let state = cube_state();

    // Diffuse
    let irradiance = Arc::new(
        Texture::new_cubemap(DIFFUSE_SIZE, TextureFormat::RGBHalf, clamped(false))
            .with_name("Irradiance Map"),
    );
    let diffuse = cube_material(ctx, programs::IBL_DIFFUSE, "IBL.Diffuse")?;
    diffuse
        .write()
        .set_texture(ENVIRONMENT_UNIFORM, Arc::clone(environment));
    draw_into(
        ctx,
        RenderTarget::color_level(Arc::clone(&irradiance), 0),
        &state,
        &cube,
        &diffuse,
    )?;

    // Specular, one roughness per mip level
    ctx.renderer.regenerate_mipmaps(ctx.device, environment);
    let prefilter = Arc::new(
        Texture::new_cubemap(SPECULAR_SIZE, TextureFormat::RGBHalf, clamped(true))
            .with_name("Prefilter Map"),
    );
    let specular = cube_material(ctx, programs::IBL_SPECULAR, "IBL.Specular")?;
    {
        let mut m = specular.write();
        m.set_texture(ENVIRONMENT_UNIFORM, Arc::clone(environment));
        m.set_uniform("resolution", environment.width() as f32);
    }
    let levels = prefilter_levels(SPECULAR_SIZE);
    for level in 0..levels {
        let roughness = level as f32 / (levels - 1).max(1) as f32;
        specular.write().set_uniform("roughness", roughness);
        draw_into(
            ctx,
            RenderTarget::color_level(Arc::clone(&prefilter), level),
            &state,
            &cube,
            &specular,
        )?;
    }

    // BRDF lookup table
    let brdf_lut = Arc::new(
        Texture::new_2d(BRDF_LUT_SIZE, BRDF_LUT_SIZE, TextureFormat::RGHalf, clamped(false))
            .with_name("BRDF LUT"),
    );
    let integrate = ctx
        .resources
        .instantiate(programs::INTEGRATED_BRDF, "IBL.IntegratedBRDF")?;
    let triangle = ctx
        .resources
        .screen_triangle(ctx.device)
        .ok_or_else(|| SquareError::Device("full-screen triangle unavailable".into()))?;
    draw_into(
        ctx,
        RenderTarget::color(Arc::clone(&brdf_lut), None),
        &RendererState::blit(),
        &triangle,
        &integrate,
    )?;

    log::info!(
        "Image-based lighting computed from '{}' ({levels} specular levels)",
        environment.name()
    );
    Ok(IblMaps {
        irradiance,
        prefilter,
        brdf_lut,
    })
}

/// Mip levels rendered into the prefiltered map.
#[must_use]
pub fn prefilter_levels(size: u32) -> u32 {
    (size.max(1) as f32).log2().ceil().max(1.0) as u32
}

/// Projects a longitude/latitude panorama onto a new cubemap of `size`.
///
/// The source must be twice as wide as it is high.
pub fn project_equirectangular_to_cubemap(
    ctx: &mut FrameContext<'_>,
    source: &Arc<Texture>,
    size: u32,
) -> Result<Arc<Texture>> {
    if source.width() != source.height() * 2 {
        return Err(SquareError::InvalidArgument(format!(
            "equirectangular map '{}' is {}x{}, expected a 2:1 ratio",
            source.name(),
            source.width(),
            source.height()
        )));
    }
    source.allocate(ctx.device)?;

    let cubemap = Arc::new(
        Texture::new_cubemap(size, TextureFormat::RGBHalf, clamped(true))
            .with_name(format!("{} (cubemap)", source.name())),
    );
    let cube = MeshBuilder::skybox().with_name("Projection Cube");
    cube.allocate(ctx.device)?;

    let material = cube_material(ctx, programs::PROJECT_EQR_TO_CUBE, "ProjectEqr2Cube")?;
    {
        let mut m = material.write();
        m.set_texture("equirectangularMap", Arc::clone(source));
        m.set_uniform("horizontalRotation", 0.0_f32);
    }
    let state = RendererState {
        clear_color_value: glam::Vec4::new(0.0, 0.0, 0.0, 1.0),
        ..cube_state()
    };
    draw_into(
        ctx,
        RenderTarget::color_level(Arc::clone(&cubemap), 0),
        &state,
        &cube,
        &material,
    )?;
    ctx.renderer.regenerate_mipmaps(ctx.device, &cubemap);
    Ok(cubemap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_matrices_look_down_their_axis() {
        let faces = cube_face_view_projections();
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (matrix, axis) in faces.iter().zip(axes) {
            let p = matrix.project_point3(axis);
            assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5, "{axis} -> {p}");
            assert!(p.z.abs() < 1.0);
        }
    }

    #[test]
    fn prefilter_levels_follow_size() {
        assert_eq!(prefilter_levels(128), 7);
        assert_eq!(prefilter_levels(1), 1);
    }
}
