//! Render Engine Tests
//!
//! Tests for:
//! - Pass-list construction and its determinism
//! - Degenerate inputs (no camera, no output, failed working target)
//! - Shadow slots, light-space fitting and program defaults
//! - Transparent geometry excluded from shadow maps
//! - Lights block truncation
//! - Runtime settings and rebuild triggers
//! - Image-based lighting and panorama projection

mod common;

use std::sync::Arc;

use glam::{UVec2, Vec3};
use square::api::{Device, DeviceCall, HeadlessDevice};
use square::errors::SquareError;
use square::renderer::{EngineSettings, RenderEngine};
use square::resources::uniforms::NO_SHADOW;
use square::resources::{
    MaterialLayer, MaterialLibrary, MeshBuilder, Sampler, Texture, TextureFormat, TextureKind,
    UniformValue, programs,
};
use square::scene::{Light, Node, Scene, Transform};

use common::{
    LIT, camera, cube_scene, engine_with, full_library, pass_names, simple_program, window,
};

const EPSILON: f32 = 1e-4;

fn default_engine(device: &mut HeadlessDevice) -> RenderEngine {
    engine_with(device, EngineSettings::default())
}

// ============================================================================
// Pass List
// ============================================================================

#[test]
fn default_pass_list_order() {
    let mut device = HeadlessDevice::new();
    let engine = default_engine(&mut device);
    assert_eq!(
        pass_names(&engine),
        ["Shadow Map #0", "Opaque Scene", "Bloom", "Tonemap"]
    );
}

#[test]
fn rebuild_is_deterministic() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    let first = pass_names(&engine);

    for _ in 0..3 {
        engine.rebuild(&mut device);
        assert_eq!(pass_names(&engine), first);
    }
}

#[test]
fn missing_camera_or_output_leaves_list_empty() {
    let mut device = HeadlessDevice::new();
    let library = full_library();
    let scene = cube_scene(&library);
    let mut engine = RenderEngine::new(library, EngineSettings::default());

    engine.set_scene(&mut device, Some(scene));
    engine.set_output(&mut device, Some(window()));
    assert!(engine.passes().is_empty());

    engine.set_camera(&mut device, Some(camera()));
    assert!(!engine.passes().is_empty());

    engine.set_output(&mut device, None);
    assert!(engine.passes().is_empty());
}

#[test]
fn failed_working_target_leaves_list_empty() {
    let mut device = HeadlessDevice::new().with_unsupported_format(TextureFormat::RGBAFloat);
    let engine = default_engine(&mut device);
    assert!(engine.passes().is_empty());
    assert!(engine.working_target().is_none());
}

#[test]
fn missing_program_drops_only_its_stage() {
    let mut device = HeadlessDevice::new();
    let mut library = MaterialLibrary::new();
    for name in [programs::SHADOW_MAPPING, programs::BLIT, LIT] {
        library.add_program(simple_program(name));
    }
    let scene = cube_scene(&library);
    let mut engine = RenderEngine::new(library, EngineSettings::default());
    engine.set_scene(&mut device, Some(scene));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));

    // No highpass or blur programs: bloom is left out. Tonemap falls back to
    // the plain copy.
    assert_eq!(pass_names(&engine), ["Shadow Map #0", "Opaque Scene", "Tonemap"]);
}

#[test]
fn empty_scene_still_presents() {
    let mut device = HeadlessDevice::new();
    let mut engine = RenderEngine::new(full_library(), EngineSettings::default());
    engine.set_scene(&mut device, Some(Scene::new()));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));

    assert_eq!(pass_names(&engine), ["Opaque Scene", "Bloom", "Tonemap"]);
    engine.update(&mut device, 0.016);
    engine.render(&mut device);
}

#[test]
fn working_target_follows_render_scale() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    assert_eq!(
        engine.working_target().map(|t| t.size()),
        Some(UVec2::new(800, 600))
    );

    engine.set_render_scale(0.5);
    assert!(engine.needs_rebuild());
    engine.update(&mut device, 0.016);
    assert!(!engine.needs_rebuild());
    assert_eq!(
        engine.working_target().map(|t| t.size()),
        Some(UVec2::new(400, 300))
    );
    assert_eq!(engine.camera().map(|c| c.resolution()), Some(UVec2::new(400, 300)));

    engine.set_render_scale(-1.0);
    assert_eq!(engine.render_scale(), 0.5);
    assert!(!engine.needs_rebuild());
}

#[test]
fn replaced_settings_apply_on_next_update() -> anyhow::Result<()> {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);

    let settings = EngineSettings::from_json(
        r#"{ "render_scale": 0.25, "bloom": { "enabled": false }, "tonemapping": false }"#,
    )?;
    engine.set_settings(settings);
    assert!(engine.needs_rebuild());
    assert_eq!(pass_names(&engine).len(), 4);

    engine.update(&mut device, 0.016);
    assert_eq!(pass_names(&engine), ["Shadow Map #0", "Opaque Scene", "Tonemap"]);
    assert_eq!(
        engine.working_target().map(|t| t.size()),
        Some(UVec2::new(200, 150))
    );
    Ok(())
}

#[test]
fn gizmos_are_drawn_last() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.set_gizmos(true);
    engine.update(&mut device, 0.016);
    assert_eq!(pass_names(&engine).last().map(String::as_str), Some("Gizmos"));
}

#[test]
fn wireframe_survives_rebuild() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.set_wireframe(true);
    engine.rebuild(&mut device);

    let opaque = engine
        .passes()
        .iter()
        .find(|p| p.name() == "Opaque Scene")
        .and_then(|p| p.state())
        .unwrap();
    assert!(opaque.wireframe);
}

// ============================================================================
// Shadows
// ============================================================================

#[test]
fn single_sun_gets_one_depth_only_shadow_pass() {
    let mut device = HeadlessDevice::new();
    let engine = default_engine(&mut device);

    let shadow_passes: Vec<_> = engine
        .passes()
        .iter()
        .filter(|p| p.name().starts_with("Shadow Map"))
        .collect();
    assert_eq!(shadow_passes.len(), 1);

    let target = shadow_passes[0].target().unwrap();
    assert!(target.color_attachments().is_empty());
    let depth = target.depth_texture().unwrap();
    assert_eq!(depth.size(), UVec2::splat(1024));
    assert_eq!(depth.format(), TextureFormat::DepthFloat);

    let shadow = &engine.shadows()[0];
    assert_eq!(shadow.index, 0);
    let center = shadow.light_matrix.project_point3(Vec3::ZERO);
    assert!(center.abs_diff_eq(Vec3::ZERO, EPSILON), "{center}");
    let texel = shadow.biased_matrix().project_point3(Vec3::ZERO);
    assert!(texel.abs_diff_eq(Vec3::splat(0.5), EPSILON), "{texel}");
}

#[test]
fn shadow_map_size_comes_from_settings() {
    let mut device = HeadlessDevice::new();
    let settings = EngineSettings::from_json(r#"{ "shadows": { "map_size": 512 } }"#).unwrap();
    let engine = engine_with(&mut device, settings);
    let depth = engine.shadows()[0].target.depth_texture().unwrap();
    assert_eq!(depth.size(), UVec2::splat(512));
}

#[test]
fn disabled_shadows_build_no_shadow_pass() {
    let mut device = HeadlessDevice::new();
    let settings = EngineSettings::from_json(r#"{ "shadows": { "enabled": false } }"#).unwrap();
    let engine = engine_with(&mut device, settings);
    assert!(engine.shadows().is_empty());
    assert!(!pass_names(&engine).iter().any(|n| n.starts_with("Shadow")));
}

#[test]
fn shadow_slots_are_program_defaults() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    let lit = Arc::clone(engine.resources().library().program(LIT).unwrap());

    let map = lit.default_texture("_shadowMaps[0]").unwrap();
    assert!(Arc::ptr_eq(
        &map,
        engine.shadows()[0].target.depth_texture().unwrap()
    ));
    assert!(matches!(
        lit.default_uniform("_shadowMapDim[0]"),
        Some(UniformValue::Vec4(_))
    ));

    // Removing the caster drops its slot on the next rebuild.
    let scene = engine.scene_mut().unwrap();
    let sun = scene.lights().map(|(key, _)| key).next().unwrap();
    scene.remove_light(sun);
    engine.rebuild(&mut device);
    assert!(lit.default_texture("_shadowMaps[0]").is_none());
    assert!(lit.default_uniform("_shadowMapDim[0]").is_none());
}

#[test]
fn shadow_slots_are_capped_at_light_count() {
    let mut device = HeadlessDevice::new();
    let library = full_library();
    let mut scene = cube_scene(&library);
    for i in 0..5 {
        let x = i as f32 * 0.1;
        scene.add_light(Light::directional(Vec3::new(x, -1.0, 0.2), Vec3::ONE, 1.0));
    }
    let mut engine = RenderEngine::new(library, EngineSettings::default());
    engine.set_scene(&mut device, Some(scene));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));

    assert_eq!(engine.shadows().len(), 4);
    let indices: Vec<_> = engine.shadows().iter().map(|s| s.index).collect();
    assert_eq!(indices, [0, 1, 2, 3]);
}

#[test]
fn transparent_geometry_casts_no_shadow() {
    let mut device = HeadlessDevice::new();
    let mut library = full_library();
    library.add_program(simple_program("Glass"));
    let mut scene = cube_scene(&library);
    let glass = library.instantiate("Glass", "Glass").unwrap();
    glass.write().set_layer(MaterialLayer::Transparent);
    scene.add_node(
        Node::with_mesh("Pane", Arc::new(MeshBuilder::cube(1.0)), Arc::clone(&glass))
            .with_transform(Transform::from_position(Vec3::new(0.0, 3.0, 0.0))),
    );

    let mut engine = RenderEngine::new(library, EngineSettings::default());
    engine.set_scene(&mut device, Some(scene));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));
    engine.update(&mut device, 0.016);
    engine.render(&mut device);

    let stats = engine.statistics(&mut device);
    let primitives = |name: &str| stats.iter().find(|(n, _)| n == name).map(|(_, s)| s.primitives);
    assert_eq!(primitives("Shadow Map #0"), Some(12));
    assert_eq!(primitives("Opaque Scene"), Some(24));

    let glass_program = glass.read().program().clone();
    assert!(glass_program.default_texture("_shadowMaps[0]").is_none());
    let lit = engine.resources().library().program(LIT).unwrap();
    assert!(lit.default_texture("_shadowMaps[0]").is_some());
}

#[test]
fn transform_edits_refit_light_matrix_without_rebuild() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.update(&mut device, 0.016);
    let before = engine.shadows()[0].light_matrix;

    let scene = engine.scene_mut().unwrap();
    let cube = scene.drawables()[0];
    scene.node_mut(cube).unwrap().transform.position = Vec3::new(5.0, 0.0, 0.0);
    engine.update(&mut device, 0.016);

    let after = engine.shadows()[0].light_matrix;
    assert_ne!(before, after);
    let center = after.project_point3(Vec3::new(5.0, 0.0, 0.0));
    assert!(center.abs_diff_eq(Vec3::ZERO, EPSILON), "{center}");
    assert!(!engine.needs_rebuild());
}

// ============================================================================
// Uniform Blocks
// ============================================================================

#[test]
fn fifth_light_is_truncated() {
    let mut device = HeadlessDevice::new();
    let mut scene = Scene::new();
    for i in 0..5 {
        scene.add_light(Light::point(Vec3::new(i as f32, 1.0, 0.0), Vec3::ONE, 1.0));
    }
    let mut engine = RenderEngine::new(full_library(), EngineSettings::default());
    engine.set_scene(&mut device, Some(scene));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));
    engine.update(&mut device, 0.016);

    let lights = engine.lights_block().data();
    assert_eq!(lights.count, 4);
    let xs: Vec<f32> = lights.active().iter().map(|l| l.position.x).collect();
    assert_eq!(xs, [0.0, 1.0, 2.0, 3.0]);
    assert!(lights.active().iter().all(|l| l.position.w == 1.0));
    assert!(lights.active().iter().all(|l| l.shadow_index == NO_SHADOW));
}

#[test]
fn lights_block_carries_shadow_slot() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.update(&mut device, 0.016);

    let lights = engine.lights_block().data();
    assert_eq!(lights.count, 1);
    let sun = lights.active()[0];
    assert_eq!(sun.position.w, 0.0);
    assert_eq!(sun.shadow_index, 0);
    assert_eq!(sun.light_matrix, engine.shadows()[0].biased_matrix());
}

#[test]
fn blocks_are_written_only_when_changed() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.update(&mut device, 0.016);
    let writes = |d: &HeadlessDevice| d.count(|c| matches!(c, DeviceCall::UpdateUniformBuffer { .. }));
    assert_eq!(writes(&device), 2);

    engine.update(&mut device, 0.016);
    assert_eq!(writes(&device), 2);

    engine
        .camera_mut()
        .unwrap()
        .look_at(Vec3::new(3.0, 3.0, 3.0), Vec3::ZERO, Vec3::Y);
    engine.update(&mut device, 0.016);
    assert_eq!(writes(&device), 3);
}

// ============================================================================
// Frame
// ============================================================================

#[test]
fn frame_draws_every_pass() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.update(&mut device, 0.016);
    device.clear_calls();
    engine.render(&mut device);

    // shadow + opaque + bloom (highpass, 2 blurs, blend) + tonemap
    assert_eq!(device.draw_count(), 7);

    let stats = engine.statistics(&mut device);
    assert_eq!(stats.len(), 4);
    assert_eq!(stats[0].0, "Shadow Map #0");
    assert_eq!(stats[0].1.primitives, 12);
    assert!(stats.iter().all(|(_, s)| (s.gpu_time_ms - 0.25).abs() < 1e-9));
}

#[test]
fn disabled_pass_is_skipped() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.find_pass_mut("Bloom").unwrap().set_enabled(false);
    device.clear_calls();
    engine.render(&mut device);
    assert_eq!(device.draw_count(), 3);
}

#[test]
fn bloom_threshold_reaches_highpass_once_per_frame() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    engine.set_bloom_threshold(3.0);
    assert!(!engine.needs_rebuild());

    device.clear_calls();
    engine.render(&mut device);
    assert_eq!(device.uniform_uploads("threshold"), vec![UniformValue::Float(3.0)]);
}

#[test]
fn render_drains_device_errors() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);
    device.push_error(0x0502, "invalid operation");
    engine.render(&mut device);
    assert!(device.poll_error().is_none());
}

// ============================================================================
// Image-Based Lighting
// ============================================================================

fn sky() -> Arc<Texture> {
    Arc::new(Texture::new_cubemap(64, TextureFormat::RGBHalf, Sampler::default()).with_name("Sky"))
}

#[test]
fn sky_adds_skybox_and_ibl_maps() {
    let mut device = HeadlessDevice::new();
    let library = full_library();
    let mut scene = cube_scene(&library);
    scene.set_sky(Some(sky()));
    let mut engine = RenderEngine::new(library, EngineSettings::default());
    engine.set_scene(&mut device, Some(scene));
    engine.set_camera(&mut device, Some(camera()));
    engine.set_output(&mut device, Some(window()));

    assert_eq!(
        pass_names(&engine),
        ["Shadow Map #0", "Opaque Scene", "Skybox", "Bloom", "Tonemap"]
    );
    let maps = engine.ibl_maps().unwrap();
    assert_eq!(maps.irradiance.size(), UVec2::splat(32));
    assert_eq!(maps.prefilter.size(), UVec2::splat(128));
    assert_eq!(maps.brdf_lut.size(), UVec2::splat(512));

    let lit = engine.resources().library().program(LIT).unwrap();
    assert!(lit.default_texture("irradianceMap").is_some());
    assert!(lit.default_texture("brdfLUT").is_some());

    // The maps are reused while the sky is unchanged.
    let cubemaps = |d: &HeadlessDevice| {
        d.count(|c| {
            matches!(
                c,
                DeviceCall::CreateTexture {
                    kind: TextureKind::Cubemap,
                    ..
                }
            )
        })
    };
    let created = cubemaps(&device);
    engine.rebuild(&mut device);
    assert_eq!(cubemaps(&device), created);
}

#[test]
fn panorama_projection_requires_two_to_one() {
    let mut device = HeadlessDevice::new();
    let mut engine = default_engine(&mut device);

    let panorama = Arc::new(Texture::new_2d(256, 128, TextureFormat::RGBHalf, Sampler::default()));
    let cubemap = engine
        .project_equirectangular_to_cubemap(&mut device, &panorama, 64)
        .unwrap();
    assert_eq!(cubemap.kind(), TextureKind::Cubemap);
    assert_eq!(cubemap.size(), UVec2::splat(64));

    let square_map = Arc::new(Texture::new_2d(128, 128, TextureFormat::RGBHalf, Sampler::default()));
    assert!(matches!(
        engine.project_equirectangular_to_cubemap(&mut device, &square_map, 64),
        Err(SquareError::InvalidArgument(_))
    ));
}
