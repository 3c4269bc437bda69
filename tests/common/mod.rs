//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use square::renderer::EngineSettings;
use square::resources::{
    MaterialLibrary, MeshBuilder, RenderTarget, SharedMaterial, ShaderProgram, ShaderStages,
    programs,
};
use square::scene::{Camera, Light, Node, Scene};
use square::{HeadlessDevice, RenderEngine};

use glam::{UVec2, Vec3};

pub const LIT: &str = "Lit";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Vertex + fragment program with placeholder sources.
pub fn simple_program(name: &str) -> ShaderProgram {
    ShaderProgram::new(name)
        .with_source(ShaderStages::VERTEX, "void main() {}")
        .with_source(ShaderStages::FRAGMENT, "void main() {}")
}

/// Every engine-internal program plus one scene program, [`LIT`].
pub fn full_library() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    for name in [
        programs::SHADOW_MAPPING,
        programs::SKYBOX,
        programs::GIZMO,
        programs::HIGHPASS_FILTER,
        programs::VERTICAL_BLUR,
        programs::HORIZONTAL_BLUR,
        programs::BLIT,
        programs::TONEMAPPING,
        programs::IBL_DIFFUSE,
        programs::IBL_SPECULAR,
        programs::INTEGRATED_BRDF,
        programs::PROJECT_EQR_TO_CUBE,
        LIT,
    ] {
        library.add_program(simple_program(name));
    }
    library
}

pub fn lit_material(library: &MaterialLibrary, name: &str) -> SharedMaterial {
    library.instantiate(LIT, name).unwrap()
}

/// One 2x2x2 cube at the origin (bounds [-1, 1]³) and one sun.
pub fn cube_scene(library: &MaterialLibrary) -> Scene {
    let mut scene = Scene::new();
    scene.add_node(Node::with_mesh(
        "Cube",
        Arc::new(MeshBuilder::cube(2.0)),
        lit_material(library, "Cube"),
    ));
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 1.0));
    scene
}

pub fn camera() -> Camera {
    let mut camera = Camera::new_perspective(60.0, UVec2::new(800, 600), 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);
    camera
}

pub fn window() -> Arc<RenderTarget> {
    Arc::new(RenderTarget::default_framebuffer(800, 600))
}

/// Engine with [`cube_scene`], a camera and the default framebuffer.
pub fn engine_with(device: &mut HeadlessDevice, settings: EngineSettings) -> RenderEngine {
    init_logging();
    let library = full_library();
    let scene = cube_scene(&library);
    let mut engine = RenderEngine::new(library, settings);
    engine.set_scene(device, Some(scene));
    engine.set_camera(device, Some(camera()));
    engine.set_output(device, Some(window()));
    engine
}

pub fn pass_names(engine: &RenderEngine) -> Vec<String> {
    engine.passes().iter().map(|p| p.name().to_owned()).collect()
}
