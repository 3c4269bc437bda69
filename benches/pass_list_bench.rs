//! Pass-list construction and frame submission against the headless device.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use glam::{UVec2, Vec3};
use square::renderer::EngineSettings;
use square::resources::{MaterialLibrary, MeshBuilder, RenderTarget, ShaderProgram, ShaderStages, programs};
use square::scene::{Camera, Light, Node, Scene, Transform};
use square::utils::Timer;
use square::{HeadlessDevice, RenderEngine};

fn library() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    for name in [
        programs::SHADOW_MAPPING,
        programs::HIGHPASS_FILTER,
        programs::VERTICAL_BLUR,
        programs::HORIZONTAL_BLUR,
        programs::BLIT,
        programs::TONEMAPPING,
        "Lit",
    ] {
        library.add_program(
            ShaderProgram::new(name)
                .with_source(ShaderStages::VERTEX, "void main() {}")
                .with_source(ShaderStages::FRAGMENT, "void main() {}"),
        );
    }
    library
}

/// A `side`² grid of cubes lit by two suns.
fn grid_scene(library: &MaterialLibrary, side: u32) -> Scene {
    let mut scene = Scene::new();
    let cube = Arc::new(MeshBuilder::cube(1.0));
    for i in 0..side * side {
        let position = Vec3::new((i % side) as f32 * 2.0, 0.0, (i / side) as f32 * 2.0);
        let Ok(material) = library.instantiate("Lit", &format!("Cube {i}")) else {
            continue;
        };
        scene.add_node(
            Node::with_mesh(format!("Cube {i}"), Arc::clone(&cube), material)
                .with_transform(Transform::from_position(position)),
        );
    }
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.2), Vec3::ONE, 1.0));
    scene.add_light(Light::directional(Vec3::new(0.5, -1.0, 0.1), Vec3::ONE, 0.5));
    scene
}

fn engine(device: &mut HeadlessDevice, side: u32) -> RenderEngine {
    let library = library();
    let scene = grid_scene(&library, side);
    let mut camera = Camera::new_perspective(60.0, UVec2::new(1280, 720), 0.1, 500.0);
    camera.look_at(Vec3::new(0.0, 20.0, -20.0), Vec3::ZERO, Vec3::Y);

    let mut engine = RenderEngine::new(library, EngineSettings::default());
    engine.set_scene(device, Some(scene));
    engine.set_camera(device, Some(camera));
    engine.set_output(device, Some(Arc::new(RenderTarget::default_framebuffer(1280, 720))));
    engine
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pass List");

    for side in [4, 16] {
        let mut device = HeadlessDevice::new();
        let mut engine = engine(&mut device, side);
        group.bench_function(format!("rebuild {} drawables", side * side), |b| {
            b.iter(|| {
                engine.rebuild(&mut device);
                device.clear_calls();
                black_box(engine.passes().len());
            });
        });
    }

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame");

    for side in [4, 16] {
        let mut device = HeadlessDevice::new();
        let mut engine = engine(&mut device, side);
        let mut clock = Timer::new();
        group.bench_function(format!("update + render {} drawables", side * side), |b| {
            b.iter(|| {
                clock.tick();
                engine.update(&mut device, clock.dt_seconds());
                engine.render(&mut device);
                black_box(device.draw_count());
                device.clear_calls();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_rebuild, bench_frame);
criterion_main!(benches);
