//! Debug line overlays: world axes, light markers and scene bounds.

use std::sync::Arc;

use glam::Vec3;

use crate::api::{Allocate, Device};
use crate::errors::Result;
use crate::renderer::drawable::{Drawable, Primitive};
use crate::renderer::passes::GeometryPass;
use crate::renderer::resource_manager::ResourceManager;
use crate::renderer::state::RendererState;
use crate::resources::geometry::BoundingBox;
use crate::resources::material_library::programs;
use crate::resources::primitives::{LineSegment, MeshBuilder};
use crate::resources::render_target::RenderTarget;
use crate::scene::Scene;
use crate::scene::light::LightKind;

pub const AXIS_LENGTH: f32 = 10.0;
pub const POINT_LIGHT_SIZE: f32 = 0.05;
pub const DIRECTIONAL_LIGHT_LENGTH: f32 = 0.8;

const BOUNDS_COLOR: Vec3 = Vec3::new(1.0, 1.0, 0.0);

/// X red, Y green, Z blue.
#[must_use]
pub fn axis_segments(length: f32) -> Vec<LineSegment> {
    vec![
        LineSegment::new(Vec3::ZERO, Vec3::X * length, Vec3::X),
        LineSegment::new(Vec3::ZERO, Vec3::Y * length, Vec3::Y),
        LineSegment::new(Vec3::ZERO, Vec3::Z * length, Vec3::Z),
    ]
}

/// One marker per light, in the light's color.
///
/// Point lights get a small three-axis cross. Directional lights get a stroke
/// from `-direction` toward the origin.
#[must_use]
pub fn light_segments(scene: &Scene) -> Vec<LineSegment> {
    let mut segments = Vec::new();
    for (_, light) in scene.lights() {
        match light.kind {
            LightKind::Point { position } => {
                for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                    let offset = axis * POINT_LIGHT_SIZE;
                    segments.push(LineSegment::new(
                        position - offset,
                        position + offset,
                        light.color,
                    ));
                }
            }
            LightKind::Directional { direction } => {
                let start = -direction;
                segments.push(LineSegment::new(
                    start,
                    start + direction * DIRECTIONAL_LIGHT_LENGTH,
                    light.color,
                ));
            }
        }
    }
    segments
}

/// The twelve edges of `bounds`.
#[must_use]
pub fn bounds_segments(bounds: &BoundingBox) -> Vec<LineSegment> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let (min, max) = (bounds.min, bounds.max);
    let corner = |x: bool, y: bool, z: bool| {
        Vec3::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };

    let mut segments = Vec::with_capacity(12);
    for a in [false, true] {
        for b in [false, true] {
            segments.push(LineSegment::new(corner(false, a, b), corner(true, a, b), BOUNDS_COLOR));
            segments.push(LineSegment::new(corner(a, false, b), corner(a, true, b), BOUNDS_COLOR));
            segments.push(LineSegment::new(corner(a, b, false), corner(a, b, true), BOUNDS_COLOR));
        }
    }
    segments
}

/// Line pass drawn over `output` without touching its depth.
pub fn setup_gizmos(
    device: &mut dyn Device,
    resources: &ResourceManager,
    scene: Option<&Scene>,
    output: Arc<RenderTarget>,
    draw_bounds: bool,
) -> Result<GeometryPass> {
    let mut segments = axis_segments(AXIS_LENGTH);
    if let Some(scene) = scene {
        segments.extend(light_segments(scene));
        if draw_bounds {
            segments.extend(bounds_segments(&scene.scene_bounds()));
        }
    }

    let geometry = Arc::new(MeshBuilder::lines(&segments).with_name("Gizmos"));
    geometry.allocate(device)?;
    let material = resources.instantiate(programs::GIZMO, "Gizmos")?;

    let drawables: Vec<Arc<dyn Drawable>> = vec![Arc::new(Primitive::new(geometry, material))];
    Ok(GeometryPass::new(
        "Gizmos",
        output,
        RendererState::overlay_lines(),
        drawables,
    ))
}
