//! Resource Lifecycle Tests
//!
//! Tests for:
//! - Render target validation (no attachments, zero extent)
//! - Shader stage whitelist checked before any device call
//! - Idempotent allocation
//! - Release of partially created objects on failure
//! - Deferred release through the device garbage queue

mod common;

use std::sync::Arc;

use square::api::{Allocate, Device, DeviceCall, Failures, HeadlessDevice, ResourceKind};
use square::errors::SquareError;
use square::resources::shader::is_valid_combination;
use square::resources::{
    DepthAttachment, DepthFormat, MeshBuilder, RenderTarget, Sampler, ShaderProgram,
    ShaderStages, Texture, TextureFormat,
};

use common::simple_program;

fn color_texture(size: u32) -> Arc<Texture> {
    Arc::new(Texture::new_2d(size, size, TextureFormat::RGBA, Sampler::screen()))
}

// ============================================================================
// Render Targets
// ============================================================================

#[test]
fn target_without_attachments_fails() {
    let mut device = HeadlessDevice::new();
    let target = RenderTarget::new(Vec::new(), None);

    let result = target.allocate(&mut device);
    assert!(matches!(result, Err(SquareError::InvalidRenderTarget(_))));
    assert!(!target.is_linked());
    assert_eq!(device.live_count(ResourceKind::Framebuffer), 0);
}

#[test]
fn zero_sized_depth_only_target_fails() {
    let mut device = HeadlessDevice::new();
    let target = RenderTarget::new(Vec::new(), Some(DepthAttachment::Buffer(DepthFormat::Depth24)));

    assert!(target.allocate(&mut device).is_err());
    assert_eq!(device.live_count(ResourceKind::DepthBuffer), 0);
}

#[test]
fn failed_framebuffer_releases_its_depth_buffer() {
    let mut device = HeadlessDevice::new();
    device.fail(Failures::FRAMEBUFFER);
    let target = RenderTarget::color(color_texture(64), Some(DepthFormat::Depth24Stencil8));

    assert!(target.allocate(&mut device).is_err());
    assert!(!target.is_linked());
    assert_eq!(device.pending_releases(), 1);

    device.collect_garbage();
    assert_eq!(device.live_count(ResourceKind::DepthBuffer), 0);
    // The color texture belongs to its own description and stays linked.
    assert_eq!(device.live_count(ResourceKind::Texture), 1);

    device.heal(Failures::FRAMEBUFFER);
    target.allocate(&mut device).unwrap();
    assert!(target.is_linked());
    assert_eq!(device.live_count(ResourceKind::DepthBuffer), 1);
}

#[test]
fn depth_texture_cannot_be_a_color_attachment() {
    let mut device = HeadlessDevice::new();
    let depth = Arc::new(Texture::new_2d(
        32,
        32,
        TextureFormat::DepthFloat,
        Sampler::shadow_map(),
    ));
    let target = RenderTarget::new(vec![depth], None);
    assert!(matches!(
        target.allocate(&mut device),
        Err(SquareError::InvalidRenderTarget(_))
    ));
}

#[test]
fn unsupported_format_is_reported() {
    let mut device = HeadlessDevice::new().with_unsupported_format(TextureFormat::RGBAFloat);
    let texture = Texture::new_2d(4, 4, TextureFormat::RGBAFloat, Sampler::default());
    assert!(matches!(
        texture.allocate(&mut device),
        Err(SquareError::UnsupportedFormat(TextureFormat::RGBAFloat))
    ));
}

// ============================================================================
// Shader Programs
// ============================================================================

#[test]
fn every_invalid_stage_set_fails_before_device_calls() {
    for bits in 0..(1u8 << 6) {
        let stages = ShaderStages::from_bits_truncate(bits);
        if is_valid_combination(stages) {
            continue;
        }
        let mut device = HeadlessDevice::new();
        let mut program = ShaderProgram::new(format!("Invalid {bits:#04x}"));
        for stage in stages.iter() {
            program = program.with_source(stage, "void main() {}");
        }

        let err = program.allocate(&mut device).unwrap_err();
        assert!(
            matches!(err, SquareError::InvalidShaderCombination { .. }),
            "{stages:?}: {err}"
        );
        assert_eq!(err.to_string(), "Invalid shader combination.");
        assert_eq!(device.count(|c| matches!(c, DeviceCall::CompileShader(_))), 0);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::LinkProgram { .. })), 0);
    }
}

#[test]
fn valid_stage_sets_link() {
    let mut device = HeadlessDevice::new();
    let tessellated = ShaderProgram::new("Tessellated")
        .with_source(ShaderStages::VERTEX, "v")
        .with_source(ShaderStages::TESS_CONTROL, "tc")
        .with_source(ShaderStages::TESS_EVALUATION, "te")
        .with_source(ShaderStages::FRAGMENT, "f");
    tessellated.allocate(&mut device).unwrap();
    assert!(tessellated.has_tessellation());

    let compute = ShaderProgram::new("Compute").with_source(ShaderStages::COMPUTE, "c");
    compute.allocate(&mut device).unwrap();
    assert_eq!(device.live_count(ResourceKind::Program), 2);
}

#[test]
fn compile_failure_names_the_stage() {
    let mut device = HeadlessDevice::new();
    let program = ShaderProgram::new("Broken")
        .with_source(ShaderStages::VERTEX, "void main() {}")
        .with_source(ShaderStages::FRAGMENT, "   ");

    match program.allocate(&mut device) {
        Err(SquareError::ShaderCompile { program, stage, .. }) => {
            assert_eq!(program, "Broken");
            assert_eq!(stage, ShaderStages::FRAGMENT);
        }
        other => panic!("expected a compile error, got {other:?}"),
    }
    assert_eq!(device.count(|c| matches!(c, DeviceCall::LinkProgram { .. })), 0);

    // The vertex stage compiled before the failure is released.
    device.collect_garbage();
    assert_eq!(device.live_count(ResourceKind::Shader), 0);
}

#[test]
fn stage_objects_are_released_after_linking() {
    let mut device = HeadlessDevice::new();
    let program = simple_program("Plain");
    program.allocate(&mut device).unwrap();

    device.collect_garbage();
    assert_eq!(device.live_count(ResourceKind::Shader), 0);
    assert_eq!(device.live_count(ResourceKind::Program), 1);
}

// ============================================================================
// Idempotence & Release
// ============================================================================

#[test]
fn allocate_twice_creates_one_resource() {
    let mut device = HeadlessDevice::new();

    let texture = color_texture(16);
    texture.allocate(&mut device).unwrap();
    texture.allocate(&mut device).unwrap();
    assert_eq!(device.count(|c| matches!(c, DeviceCall::CreateTexture { .. })), 1);

    let geometry = MeshBuilder::cube(1.0);
    geometry.allocate(&mut device).unwrap();
    geometry.allocate(&mut device).unwrap();
    assert_eq!(device.live_count(ResourceKind::Geometry), 1);

    let target = RenderTarget::color(Arc::clone(&texture), Some(DepthFormat::Depth24));
    target.allocate(&mut device).unwrap();
    let handle = target.handle();
    target.allocate(&mut device).unwrap();
    assert_eq!(target.handle(), handle);
    assert_eq!(device.live_count(ResourceKind::Framebuffer), 1);
    assert_eq!(device.live_count(ResourceKind::Texture), 1);

    let program = simple_program("Twice");
    program.allocate(&mut device).unwrap();
    program.allocate(&mut device).unwrap();
    assert_eq!(device.count(|c| matches!(c, DeviceCall::LinkProgram { .. })), 1);
}

#[test]
fn dropping_a_description_releases_on_next_collection() {
    let mut device = HeadlessDevice::new();
    let target = RenderTarget::color(color_texture(8), Some(DepthFormat::Depth16));
    target.allocate(&mut device).unwrap();
    assert_eq!(device.live_count(ResourceKind::Framebuffer), 1);

    drop(target);
    // Nothing is deleted before the device collects.
    assert_eq!(device.live_count(ResourceKind::Framebuffer), 1);
    device.collect_garbage();
    assert_eq!(device.live_count(ResourceKind::Framebuffer), 0);
    assert_eq!(device.live_count(ResourceKind::DepthBuffer), 0);
    assert_eq!(device.live_count(ResourceKind::Texture), 0);
}

#[test]
fn default_framebuffer_is_never_released() {
    let mut device = HeadlessDevice::new();
    let window = RenderTarget::default_framebuffer(640, 480);
    window.allocate(&mut device).unwrap();
    drop(window);
    device.collect_garbage();
    assert_eq!(device.count(|c| matches!(c, DeviceCall::Release(..))), 0);
}
