//! The `Device` seam.
//!
//! A [`Device`] is the only object that talks to the GPU API. It is passed
//! explicitly (`&mut dyn Device`) to every component that creates resources
//! or issues commands, and it must only be used from the thread that owns
//! the context.
//!
//! The trait is deliberately low level: fixed-function state setters map
//! one-to-one onto device calls so the [`Renderer`](crate::renderer::Renderer)
//! can diff state and issue only what changed.

use bitflags::bitflags;
use glam::{UVec2, Vec2, Vec4};
use smallvec::SmallVec;

use crate::api::handle::{Handle, SharedResource};
use crate::errors::Result;
use crate::renderer::state::{BlendFactor, CullMode, DepthTest, Topology};
use crate::resources::geometry::VertexAttributes;
use crate::resources::material::UniformValue;
use crate::resources::render_target::DepthFormat;
use crate::resources::shader::ShaderStages;
use crate::resources::texture::{TextureData, TextureDescriptor, TextureFilter, TextureFormat, TextureKind};

bitflags! {
    /// Framebuffer planes addressed by clears and blits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferMask: u8 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Location of a uniform inside a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

/// Vertex and index data of one geometry.
#[derive(Debug, Clone, Copy)]
pub struct GeometryUpload<'a> {
    pub vertices: &'a [u8],
    pub vertex_count: u32,
    pub stride: u32,
    pub attributes: VertexAttributes,
    pub indices: Option<&'a [u32]>,
    pub dynamic: bool,
}

/// A texture level bound as a color attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBinding {
    pub texture: Handle,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub level: u32,
}

/// Where the depth (and stencil) plane of a framebuffer lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthBinding {
    Buffer { handle: Handle, format: DepthFormat },
    Texture { handle: Handle, kind: TextureKind, format: TextureFormat },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramebufferDescriptor {
    pub colors: SmallVec<[ColorBinding; 4]>,
    pub depth: Option<DepthBinding>,
}

/// An error drained from the device error queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub code: u32,
    pub message: String,
}

/// Abstract GPU device.
///
/// Creation methods return an owning [`SharedResource`]; on failure nothing
/// stays alive on the device.
pub trait Device {
    // ─── Resource creation ───────────────────────────────────────────────

    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> Result<SharedResource>;

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &TextureData,
    ) -> Result<SharedResource>;

    fn create_depth_buffer(
        &mut self,
        format: DepthFormat,
        size: UVec2,
    ) -> Result<SharedResource>;

    fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Result<SharedResource>;

    fn create_uniform_buffer(&mut self, binding: u32, size: usize) -> Result<SharedResource>;

    fn compile_shader(&mut self, stage: ShaderStages, source: &str) -> Result<SharedResource>;

    fn link_program(&mut self, shaders: &[Handle]) -> Result<SharedResource>;

    fn create_timer_query(&mut self) -> Result<SharedResource>;

    /// Deletes every object whose owner was dropped since the last call.
    fn collect_garbage(&mut self);

    // ─── Program interface ───────────────────────────────────────────────

    fn uniform_location(&mut self, program: Handle, name: &str) -> Option<UniformLocation>;

    /// Connects a named uniform block of `program` to a binding point.
    fn bind_uniform_block(&mut self, program: Handle, name: &str, binding: u32) -> bool;

    fn use_program(&mut self, program: Option<Handle>);

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    fn bind_texture(&mut self, unit: u32, kind: TextureKind, texture: Option<Handle>);

    fn update_uniform_buffer(&mut self, buffer: Handle, data: &[u8]);

    fn generate_mipmaps(&mut self, kind: TextureKind, texture: Handle);

    // ─── Fixed-function state ────────────────────────────────────────────

    fn set_polygon_mode(&mut self, wireframe: bool);

    fn set_color_mask(&mut self, enabled: bool);

    fn set_depth_mask(&mut self, enabled: bool);

    fn set_clear_color(&mut self, color: Vec4);

    fn set_clear_depth(&mut self, depth: f32);

    /// `None` disables blending.
    fn set_blend(&mut self, factors: Option<(BlendFactor, BlendFactor)>);

    /// `None` disables polygon offset; otherwise (factor, units).
    fn set_depth_offset(&mut self, offset: Option<Vec2>);

    fn set_depth_test(&mut self, test: DepthTest);

    fn set_cull_mode(&mut self, mode: CullMode);

    fn set_seamless_cubemap(&mut self, enabled: bool);

    /// Color attachments written by fragment output; empty writes none.
    fn set_draw_buffers(&mut self, attachments: &[u32]);

    fn clear(&mut self, mask: BufferMask);

    // ─── Targets & draws ─────────────────────────────────────────────────

    fn bind_framebuffer(&mut self, framebuffer: Handle, viewport: UVec2);

    fn bind_geometry(&mut self, geometry: Option<Handle>);

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32);

    fn draw_indexed(&mut self, topology: Topology, count: u32);

    fn blit_framebuffer(
        &mut self,
        source: (Handle, UVec2),
        destination: (Handle, UVec2),
        mask: BufferMask,
        filter: TextureFilter,
    );

    // ─── Timing & errors ─────────────────────────────────────────────────

    fn begin_timer(&mut self, query: Handle);

    fn end_timer(&mut self, query: Handle);

    /// Blocks until the query result is available.
    fn timer_result_ns(&mut self, query: Handle) -> Option<u64>;

    /// Pops the oldest queued device error.
    fn poll_error(&mut self) -> Option<DeviceError>;
}

/// Drains the device error queue, logging each entry with the caller's
/// location. Returns `true` when no error was pending.
#[track_caller]
pub fn check_errors(device: &mut dyn Device) -> bool {
    let location = std::panic::Location::caller();
    let mut clean = true;
    while let Some(error) = device.poll_error() {
        clean = false;
        log::error!(
            "Device error 0x{:04X} at {}:{}: {}",
            error.code,
            location.file(),
            location.line(),
            error.message
        );
    }
    clean
}
