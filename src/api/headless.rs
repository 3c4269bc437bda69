//! In-process recording device.
//!
//! [`HeadlessDevice`] implements [`Device`] without a GPU. It hands out
//! handles, validates what a real driver would reject (empty or mismatched
//! framebuffer attachments, unsupported formats, broken stage sets), keeps a
//! log of every call and counts live objects per [`ResourceKind`]. Tests use
//! [`Failures`] to make individual creation paths fail.

use std::collections::VecDeque;

use bitflags::bitflags;
use glam::{UVec2, Vec2, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::api::device::{
    BufferMask, DepthBinding, Device, DeviceError, FramebufferDescriptor, GeometryUpload,
    UniformLocation,
};
use crate::api::handle::{Handle, ReleaseQueue, ResourceKind, SharedResource};
use crate::errors::{Result, SquareError};
use crate::renderer::state::{BlendFactor, CullMode, DepthTest, Topology};
use crate::resources::material::UniformValue;
use crate::resources::render_target::DepthFormat;
use crate::resources::shader::ShaderStages;
use crate::resources::texture::{
    TextureData, TextureDescriptor, TextureFilter, TextureFormat, TextureKind,
};

bitflags! {
    /// Creation paths forced to fail.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Failures: u16 {
        const GEOMETRY       = 1 << 0;
        const TEXTURE        = 1 << 1;
        const DEPTH_BUFFER   = 1 << 2;
        const FRAMEBUFFER    = 1 << 3;
        const UNIFORM_BUFFER = 1 << 4;
        const COMPILE        = 1 << 5;
        const LINK           = 1 << 6;
        const TIMER_QUERY    = 1 << 7;
    }
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateGeometry { handle: Handle, vertex_count: u32, index_count: u32 },
    CreateTexture { handle: Handle, kind: TextureKind, format: TextureFormat, size: UVec2 },
    CreateDepthBuffer { handle: Handle, format: DepthFormat, size: UVec2 },
    CreateFramebuffer { handle: Handle, colors: usize, depth: bool },
    CreateUniformBuffer { handle: Handle, binding: u32, size: usize },
    CompileShader(ShaderStages),
    LinkProgram { shaders: usize },
    CreateTimerQuery,
    Release(ResourceKind, Handle),

    BindUniformBlock { program: Handle, name: String, binding: u32 },
    UseProgram(Option<Handle>),
    SetUniform { name: String, value: UniformValue },
    BindTexture { unit: u32, texture: Option<Handle> },
    UpdateUniformBuffer { buffer: Handle, size: usize },
    GenerateMipmaps(Handle),

    SetPolygonMode(bool),
    SetColorMask(bool),
    SetDepthMask(bool),
    SetClearColor(Vec4),
    SetClearDepth(f32),
    SetBlend(Option<(BlendFactor, BlendFactor)>),
    SetDepthOffset(Option<Vec2>),
    SetDepthTest(DepthTest),
    SetCullMode(CullMode),
    SetSeamlessCubemap(bool),
    SetDrawBuffers(Vec<u32>),
    Clear(BufferMask),

    BindFramebuffer { framebuffer: Handle, viewport: UVec2 },
    BindGeometry(Option<Handle>),
    DrawArrays { topology: Topology, first: u32, count: u32 },
    DrawIndexed { topology: Topology, count: u32 },
    Blit { source: Handle, destination: Handle, mask: BufferMask, filter: TextureFilter },

    BeginTimer(Handle),
    EndTimer(Handle),
}

impl DeviceCall {
    /// Fixed-function state setters, the calls the renderer diffs.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            Self::SetPolygonMode(_)
                | Self::SetColorMask(_)
                | Self::SetDepthMask(_)
                | Self::SetClearColor(_)
                | Self::SetClearDepth(_)
                | Self::SetBlend(_)
                | Self::SetDepthOffset(_)
                | Self::SetDepthTest(_)
                | Self::SetCullMode(_)
                | Self::SetSeamlessCubemap(_)
                | Self::SetDrawBuffers(_)
        )
    }

    #[must_use]
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawIndexed { .. })
    }
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_handle: u32,
    next_location: i32,
    releases: ReleaseQueue,
    calls: Vec<DeviceCall>,
    live: FxHashMap<ResourceKind, usize>,
    failures: Failures,
    unsupported: FxHashSet<TextureFormat>,
    shaders: FxHashSet<Handle>,
    textures: FxHashMap<Handle, TextureDescriptor>,
    locations: FxHashMap<(Handle, String), UniformLocation>,
    location_names: FxHashMap<UniformLocation, String>,
    errors: VecDeque<DeviceError>,
    timer_ns: u64,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_location: 0,
            releases: ReleaseQueue::new(),
            calls: Vec::new(),
            live: FxHashMap::default(),
            failures: Failures::empty(),
            unsupported: FxHashSet::default(),
            shaders: FxHashSet::default(),
            textures: FxHashMap::default(),
            locations: FxHashMap::default(),
            location_names: FxHashMap::default(),
            errors: VecDeque::new(),
            timer_ns: 250_000,
        }
    }

    /// Rejects textures of `format` from now on.
    #[must_use]
    pub fn with_unsupported_format(mut self, format: TextureFormat) -> Self {
        self.unsupported.insert(format);
        self
    }

    /// Elapsed time every timer query reports.
    #[must_use]
    pub fn with_timer_ns(mut self, ns: u64) -> Self {
        self.timer_ns = ns;
        self
    }

    pub fn fail(&mut self, failures: Failures) {
        self.failures |= failures;
    }

    pub fn heal(&mut self, failures: Failures) {
        self.failures -= failures;
    }

    /// Queues an error for the next [`check_errors`](crate::api::check_errors).
    pub fn push_error(&mut self, code: u32, message: impl Into<String>) {
        self.errors.push_back(DeviceError {
            code,
            message: message.into(),
        });
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    #[must_use]
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    #[must_use]
    pub fn state_change_count(&self) -> usize {
        self.count(DeviceCall::is_state_change)
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.count(DeviceCall::is_draw)
    }

    /// Values uploaded to uniforms called `name`, in call order.
    #[must_use]
    pub fn uniform_uploads(&self, name: &str) -> Vec<UniformValue> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetUniform { name: n, value } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Objects of `kind` created and not yet collected.
    #[must_use]
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        self.live.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn pending_releases(&self) -> usize {
        self.releases.pending()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn create(&mut self, kind: ResourceKind) -> SharedResource {
        let handle = Handle::new(self.next_handle);
        self.next_handle += 1;
        *self.live.entry(kind).or_default() += 1;
        self.releases.track(kind, handle)
    }

    fn check(&self, flag: Failures, kind: ResourceKind) -> Result<()> {
        if self.failures.contains(flag) {
            return Err(SquareError::allocation(kind, "injected failure"));
        }
        Ok(())
    }

    fn validate_framebuffer(&self, descriptor: &FramebufferDescriptor) -> Result<()> {
        if descriptor.colors.is_empty() && descriptor.depth.is_none() {
            return Err(SquareError::InvalidRenderTarget(
                "framebuffer has no attachments".into(),
            ));
        }
        for color in &descriptor.colors {
            if color.format.is_depth() {
                return Err(SquareError::InvalidRenderTarget(format!(
                    "{:?} cannot be a color attachment",
                    color.format
                )));
            }
            if !self.textures.contains_key(&color.texture) {
                return Err(SquareError::InvalidRenderTarget(format!(
                    "color attachment {:?} is not a live texture",
                    color.texture
                )));
            }
        }
        if let Some(DepthBinding::Texture { format, .. }) = descriptor.depth
            && !format.is_depth()
        {
            return Err(SquareError::InvalidRenderTarget(format!(
                "{format:?} cannot be a depth attachment"
            )));
        }
        Ok(())
    }
}

impl Device for HeadlessDevice {
    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> Result<SharedResource> {
        self.check(Failures::GEOMETRY, ResourceKind::Geometry)?;
        if upload.vertex_count == 0 {
            return Err(SquareError::allocation(ResourceKind::Geometry, "no vertices"));
        }
        let resource = self.create(ResourceKind::Geometry);
        self.calls.push(DeviceCall::CreateGeometry {
            handle: resource.handle(),
            vertex_count: upload.vertex_count,
            index_count: upload.indices.map_or(0, |i| i.len() as u32),
        });
        Ok(resource)
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &TextureData,
    ) -> Result<SharedResource> {
        self.check(Failures::TEXTURE, ResourceKind::Texture)?;
        if self.unsupported.contains(&descriptor.format) {
            return Err(SquareError::UnsupportedFormat(descriptor.format));
        }
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(SquareError::allocation(ResourceKind::Texture, "zero extent"));
        }
        if let TextureData::Faces(faces) = data
            && faces.len() != 6
        {
            return Err(SquareError::allocation(
                ResourceKind::Texture,
                format!("cubemap needs 6 faces, got {}", faces.len()),
            ));
        }
        let resource = self.create(ResourceKind::Texture);
        self.textures.insert(resource.handle(), *descriptor);
        self.calls.push(DeviceCall::CreateTexture {
            handle: resource.handle(),
            kind: descriptor.kind,
            format: descriptor.format,
            size: UVec2::new(descriptor.width, descriptor.height),
        });
        Ok(resource)
    }

    fn create_depth_buffer(&mut self, format: DepthFormat, size: UVec2) -> Result<SharedResource> {
        self.check(Failures::DEPTH_BUFFER, ResourceKind::DepthBuffer)?;
        let resource = self.create(ResourceKind::DepthBuffer);
        self.calls.push(DeviceCall::CreateDepthBuffer {
            handle: resource.handle(),
            format,
            size,
        });
        Ok(resource)
    }

    fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Result<SharedResource> {
        self.check(Failures::FRAMEBUFFER, ResourceKind::Framebuffer)?;
        self.validate_framebuffer(descriptor)?;
        let resource = self.create(ResourceKind::Framebuffer);
        self.calls.push(DeviceCall::CreateFramebuffer {
            handle: resource.handle(),
            colors: descriptor.colors.len(),
            depth: descriptor.depth.is_some(),
        });
        Ok(resource)
    }

    fn create_uniform_buffer(&mut self, binding: u32, size: usize) -> Result<SharedResource> {
        self.check(Failures::UNIFORM_BUFFER, ResourceKind::UniformBuffer)?;
        let resource = self.create(ResourceKind::UniformBuffer);
        self.calls.push(DeviceCall::CreateUniformBuffer {
            handle: resource.handle(),
            binding,
            size,
        });
        Ok(resource)
    }

    fn compile_shader(&mut self, stage: ShaderStages, source: &str) -> Result<SharedResource> {
        self.calls.push(DeviceCall::CompileShader(stage));
        self.check(Failures::COMPILE, ResourceKind::Shader)?;
        if source.trim().is_empty() {
            return Err(SquareError::allocation(ResourceKind::Shader, "empty source"));
        }
        let resource = self.create(ResourceKind::Shader);
        self.shaders.insert(resource.handle());
        Ok(resource)
    }

    fn link_program(&mut self, shaders: &[Handle]) -> Result<SharedResource> {
        self.calls.push(DeviceCall::LinkProgram {
            shaders: shaders.len(),
        });
        self.check(Failures::LINK, ResourceKind::Program)?;
        if shaders.is_empty() || shaders.iter().any(|s| !self.shaders.contains(s)) {
            return Err(SquareError::allocation(
                ResourceKind::Program,
                "attached object is not a compiled shader",
            ));
        }
        Ok(self.create(ResourceKind::Program))
    }

    fn create_timer_query(&mut self) -> Result<SharedResource> {
        self.check(Failures::TIMER_QUERY, ResourceKind::TimerQuery)?;
        self.calls.push(DeviceCall::CreateTimerQuery);
        Ok(self.create(ResourceKind::TimerQuery))
    }

    fn collect_garbage(&mut self) {
        let released: Vec<_> = self.releases.drain().collect();
        for (kind, handle) in released {
            if let Some(count) = self.live.get_mut(&kind) {
                *count = count.saturating_sub(1);
            }
            match kind {
                ResourceKind::Shader => {
                    self.shaders.remove(&handle);
                }
                ResourceKind::Texture => {
                    self.textures.remove(&handle);
                }
                ResourceKind::Program => {
                    self.locations.retain(|(program, _), _| *program != handle);
                }
                _ => {}
            }
            self.calls.push(DeviceCall::Release(kind, handle));
        }
    }

    fn uniform_location(&mut self, program: Handle, name: &str) -> Option<UniformLocation> {
        let key = (program, name.to_owned());
        if let Some(location) = self.locations.get(&key) {
            return Some(*location);
        }
        let location = UniformLocation(self.next_location);
        self.next_location += 1;
        self.location_names.insert(location, name.to_owned());
        self.locations.insert(key, location);
        Some(location)
    }

    fn bind_uniform_block(&mut self, program: Handle, name: &str, binding: u32) -> bool {
        self.calls.push(DeviceCall::BindUniformBlock {
            program,
            name: name.to_owned(),
            binding,
        });
        true
    }

    fn use_program(&mut self, program: Option<Handle>) {
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let name = self
            .location_names
            .get(&location)
            .cloned()
            .unwrap_or_default();
        self.calls.push(DeviceCall::SetUniform {
            name,
            value: *value,
        });
    }

    fn bind_texture(&mut self, unit: u32, _kind: TextureKind, texture: Option<Handle>) {
        self.calls.push(DeviceCall::BindTexture { unit, texture });
    }

    fn update_uniform_buffer(&mut self, buffer: Handle, data: &[u8]) {
        self.calls.push(DeviceCall::UpdateUniformBuffer {
            buffer,
            size: data.len(),
        });
    }

    fn generate_mipmaps(&mut self, _kind: TextureKind, texture: Handle) {
        self.calls.push(DeviceCall::GenerateMipmaps(texture));
    }

    fn set_polygon_mode(&mut self, wireframe: bool) {
        self.calls.push(DeviceCall::SetPolygonMode(wireframe));
    }

    fn set_color_mask(&mut self, enabled: bool) {
        self.calls.push(DeviceCall::SetColorMask(enabled));
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        self.calls.push(DeviceCall::SetDepthMask(enabled));
    }

    fn set_clear_color(&mut self, color: Vec4) {
        self.calls.push(DeviceCall::SetClearColor(color));
    }

    fn set_clear_depth(&mut self, depth: f32) {
        self.calls.push(DeviceCall::SetClearDepth(depth));
    }

    fn set_blend(&mut self, factors: Option<(BlendFactor, BlendFactor)>) {
        self.calls.push(DeviceCall::SetBlend(factors));
    }

    fn set_depth_offset(&mut self, offset: Option<Vec2>) {
        self.calls.push(DeviceCall::SetDepthOffset(offset));
    }

    fn set_depth_test(&mut self, test: DepthTest) {
        self.calls.push(DeviceCall::SetDepthTest(test));
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.calls.push(DeviceCall::SetCullMode(mode));
    }

    fn set_seamless_cubemap(&mut self, enabled: bool) {
        self.calls.push(DeviceCall::SetSeamlessCubemap(enabled));
    }

    fn set_draw_buffers(&mut self, attachments: &[u32]) {
        self.calls.push(DeviceCall::SetDrawBuffers(attachments.to_vec()));
    }

    fn clear(&mut self, mask: BufferMask) {
        self.calls.push(DeviceCall::Clear(mask));
    }

    fn bind_framebuffer(&mut self, framebuffer: Handle, viewport: UVec2) {
        self.calls.push(DeviceCall::BindFramebuffer {
            framebuffer,
            viewport,
        });
    }

    fn bind_geometry(&mut self, geometry: Option<Handle>) {
        self.calls.push(DeviceCall::BindGeometry(geometry));
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        self.calls.push(DeviceCall::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn draw_indexed(&mut self, topology: Topology, count: u32) {
        self.calls.push(DeviceCall::DrawIndexed { topology, count });
    }

    fn blit_framebuffer(
        &mut self,
        source: (Handle, UVec2),
        destination: (Handle, UVec2),
        mask: BufferMask,
        filter: TextureFilter,
    ) {
        self.calls.push(DeviceCall::Blit {
            source: source.0,
            destination: destination.0,
            mask,
            filter,
        });
    }

    fn begin_timer(&mut self, query: Handle) {
        self.calls.push(DeviceCall::BeginTimer(query));
    }

    fn end_timer(&mut self, query: Handle) {
        self.calls.push(DeviceCall::EndTimer(query));
    }

    fn timer_result_ns(&mut self, _query: Handle) -> Option<u64> {
        Some(self.timer_ns)
    }

    fn poll_error(&mut self) -> Option<DeviceError> {
        self.errors.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::check_errors;

    #[test]
    fn garbage_collection_updates_live_counts() {
        let mut device = HeadlessDevice::new();
        let a = device.create_depth_buffer(DepthFormat::Depth24, UVec2::splat(4)).unwrap();
        let _b = device.create_depth_buffer(DepthFormat::Depth24, UVec2::splat(4)).unwrap();
        assert_eq!(device.live_count(ResourceKind::DepthBuffer), 2);

        drop(a);
        assert_eq!(device.pending_releases(), 1);
        device.collect_garbage();
        assert_eq!(device.live_count(ResourceKind::DepthBuffer), 1);
    }

    #[test]
    fn injected_failures_can_be_healed() {
        let mut device = HeadlessDevice::new();
        device.fail(Failures::UNIFORM_BUFFER);
        assert!(device.create_uniform_buffer(0, 64).is_err());
        device.heal(Failures::UNIFORM_BUFFER);
        assert!(device.create_uniform_buffer(0, 64).is_ok());
    }

    #[test]
    fn error_queue_drains() {
        let mut device = HeadlessDevice::new();
        assert!(check_errors(&mut device));
        device.push_error(0x0502, "GL_INVALID_OPERATION");
        device.push_error(0x0501, "GL_INVALID_VALUE");
        assert!(!check_errors(&mut device));
        assert!(check_errors(&mut device));
    }
}
