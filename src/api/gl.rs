//! OpenGL 4.x core backend on top of `glow`.
//!
//! The caller creates the context (window, surface, loader) and hands the
//! `glow::Context` over. Every [`Handle`] maps to one GL object in a table
//! owned by [`GlDevice`]; dropped resources are deleted in
//! [`collect_garbage`](Device::collect_garbage), on the thread that owns the
//! context.

#![allow(unsafe_code)]

use std::mem::offset_of;

use glam::{UVec2, Vec2, Vec4};
use glow::HasContext;
use rustc_hash::FxHashMap;

use crate::api::device::{
    BufferMask, ColorBinding, DepthBinding, Device, DeviceError, FramebufferDescriptor,
    GeometryUpload, UniformLocation,
};
use crate::api::handle::{Handle, ReleaseQueue, ResourceKind, SharedResource};
use crate::errors::{Result, SquareError};
use crate::renderer::state::{BlendFactor, CullMode, DepthTest, Topology};
use crate::resources::geometry::{Vertex, VertexAttributes};
use crate::resources::material::UniformValue;
use crate::resources::render_target::DepthFormat;
use crate::resources::shader::ShaderStages;
use crate::resources::texture::{
    TextureData, TextureDescriptor, TextureFilter, TextureFormat, TextureKind, TextureWrap,
};

type GlBuffer = <glow::Context as HasContext>::Buffer;
type GlVertexArray = <glow::Context as HasContext>::VertexArray;
type GlTexture = <glow::Context as HasContext>::Texture;
type GlRenderbuffer = <glow::Context as HasContext>::Renderbuffer;
type GlFramebuffer = <glow::Context as HasContext>::Framebuffer;
type GlShader = <glow::Context as HasContext>::Shader;
type GlProgram = <glow::Context as HasContext>::Program;
type GlQuery = <glow::Context as HasContext>::Query;
type GlUniformLocation = <glow::Context as HasContext>::UniformLocation;

#[derive(Debug)]
enum GlObject {
    Geometry {
        vao: GlVertexArray,
        vertices: GlBuffer,
        indices: Option<GlBuffer>,
    },
    Texture(GlTexture),
    DepthBuffer(GlRenderbuffer),
    Framebuffer(GlFramebuffer),
    UniformBuffer(GlBuffer),
    Shader(GlShader),
    Program(GlProgram),
    TimerQuery(GlQuery),
}

pub struct GlDevice {
    gl: glow::Context,
    objects: FxHashMap<Handle, GlObject>,
    next_handle: u32,
    releases: ReleaseQueue,
    locations: Vec<GlUniformLocation>,
    location_cache: FxHashMap<(Handle, String), Option<UniformLocation>>,
    /// Framebuffer bound to `FRAMEBUFFER`; draw buffers depend on it.
    bound_framebuffer: Handle,
}

impl std::fmt::Debug for GlDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlDevice")
            .field("objects", &self.objects.len())
            .field("pending_releases", &self.releases.pending())
            .finish_non_exhaustive()
    }
}

impl GlDevice {
    #[must_use]
    pub fn new(gl: glow::Context) -> Self {
        unsafe {
            log::info!(
                "OpenGL {} on {}",
                gl.get_parameter_string(glow::VERSION),
                gl.get_parameter_string(glow::RENDERER)
            );
        }
        Self {
            gl,
            objects: FxHashMap::default(),
            // 0 is the default framebuffer.
            next_handle: 1,
            releases: ReleaseQueue::new(),
            locations: Vec::new(),
            location_cache: FxHashMap::default(),
            bound_framebuffer: Handle::DEFAULT_FRAMEBUFFER,
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn register(&mut self, kind: ResourceKind, object: GlObject) -> SharedResource {
        let handle = Handle::new(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, object);
        self.releases.track(kind, handle)
    }

    fn texture(&self, handle: Handle) -> Option<GlTexture> {
        match self.objects.get(&handle) {
            Some(GlObject::Texture(texture)) => Some(*texture),
            _ => None,
        }
    }

    fn framebuffer(&self, handle: Handle) -> Option<GlFramebuffer> {
        match self.objects.get(&handle) {
            Some(GlObject::Framebuffer(fb)) => Some(*fb),
            _ => None,
        }
    }

    fn program(&self, handle: Handle) -> Option<GlProgram> {
        match self.objects.get(&handle) {
            Some(GlObject::Program(program)) => Some(*program),
            _ => None,
        }
    }

    fn query(&self, handle: Handle) -> Option<GlQuery> {
        match self.objects.get(&handle) {
            Some(GlObject::TimerQuery(query)) => Some(*query),
            _ => None,
        }
    }

    unsafe fn delete(&self, object: GlObject) {
        let gl = &self.gl;
        unsafe {
            match object {
                GlObject::Geometry {
                    vao,
                    vertices,
                    indices,
                } => {
                    gl.delete_vertex_array(vao);
                    gl.delete_buffer(vertices);
                    if let Some(indices) = indices {
                        gl.delete_buffer(indices);
                    }
                }
                GlObject::Texture(texture) => gl.delete_texture(texture),
                GlObject::DepthBuffer(rb) => gl.delete_renderbuffer(rb),
                GlObject::Framebuffer(fb) => gl.delete_framebuffer(fb),
                GlObject::UniformBuffer(buffer) => gl.delete_buffer(buffer),
                GlObject::Shader(shader) => gl.delete_shader(shader),
                GlObject::Program(program) => gl.delete_program(program),
                GlObject::TimerQuery(query) => gl.delete_query(query),
            }
        }
    }
}

fn gl_error(kind: ResourceKind) -> impl Fn(String) -> SquareError {
    move |reason| SquareError::allocation(kind, reason)
}

// ============================================================================
// Enum mapping
// ============================================================================

fn texture_target(kind: TextureKind) -> u32 {
    match kind {
        TextureKind::Texture2D => glow::TEXTURE_2D,
        TextureKind::Cubemap => glow::TEXTURE_CUBE_MAP,
    }
}

/// (internal format, pixel format, pixel type)
fn texture_format(format: TextureFormat) -> (u32, u32, u32) {
    match format {
        TextureFormat::R => (glow::R8, glow::RED, glow::UNSIGNED_BYTE),
        TextureFormat::RG => (glow::RG8, glow::RG, glow::UNSIGNED_BYTE),
        TextureFormat::RGB => (glow::RGB8, glow::RGB, glow::UNSIGNED_BYTE),
        TextureFormat::RGBA => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::SRGB => (glow::SRGB8, glow::RGB, glow::UNSIGNED_BYTE),
        TextureFormat::SRGBA => (glow::SRGB8_ALPHA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::RHalf => (glow::R16F, glow::RED, glow::HALF_FLOAT),
        TextureFormat::RGHalf => (glow::RG16F, glow::RG, glow::HALF_FLOAT),
        TextureFormat::RGBHalf => (glow::RGB16F, glow::RGB, glow::HALF_FLOAT),
        TextureFormat::RGBAHalf => (glow::RGBA16F, glow::RGBA, glow::HALF_FLOAT),
        TextureFormat::RFloat => (glow::R32F, glow::RED, glow::FLOAT),
        TextureFormat::RGFloat => (glow::RG32F, glow::RG, glow::FLOAT),
        TextureFormat::RGBFloat => (glow::RGB32F, glow::RGB, glow::FLOAT),
        TextureFormat::RGBAFloat => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        TextureFormat::DepthHalf => (glow::DEPTH_COMPONENT16, glow::DEPTH_COMPONENT, glow::FLOAT),
        TextureFormat::DepthFloat => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
        TextureFormat::Depth24Stencil8 => (
            glow::DEPTH24_STENCIL8,
            glow::DEPTH_STENCIL,
            glow::UNSIGNED_INT_24_8,
        ),
    }
}

fn depth_buffer_format(format: DepthFormat) -> u32 {
    match format {
        DepthFormat::Depth16 => glow::DEPTH_COMPONENT16,
        DepthFormat::Depth24 => glow::DEPTH_COMPONENT24,
        DepthFormat::DepthFloat => glow::DEPTH_COMPONENT32F,
        DepthFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
        DepthFormat::DepthFloatStencil8 => glow::DEPTH32F_STENCIL8,
    }
}

fn wrap_mode(wrap: TextureWrap) -> i32 {
    (match wrap {
        TextureWrap::Repeat => glow::REPEAT,
        TextureWrap::Mirror => glow::MIRRORED_REPEAT,
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        TextureWrap::ClampToBorder => glow::CLAMP_TO_BORDER,
    }) as i32
}

fn shader_type(stage: ShaderStages) -> Option<u32> {
    Some(match stage {
        ShaderStages::VERTEX => glow::VERTEX_SHADER,
        ShaderStages::TESS_CONTROL => glow::TESS_CONTROL_SHADER,
        ShaderStages::TESS_EVALUATION => glow::TESS_EVALUATION_SHADER,
        ShaderStages::GEOMETRY => glow::GEOMETRY_SHADER,
        ShaderStages::FRAGMENT => glow::FRAGMENT_SHADER,
        ShaderStages::COMPUTE => glow::COMPUTE_SHADER,
        _ => return None,
    })
}

fn primitive_mode(topology: Topology) -> u32 {
    match topology {
        Topology::Points => glow::POINTS,
        Topology::Lines => glow::LINES,
        Topology::LineStrip => glow::LINE_STRIP,
        Topology::Triangles => glow::TRIANGLES,
        Topology::TriangleStrip => glow::TRIANGLE_STRIP,
        Topology::Patches => glow::PATCHES,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn buffer_bits(mask: BufferMask) -> u32 {
    let mut bits = 0;
    if mask.contains(BufferMask::COLOR) {
        bits |= glow::COLOR_BUFFER_BIT;
    }
    if mask.contains(BufferMask::DEPTH) {
        bits |= glow::DEPTH_BUFFER_BIT;
    }
    if mask.contains(BufferMask::STENCIL) {
        bits |= glow::STENCIL_BUFFER_BIT;
    }
    bits
}

fn toggle(gl: &glow::Context, capability: u32, enabled: bool) {
    unsafe {
        if enabled {
            gl.enable(capability);
        } else {
            gl.disable(capability);
        }
    }
}

/// `glDrawBuffers` arguments for `attachments` on `framebuffer`.
///
/// The default framebuffer only accepts `BACK`/`NONE`; color attachment
/// enums are reserved for user framebuffers.
fn draw_buffer_enums(framebuffer: Handle, attachments: &[u32]) -> Vec<u32> {
    if attachments.is_empty() {
        vec![glow::NONE]
    } else if framebuffer == Handle::DEFAULT_FRAMEBUFFER {
        vec![glow::BACK]
    } else {
        attachments.iter().map(|i| glow::COLOR_ATTACHMENT0 + i).collect()
    }
}

// ============================================================================
// Device
// ============================================================================

impl Device for GlDevice {
    fn create_geometry(&mut self, upload: &GeometryUpload<'_>) -> Result<SharedResource> {
        let err = gl_error(ResourceKind::Geometry);
        let gl = &self.gl;
        let usage = if upload.dynamic {
            glow::DYNAMIC_DRAW
        } else {
            glow::STATIC_DRAW
        };
        let object = unsafe {
            let vao = gl.create_vertex_array().map_err(&err)?;
            let vertices = match gl.create_buffer() {
                Ok(buffer) => buffer,
                Err(reason) => {
                    gl.delete_vertex_array(vao);
                    return Err(err(reason));
                }
            };
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertices));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, upload.vertices, usage);

            let stride = upload.stride as i32;
            let layout = [
                (VertexAttributes::POSITION, 3, offset_of!(Vertex, position)),
                (VertexAttributes::UV, 2, offset_of!(Vertex, uv)),
                (VertexAttributes::NORMAL, 3, offset_of!(Vertex, normal)),
                (VertexAttributes::TANGENT, 4, offset_of!(Vertex, tangent)),
            ];
            for (location, (flag, size, offset)) in layout.into_iter().enumerate() {
                if upload.attributes.contains(flag) {
                    gl.enable_vertex_attrib_array(location as u32);
                    gl.vertex_attrib_pointer_f32(
                        location as u32,
                        size,
                        glow::FLOAT,
                        false,
                        stride,
                        offset as i32,
                    );
                }
            }

            let indices = match upload.indices {
                Some(data) => match gl.create_buffer() {
                    Ok(buffer) => {
                        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer));
                        gl.buffer_data_u8_slice(
                            glow::ELEMENT_ARRAY_BUFFER,
                            bytemuck::cast_slice(data),
                            usage,
                        );
                        Some(buffer)
                    }
                    Err(reason) => {
                        gl.bind_vertex_array(None);
                        gl.delete_buffer(vertices);
                        gl.delete_vertex_array(vao);
                        return Err(err(reason));
                    }
                },
                None => None,
            };
            gl.bind_vertex_array(None);
            GlObject::Geometry {
                vao,
                vertices,
                indices,
            }
        };
        Ok(self.register(ResourceKind::Geometry, object))
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &TextureData,
    ) -> Result<SharedResource> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(SquareError::allocation(ResourceKind::Texture, "zero extent"));
        }
        let gl = &self.gl;
        let target = texture_target(descriptor.kind);
        let (internal, format, ty) = texture_format(descriptor.format);
        let (width, height) = (descriptor.width as i32, descriptor.height as i32);

        let texture = unsafe {
            let texture = gl
                .create_texture()
                .map_err(gl_error(ResourceKind::Texture))?;
            gl.bind_texture(target, Some(texture));
            gl.tex_storage_2d(
                target,
                descriptor.mip_level_count() as i32,
                internal,
                width,
                height,
            );

            let upload = |face_target: u32, bytes: &[u8]| {
                gl.tex_sub_image_2d(
                    face_target,
                    0,
                    0,
                    0,
                    width,
                    height,
                    format,
                    ty,
                    glow::PixelUnpackData::Slice(Some(bytes)),
                );
            };
            match data {
                TextureData::Empty => {}
                TextureData::Image(bytes) => upload(target, bytes),
                TextureData::Faces(faces) => {
                    for (i, bytes) in faces.iter().enumerate().take(6) {
                        upload(glow::TEXTURE_CUBE_MAP_POSITIVE_X + i as u32, bytes);
                    }
                }
            }

            let sampler = &descriptor.sampler;
            let (min, mag) = match (sampler.filter, sampler.mipmapping) {
                (TextureFilter::Nearest, false) => (glow::NEAREST, glow::NEAREST),
                (TextureFilter::Nearest, true) => (glow::NEAREST_MIPMAP_NEAREST, glow::NEAREST),
                (TextureFilter::Linear, false) => (glow::LINEAR, glow::LINEAR),
                (TextureFilter::Linear, true) => (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR),
            };
            gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag as i32);
            let wrap = wrap_mode(sampler.wrap);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap);
            gl.tex_parameter_f32_slice(
                target,
                glow::TEXTURE_BORDER_COLOR,
                &sampler.border_color.to_array(),
            );
            if sampler.mipmapping && !matches!(data, TextureData::Empty) {
                gl.generate_mipmap(target);
            }
            gl.bind_texture(target, None);
            texture
        };
        Ok(self.register(ResourceKind::Texture, GlObject::Texture(texture)))
    }

    fn create_depth_buffer(&mut self, format: DepthFormat, size: UVec2) -> Result<SharedResource> {
        let gl = &self.gl;
        let renderbuffer = unsafe {
            let rb = gl
                .create_renderbuffer()
                .map_err(gl_error(ResourceKind::DepthBuffer))?;
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(rb));
            gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                depth_buffer_format(format),
                size.x as i32,
                size.y as i32,
            );
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            rb
        };
        Ok(self.register(ResourceKind::DepthBuffer, GlObject::DepthBuffer(renderbuffer)))
    }

    fn create_framebuffer(&mut self, descriptor: &FramebufferDescriptor) -> Result<SharedResource> {
        if descriptor.colors.is_empty() && descriptor.depth.is_none() {
            return Err(SquareError::InvalidRenderTarget("no attachments".into()));
        }
        let attach_color = |gl: &glow::Context, index: u32, binding: &ColorBinding, tex| unsafe {
            let attachment = glow::COLOR_ATTACHMENT0 + index;
            match binding.kind {
                TextureKind::Texture2D => gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    Some(tex),
                    binding.level as i32,
                ),
                // Layered: every face is a layer of the attachment.
                TextureKind::Cubemap => gl.framebuffer_texture(
                    glow::FRAMEBUFFER,
                    attachment,
                    Some(tex),
                    binding.level as i32,
                ),
            }
        };

        let gl = &self.gl;
        let framebuffer = unsafe {
            let fb = gl
                .create_framebuffer()
                .map_err(gl_error(ResourceKind::Framebuffer))?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fb));

            let mut draw_buffers = Vec::with_capacity(descriptor.colors.len());
            for (i, binding) in descriptor.colors.iter().enumerate() {
                let Some(tex) = self.texture(binding.texture) else {
                    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
                    gl.delete_framebuffer(fb);
                    return Err(SquareError::InvalidRenderTarget(format!(
                        "color attachment {i} is not a texture"
                    )));
                };
                attach_color(gl, i as u32, binding, tex);
                draw_buffers.push(glow::COLOR_ATTACHMENT0 + i as u32);
            }
            if draw_buffers.is_empty() {
                gl.draw_buffers(&[glow::NONE]);
                gl.read_buffer(glow::NONE);
            } else {
                gl.draw_buffers(&draw_buffers);
            }

            match descriptor.depth {
                Some(DepthBinding::Buffer { handle, format }) => {
                    if let Some(GlObject::DepthBuffer(rb)) = self.objects.get(&handle) {
                        let attachment = if format.has_stencil() {
                            glow::DEPTH_STENCIL_ATTACHMENT
                        } else {
                            glow::DEPTH_ATTACHMENT
                        };
                        gl.framebuffer_renderbuffer(
                            glow::FRAMEBUFFER,
                            attachment,
                            glow::RENDERBUFFER,
                            Some(*rb),
                        );
                    }
                }
                Some(DepthBinding::Texture {
                    handle,
                    kind,
                    format,
                }) => {
                    if let Some(tex) = self.texture(handle) {
                        let attachment = if format.has_stencil() {
                            glow::DEPTH_STENCIL_ATTACHMENT
                        } else {
                            glow::DEPTH_ATTACHMENT
                        };
                        match kind {
                            TextureKind::Texture2D => gl.framebuffer_texture_2d(
                                glow::FRAMEBUFFER,
                                attachment,
                                glow::TEXTURE_2D,
                                Some(tex),
                                0,
                            ),
                            TextureKind::Cubemap => {
                                gl.framebuffer_texture(glow::FRAMEBUFFER, attachment, Some(tex), 0);
                            }
                        }
                    }
                }
                None => {}
            }

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(fb);
                return Err(SquareError::InvalidRenderTarget(format!(
                    "framebuffer incomplete (0x{status:04X})"
                )));
            }
            fb
        };
        Ok(self.register(ResourceKind::Framebuffer, GlObject::Framebuffer(framebuffer)))
    }

    fn create_uniform_buffer(&mut self, binding: u32, size: usize) -> Result<SharedResource> {
        let gl = &self.gl;
        let buffer = unsafe {
            let buffer = gl
                .create_buffer()
                .map_err(gl_error(ResourceKind::UniformBuffer))?;
            gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            gl.buffer_data_size(glow::UNIFORM_BUFFER, size as i32, glow::DYNAMIC_DRAW);
            gl.bind_buffer_base(glow::UNIFORM_BUFFER, binding, Some(buffer));
            gl.bind_buffer(glow::UNIFORM_BUFFER, None);
            buffer
        };
        Ok(self.register(ResourceKind::UniformBuffer, GlObject::UniformBuffer(buffer)))
    }

    fn compile_shader(&mut self, stage: ShaderStages, source: &str) -> Result<SharedResource> {
        let Some(ty) = shader_type(stage) else {
            return Err(SquareError::allocation(
                ResourceKind::Shader,
                format!("{stage:?} is not a single stage"),
            ));
        };
        let gl = &self.gl;
        let shader = unsafe {
            let shader = gl.create_shader(ty).map_err(gl_error(ResourceKind::Shader))?;
            gl.shader_source(shader, source);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(SquareError::allocation(ResourceKind::Shader, log));
            }
            shader
        };
        Ok(self.register(ResourceKind::Shader, GlObject::Shader(shader)))
    }

    fn link_program(&mut self, shaders: &[Handle]) -> Result<SharedResource> {
        let stages: Vec<GlShader> = shaders
            .iter()
            .filter_map(|h| match self.objects.get(h) {
                Some(GlObject::Shader(shader)) => Some(*shader),
                _ => None,
            })
            .collect();
        if stages.len() != shaders.len() || stages.is_empty() {
            return Err(SquareError::allocation(
                ResourceKind::Program,
                "attached object is not a compiled shader",
            ));
        }
        let gl = &self.gl;
        let program = unsafe {
            let program = gl
                .create_program()
                .map_err(gl_error(ResourceKind::Program))?;
            for shader in &stages {
                gl.attach_shader(program, *shader);
            }
            gl.link_program(program);
            for shader in &stages {
                gl.detach_shader(program, *shader);
            }
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(SquareError::allocation(ResourceKind::Program, log));
            }
            program
        };
        Ok(self.register(ResourceKind::Program, GlObject::Program(program)))
    }

    fn create_timer_query(&mut self) -> Result<SharedResource> {
        let query = unsafe {
            self.gl
                .create_query()
                .map_err(gl_error(ResourceKind::TimerQuery))?
        };
        Ok(self.register(ResourceKind::TimerQuery, GlObject::TimerQuery(query)))
    }

    fn collect_garbage(&mut self) {
        let released: Vec<_> = self.releases.drain().collect();
        for (kind, handle) in released {
            if let Some(object) = self.objects.remove(&handle) {
                log::trace!("Deleting {kind:?} {handle:?}");
                unsafe { self.delete(object) };
            }
            if kind == ResourceKind::Program {
                self.location_cache.retain(|(program, _), _| *program != handle);
            }
        }
    }

    // ─── Program interface ───────────────────────────────────────────────

    fn uniform_location(&mut self, program: Handle, name: &str) -> Option<UniformLocation> {
        if let Some(cached) = self.location_cache.get(&(program, name.to_owned())) {
            return *cached;
        }
        let location = self.program(program).and_then(|p| {
            let raw = unsafe { self.gl.get_uniform_location(p, name) }?;
            self.locations.push(raw);
            Some(UniformLocation(self.locations.len() as i32 - 1))
        });
        self.location_cache.insert((program, name.to_owned()), location);
        location
    }

    fn bind_uniform_block(&mut self, program: Handle, name: &str, binding: u32) -> bool {
        let Some(program) = self.program(program) else {
            return false;
        };
        unsafe {
            match self.gl.get_uniform_block_index(program, name) {
                Some(index) => {
                    self.gl.uniform_block_binding(program, index, binding);
                    true
                }
                None => false,
            }
        }
    }

    fn use_program(&mut self, program: Option<Handle>) {
        let program = program.and_then(|h| self.program(h));
        unsafe { self.gl.use_program(program) };
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(loc) = usize::try_from(location.0)
            .ok()
            .and_then(|i| self.locations.get(i))
        else {
            return;
        };
        let gl = &self.gl;
        unsafe {
            match *value {
                UniformValue::Int(v) => gl.uniform_1_i32(Some(loc), v),
                UniformValue::UInt(v) => gl.uniform_1_u32(Some(loc), v),
                UniformValue::Float(v) => gl.uniform_1_f32(Some(loc), v),
                UniformValue::Vec2(v) => gl.uniform_2_f32(Some(loc), v.x, v.y),
                UniformValue::Vec3(v) => gl.uniform_3_f32(Some(loc), v.x, v.y, v.z),
                UniformValue::Vec4(v) => gl.uniform_4_f32(Some(loc), v.x, v.y, v.z, v.w),
                UniformValue::Mat3(m) => {
                    gl.uniform_matrix_3_f32_slice(Some(loc), false, &m.to_cols_array());
                }
                UniformValue::Mat4(m) => {
                    gl.uniform_matrix_4_f32_slice(Some(loc), false, &m.to_cols_array());
                }
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, kind: TextureKind, texture: Option<Handle>) {
        let texture = texture.and_then(|h| self.texture(h));
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl.bind_texture(texture_target(kind), texture);
        }
    }

    fn update_uniform_buffer(&mut self, buffer: Handle, data: &[u8]) {
        let Some(GlObject::UniformBuffer(buffer)) = self.objects.get(&buffer) else {
            return;
        };
        unsafe {
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, Some(*buffer));
            self.gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, 0, data);
            self.gl.bind_buffer(glow::UNIFORM_BUFFER, None);
        }
    }

    fn generate_mipmaps(&mut self, kind: TextureKind, texture: Handle) {
        let Some(texture) = self.texture(texture) else {
            return;
        };
        let target = texture_target(kind);
        unsafe {
            self.gl.bind_texture(target, Some(texture));
            self.gl.generate_mipmap(target);
            self.gl.bind_texture(target, None);
        }
    }

    // ─── Fixed-function state ────────────────────────────────────────────

    fn set_polygon_mode(&mut self, wireframe: bool) {
        let mode = if wireframe { glow::LINE } else { glow::FILL };
        unsafe { self.gl.polygon_mode(glow::FRONT_AND_BACK, mode) };
    }

    fn set_color_mask(&mut self, enabled: bool) {
        unsafe { self.gl.color_mask(enabled, enabled, enabled, enabled) };
    }

    fn set_depth_mask(&mut self, enabled: bool) {
        unsafe { self.gl.depth_mask(enabled) };
    }

    fn set_clear_color(&mut self, color: Vec4) {
        unsafe { self.gl.clear_color(color.x, color.y, color.z, color.w) };
    }

    fn set_clear_depth(&mut self, depth: f32) {
        unsafe { self.gl.clear_depth_f32(depth) };
    }

    fn set_blend(&mut self, factors: Option<(BlendFactor, BlendFactor)>) {
        toggle(&self.gl, glow::BLEND, factors.is_some());
        if let Some((src, dst)) = factors {
            unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) };
        }
    }

    fn set_depth_offset(&mut self, offset: Option<Vec2>) {
        toggle(&self.gl, glow::POLYGON_OFFSET_FILL, offset.is_some());
        if let Some(offset) = offset {
            unsafe { self.gl.polygon_offset(offset.x, offset.y) };
        }
    }

    fn set_depth_test(&mut self, test: DepthTest) {
        let func = match test {
            DepthTest::Disabled => {
                toggle(&self.gl, glow::DEPTH_TEST, false);
                return;
            }
            DepthTest::Never => glow::NEVER,
            DepthTest::Less => glow::LESS,
            DepthTest::Equal => glow::EQUAL,
            DepthTest::LessEqual => glow::LEQUAL,
            DepthTest::Greater => glow::GREATER,
            DepthTest::NotEqual => glow::NOTEQUAL,
            DepthTest::GreaterEqual => glow::GEQUAL,
            DepthTest::Always => glow::ALWAYS,
        };
        toggle(&self.gl, glow::DEPTH_TEST, true);
        unsafe { self.gl.depth_func(func) };
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        let face = match mode {
            CullMode::None => {
                toggle(&self.gl, glow::CULL_FACE, false);
                return;
            }
            CullMode::Front => glow::FRONT,
            CullMode::Back => glow::BACK,
            CullMode::FrontAndBack => glow::FRONT_AND_BACK,
        };
        toggle(&self.gl, glow::CULL_FACE, true);
        unsafe { self.gl.cull_face(face) };
    }

    fn set_seamless_cubemap(&mut self, enabled: bool) {
        toggle(&self.gl, glow::TEXTURE_CUBE_MAP_SEAMLESS, enabled);
    }

    fn set_draw_buffers(&mut self, attachments: &[u32]) {
        let buffers = draw_buffer_enums(self.bound_framebuffer, attachments);
        unsafe { self.gl.draw_buffers(&buffers) };
    }

    fn clear(&mut self, mask: BufferMask) {
        unsafe { self.gl.clear(buffer_bits(mask)) };
    }

    // ─── Targets & draws ─────────────────────────────────────────────────

    fn bind_framebuffer(&mut self, framebuffer: Handle, viewport: UVec2) {
        let fb = if framebuffer == Handle::DEFAULT_FRAMEBUFFER {
            None
        } else {
            self.framebuffer(framebuffer)
        };
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, fb);
            self.gl.viewport(0, 0, viewport.x as i32, viewport.y as i32);
        }
        self.bound_framebuffer = if fb.is_some() { framebuffer } else { Handle::DEFAULT_FRAMEBUFFER };
    }

    fn bind_geometry(&mut self, geometry: Option<Handle>) {
        let vao = geometry.and_then(|h| match self.objects.get(&h) {
            Some(GlObject::Geometry { vao, .. }) => Some(*vao),
            _ => None,
        });
        unsafe { self.gl.bind_vertex_array(vao) };
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        unsafe {
            if topology == Topology::Patches {
                self.gl.patch_parameter_i32(glow::PATCH_VERTICES, 3);
            }
            self.gl
                .draw_arrays(primitive_mode(topology), first as i32, count as i32);
        }
    }

    fn draw_indexed(&mut self, topology: Topology, count: u32) {
        unsafe {
            if topology == Topology::Patches {
                self.gl.patch_parameter_i32(glow::PATCH_VERTICES, 3);
            }
            self.gl.draw_elements(
                primitive_mode(topology),
                count as i32,
                glow::UNSIGNED_INT,
                0,
            );
        }
    }

    fn blit_framebuffer(
        &mut self,
        source: (Handle, UVec2),
        destination: (Handle, UVec2),
        mask: BufferMask,
        filter: TextureFilter,
    ) {
        let resolve = |h: Handle| {
            if h == Handle::DEFAULT_FRAMEBUFFER {
                None
            } else {
                self.framebuffer(h)
            }
        };
        let (src, dst) = (resolve(source.0), resolve(destination.0));
        // Depth and stencil blits only support nearest filtering.
        let filter = if mask == BufferMask::COLOR && filter == TextureFilter::Linear {
            glow::LINEAR
        } else {
            glow::NEAREST
        };
        unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, src);
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, dst);
            self.gl.blit_framebuffer(
                0,
                0,
                source.1.x as i32,
                source.1.y as i32,
                0,
                0,
                destination.1.x as i32,
                destination.1.y as i32,
                buffer_bits(mask),
                filter,
            );
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.bound_framebuffer = Handle::DEFAULT_FRAMEBUFFER;
    }

    // ─── Timing & errors ─────────────────────────────────────────────────

    fn begin_timer(&mut self, query: Handle) {
        if let Some(query) = self.query(query) {
            unsafe { self.gl.begin_query(glow::TIME_ELAPSED, query) };
        }
    }

    fn end_timer(&mut self, query: Handle) {
        if self.query(query).is_some() {
            unsafe { self.gl.end_query(glow::TIME_ELAPSED) };
        }
    }

    fn timer_result_ns(&mut self, query: Handle) -> Option<u64> {
        let query = self.query(query)?;
        let ns = unsafe { self.gl.get_query_parameter_u32(query, glow::QUERY_RESULT) };
        Some(u64::from(ns))
    }

    fn poll_error(&mut self) -> Option<DeviceError> {
        let code = unsafe { self.gl.get_error() };
        if code == glow::NO_ERROR {
            return None;
        }
        let message = match code {
            glow::INVALID_ENUM => "invalid enum",
            glow::INVALID_VALUE => "invalid value",
            glow::INVALID_OPERATION => "invalid operation",
            glow::INVALID_FRAMEBUFFER_OPERATION => "invalid framebuffer operation",
            glow::OUT_OF_MEMORY => "out of memory",
            _ => "unknown error",
        };
        Some(DeviceError {
            code,
            message: message.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_framebuffer_draws_to_back() {
        let default = Handle::DEFAULT_FRAMEBUFFER;
        assert_eq!(draw_buffer_enums(default, &[0]), [glow::BACK]);
        assert_eq!(draw_buffer_enums(default, &[]), [glow::NONE]);
    }

    #[test]
    fn user_framebuffer_draws_to_attachments() {
        let fbo = Handle::new(7);
        assert_eq!(
            draw_buffer_enums(fbo, &[0, 2]),
            [glow::COLOR_ATTACHMENT0, glow::COLOR_ATTACHMENT0 + 2]
        );
        assert_eq!(draw_buffer_enums(fbo, &[]), [glow::NONE]);
    }
}
