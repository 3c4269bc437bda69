//! Render targets.
//!
//! A [`RenderTarget`] is a framebuffer description: an ordered list of color
//! attachments and an optional depth/stencil attachment. The depth plane is
//! either a dedicated depth buffer owned by the target or a texture that can
//! be sampled later (shadow maps).
//!
//! ```text
//!  RenderTarget
//!   ├── colors[0..N]  ──▶ Arc<Texture> @ mip level
//!   └── depth         ──▶ Buffer(DepthFormat) | Texture(Arc<Texture>)
//! ```

use std::sync::{Arc, OnceLock};

use glam::{UVec2, Vec4};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::api::{
    Allocate, ColorBinding, DepthBinding, Device, FramebufferDescriptor, Handle, ResourceKind,
    SharedResource,
};
use crate::errors::{Result, SquareError};
use crate::resources::texture::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthFormat {
    Depth16,
    Depth24,
    DepthFloat,
    Depth24Stencil8,
    DepthFloatStencil8,
}

impl DepthFormat {
    #[inline]
    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8 | Self::DepthFloatStencil8)
    }
}

#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub texture: Arc<Texture>,
    pub level: u32,
}

#[derive(Debug, Clone)]
pub enum DepthAttachment {
    /// Depth buffer created and owned by the target.
    Buffer(DepthFormat),
    /// Depth texture that stays readable after the pass.
    Texture(Arc<Texture>),
}

#[derive(Debug)]
struct TargetLink {
    framebuffer: SharedResource,
    // Held for the lifetime of the framebuffer.
    _depth_buffer: Option<SharedResource>,
}

#[derive(Debug)]
pub struct RenderTarget {
    name: String,
    size: UVec2,
    colors: SmallVec<[ColorAttachment; 4]>,
    depth: Option<DepthAttachment>,
    link: OnceLock<TargetLink>,
}

impl RenderTarget {
    /// Target with the given attachments. Its size is taken from the first
    /// color attachment (at its mip level), else from the depth texture.
    #[must_use]
    pub fn new(colors: Vec<Arc<Texture>>, depth: Option<DepthAttachment>) -> Self {
        let colors = colors
            .into_iter()
            .map(|texture| ColorAttachment { texture, level: 0 })
            .collect();
        Self::from_attachments(colors, depth)
    }

    #[must_use]
    pub fn from_attachments(
        colors: SmallVec<[ColorAttachment; 4]>,
        depth: Option<DepthAttachment>,
    ) -> Self {
        let size = colors
            .first()
            .map(|c| mip_size(c.texture.size(), c.level))
            .or_else(|| match &depth {
                Some(DepthAttachment::Texture(t)) => Some(t.size()),
                _ => None,
            })
            .unwrap_or(UVec2::ZERO);
        Self {
            name: String::from("RenderTarget"),
            size,
            colors,
            depth,
            link: OnceLock::new(),
        }
    }

    /// Single color texture, optional owned depth buffer.
    #[must_use]
    pub fn color(texture: Arc<Texture>, depth: Option<DepthFormat>) -> Self {
        Self::new(vec![texture], depth.map(DepthAttachment::Buffer))
    }

    /// Renders into one mip level of `texture` (all faces for cubemaps).
    #[must_use]
    pub fn color_level(texture: Arc<Texture>, level: u32) -> Self {
        let mut colors = SmallVec::new();
        colors.push(ColorAttachment { texture, level });
        Self::from_attachments(colors, None)
    }

    /// Depth-only target backed by a texture.
    #[must_use]
    pub fn depth_only(texture: Arc<Texture>) -> Self {
        Self::new(Vec::new(), Some(DepthAttachment::Texture(texture)))
    }

    /// The window surface. Pre-linked to the default framebuffer, never
    /// released by the engine.
    #[must_use]
    pub fn default_framebuffer(width: u32, height: u32) -> Self {
        let target = Self {
            name: String::from("Default Framebuffer"),
            size: UVec2::new(width, height),
            colors: SmallVec::new(),
            depth: None,
            link: OnceLock::new(),
        };
        let _ = target.link.set(TargetLink {
            framebuffer: SharedResource::external(
                ResourceKind::Framebuffer,
                Handle::DEFAULT_FRAMEBUFFER,
            ),
            _depth_buffer: None,
        });
        target
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// (width, height, 1/width, 1/height)
    #[must_use]
    pub fn dimensions(&self) -> Vec4 {
        let w = self.size.x.max(1) as f32;
        let h = self.size.y.max(1) as f32;
        Vec4::new(w, h, 1.0 / w, 1.0 / h)
    }

    #[inline]
    #[must_use]
    pub fn color_attachments(&self) -> &[ColorAttachment] {
        &self.colors
    }

    #[must_use]
    pub fn color_texture(&self, index: usize) -> Option<&Arc<Texture>> {
        self.colors.get(index).map(|c| &c.texture)
    }

    #[inline]
    #[must_use]
    pub fn depth_attachment(&self) -> Option<&DepthAttachment> {
        self.depth.as_ref()
    }

    #[must_use]
    pub fn depth_texture(&self) -> Option<&Arc<Texture>> {
        match &self.depth {
            Some(DepthAttachment::Texture(t)) => Some(t),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.link.get().map(|l| l.framebuffer.handle())
    }

    fn validate(&self) -> Result<()> {
        if self.colors.is_empty() && self.depth.is_none() {
            return Err(SquareError::InvalidRenderTarget(format!(
                "'{}' has neither color nor depth attachments",
                self.name
            )));
        }
        if self.size.x == 0 || self.size.y == 0 {
            return Err(SquareError::InvalidRenderTarget(format!(
                "'{}' has zero extent {}x{}",
                self.name, self.size.x, self.size.y
            )));
        }
        Ok(())
    }
}

impl Allocate for RenderTarget {
    fn allocate(&self, device: &mut dyn Device) -> Result<()> {
        if self.link.get().is_some() {
            return Ok(());
        }
        self.validate()?;

        let mut descriptor = FramebufferDescriptor::default();
        for attachment in &self.colors {
            attachment.texture.allocate(device)?;
            let handle = attachment
                .texture
                .handle()
                .ok_or_else(|| SquareError::NotLinked(attachment.texture.name().to_owned()))?;
            descriptor.colors.push(ColorBinding {
                texture: handle,
                kind: attachment.texture.kind(),
                format: attachment.texture.format(),
                level: attachment.level,
            });
        }

        // Dropped on any early return below, which releases it.
        let mut depth_buffer = None;
        descriptor.depth = match &self.depth {
            None => None,
            Some(DepthAttachment::Buffer(format)) => {
                let buffer = device.create_depth_buffer(*format, self.size)?;
                let binding = DepthBinding::Buffer {
                    handle: buffer.handle(),
                    format: *format,
                };
                depth_buffer = Some(buffer);
                Some(binding)
            }
            Some(DepthAttachment::Texture(texture)) => {
                texture.allocate(device)?;
                let handle = texture
                    .handle()
                    .ok_or_else(|| SquareError::NotLinked(texture.name().to_owned()))?;
                Some(DepthBinding::Texture {
                    handle,
                    kind: texture.kind(),
                    format: texture.format(),
                })
            }
        };

        let framebuffer = device.create_framebuffer(&descriptor)?;
        let _ = self.link.set(TargetLink {
            framebuffer,
            _depth_buffer: depth_buffer,
        });
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }
}

fn mip_size(size: UVec2, level: u32) -> UVec2 {
    UVec2::new((size.x >> level).max(1), (size.y >> level).max(1))
}
