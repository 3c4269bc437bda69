use std::sync::OnceLock;

use glam::{UVec2, Vec4};
use serde::{Deserialize, Serialize};

use crate::api::{Allocate, Device, Handle, SharedResource};
use crate::errors::Result;

// ============================================================================
// Texture Defines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture2D,
    Cubemap,
}

/// Texel formats understood by the device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    R,
    RG,
    RGB,
    RGBA,
    SRGB,
    SRGBA,
    RHalf,
    RGHalf,
    RGBHalf,
    RGBAHalf,
    RFloat,
    RGFloat,
    RGBFloat,
    RGBAFloat,
    DepthHalf,
    DepthFloat,
    Depth24Stencil8,
}

impl TextureFormat {
    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::DepthHalf | Self::DepthFloat | Self::Depth24Stencil8)
    }

    #[inline]
    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    #[must_use]
    pub fn channels(self) -> u32 {
        match self {
            Self::R | Self::RHalf | Self::RFloat | Self::DepthHalf | Self::DepthFloat => 1,
            Self::RG | Self::RGHalf | Self::RGFloat | Self::Depth24Stencil8 => 2,
            Self::RGB | Self::SRGB | Self::RGBHalf | Self::RGBFloat => 3,
            Self::RGBA | Self::SRGBA | Self::RGBAHalf | Self::RGBAFloat => 4,
        }
    }

    /// Size of one texel in bytes.
    #[must_use]
    pub fn texel_size(self) -> usize {
        match self {
            Self::R | Self::RG | Self::RGB | Self::RGBA | Self::SRGB | Self::SRGBA => {
                self.channels() as usize
            }
            Self::RHalf | Self::RGHalf | Self::RGBHalf | Self::RGBAHalf | Self::DepthHalf => {
                self.channels() as usize * 2
            }
            Self::Depth24Stencil8 => 4,
            Self::RFloat | Self::RGFloat | Self::RGBFloat | Self::RGBAFloat | Self::DepthFloat => {
                self.channels() as usize * 4
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureWrap {
    #[default]
    Repeat,
    Mirror,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub mipmapping: bool,
    pub border_color: Vec4,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
            mipmapping: true,
            border_color: Vec4::ZERO,
        }
    }
}

impl Sampler {
    /// Sampler for intermediate screen-space targets.
    #[must_use]
    pub fn screen() -> Self {
        Self {
            wrap: TextureWrap::Mirror,
            mipmapping: false,
            ..Self::default()
        }
    }

    /// Sampler for shadow maps: everything outside the map is lit.
    #[must_use]
    pub fn shadow_map() -> Self {
        Self {
            filter: TextureFilter::Linear,
            wrap: TextureWrap::ClampToBorder,
            mipmapping: false,
            border_color: Vec4::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDescriptor {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub sampler: Sampler,
}

impl TextureDescriptor {
    /// Number of mip levels the full chain of this texture has.
    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        if self.sampler.mipmapping {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }
}

/// Optional initial texel data.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TextureData {
    #[default]
    Empty,
    Image(Vec<u8>),
    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order.
    Faces(Vec<Vec<u8>>),
}

// ============================================================================
// Texture
// ============================================================================

/// CPU-side description of a 2D texture or cubemap.
#[derive(Debug)]
pub struct Texture {
    name: String,
    descriptor: TextureDescriptor,
    data: TextureData,
    link: OnceLock<SharedResource>,
}

impl Texture {
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, sampler: Sampler) -> Self {
        Self::from_descriptor(TextureDescriptor {
            kind: TextureKind::Texture2D,
            width,
            height,
            format,
            sampler,
        })
    }

    #[must_use]
    pub fn new_cubemap(size: u32, format: TextureFormat, sampler: Sampler) -> Self {
        Self::from_descriptor(TextureDescriptor {
            kind: TextureKind::Cubemap,
            width: size,
            height: size,
            format,
            sampler,
        })
    }

    #[must_use]
    pub fn from_descriptor(descriptor: TextureDescriptor) -> Self {
        Self {
            name: String::from("Texture"),
            descriptor,
            data: TextureData::Empty,
            link: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attaches texel data uploaded at allocation time.
    #[must_use]
    pub fn with_data(mut self, data: TextureData) -> Self {
        self.data = data;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> TextureKind {
        self.descriptor.kind
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.descriptor.width, self.descriptor.height)
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.link.get().map(SharedResource::handle)
    }
}

impl Allocate for Texture {
    fn allocate(&self, device: &mut dyn Device) -> Result<()> {
        if self.link.get().is_some() {
            return Ok(());
        }
        let resource = device.create_texture(&self.descriptor, &self.data)?;
        let _ = self.link.set(resource);
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_length_follows_largest_side() {
        let tex = Texture::new_2d(512, 128, TextureFormat::RGBA, Sampler::default());
        assert_eq!(tex.descriptor().mip_level_count(), 10);

        let flat = Texture::new_2d(512, 128, TextureFormat::RGBA, Sampler::screen());
        assert_eq!(flat.descriptor().mip_level_count(), 1);
    }

    #[test]
    fn depth_formats_are_flagged() {
        assert!(TextureFormat::DepthFloat.is_depth());
        assert!(TextureFormat::Depth24Stencil8.has_stencil());
        assert!(!TextureFormat::RGBAHalf.is_depth());
        assert_eq!(TextureFormat::RGBAHalf.texel_size(), 8);
    }
}
