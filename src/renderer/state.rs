//! Fixed-function renderer state.
//!
//! A [`RendererState`] is the full snapshot a pass asks for. The
//! [`Renderer`](super::Renderer) keeps the last applied snapshot and only
//! re-issues fields that differ.

use glam::{Vec2, Vec4};
use smallvec::{SmallVec, smallvec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthTest {
    /// Depth testing off.
    Disabled,
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Primitive topology of draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    /// Tessellation input; substituted for `Triangles` by the renderer.
    Patches,
}

impl Topology {
    /// Primitives produced by `count` vertices.
    #[must_use]
    pub fn primitive_count(self, count: u32) -> u32 {
        match self {
            Self::Points => count,
            Self::Lines => count / 2,
            Self::LineStrip => count.saturating_sub(1),
            Self::Triangles | Self::Patches => count / 3,
            Self::TriangleStrip => count.saturating_sub(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RendererState {
    pub clear_color: bool,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub clear_color_value: Vec4,
    pub clear_depth_value: f32,

    pub write_color: bool,
    pub write_depth: bool,
    pub wireframe: bool,

    pub depth_test: DepthTest,
    pub cull_mode: CullMode,
    /// (source, destination) factors; `None` disables blending.
    pub blend: Option<(BlendFactor, BlendFactor)>,
    /// (factor, units) polygon offset; `None` disables it.
    pub depth_offset: Option<Vec2>,

    pub topology: Topology,
    /// Color attachments written by the fragment stage.
    pub draw_buffers: SmallVec<[u32; 4]>,
    pub seamless_cubemap: bool,
}

impl Default for RendererState {
    fn default() -> Self {
        Self {
            clear_color: true,
            clear_depth: true,
            clear_stencil: false,
            clear_color_value: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_depth_value: 1.0,
            write_color: true,
            write_depth: true,
            wireframe: false,
            depth_test: DepthTest::Less,
            cull_mode: CullMode::Back,
            blend: None,
            depth_offset: None,
            topology: Topology::Triangles,
            draw_buffers: smallvec![0],
            seamless_cubemap: true,
        }
    }
}

impl RendererState {
    /// Full-screen copy: clears color to white, no depth.
    #[must_use]
    pub fn blit() -> Self {
        Self {
            clear_color: true,
            clear_depth: false,
            clear_color_value: Vec4::ONE,
            write_depth: false,
            depth_test: DepthTest::Disabled,
            cull_mode: CullMode::None,
            ..Self::default()
        }
    }

    /// Depth-only rendering with a polygon offset.
    #[must_use]
    pub fn shadow_map(depth_offset: Vec2) -> Self {
        Self {
            clear_color: false,
            clear_depth: true,
            write_color: false,
            depth_offset: Some(depth_offset),
            draw_buffers: SmallVec::new(),
            ..Self::default()
        }
    }

    /// Overlay lines on top of an existing image.
    #[must_use]
    pub fn overlay_lines() -> Self {
        Self {
            clear_color: false,
            clear_depth: false,
            write_depth: false,
            cull_mode: CullMode::None,
            topology: Topology::Lines,
            ..Self::default()
        }
    }

    /// Blend the output onto the target instead of replacing it.
    #[must_use]
    pub fn additive() -> Self {
        Self {
            clear_color: false,
            blend: Some((BlendFactor::One, BlendFactor::One)),
            ..Self::blit()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let blit = RendererState::blit();
        assert!(blit.clear_color && !blit.clear_depth);
        assert_eq!(blit.clear_color_value, Vec4::ONE);
        assert_eq!(blit.depth_test, DepthTest::Disabled);

        let shadow = RendererState::shadow_map(Vec2::new(9.0, 1.0));
        assert!(!shadow.write_color && !shadow.clear_color);
        assert!(shadow.draw_buffers.is_empty());

        let add = RendererState::additive();
        assert!(!add.clear_color);
        assert_eq!(add.blend, Some((BlendFactor::One, BlendFactor::One)));
    }

    #[test]
    fn primitive_counts() {
        assert_eq!(Topology::Triangles.primitive_count(36), 12);
        assert_eq!(Topology::Lines.primitive_count(6), 3);
        assert_eq!(Topology::TriangleStrip.primitive_count(1), 0);
    }
}
