//! Allocation façade for engine-internal resources.
//!
//! [`ResourceManager`] creates the auxiliary color targets used between
//! passes and owns the one full-screen triangle every screen-space pass
//! draws. It also carries the [`MaterialLibrary`] so passes can look up the
//! utility programs they are built from.

use std::sync::Arc;

use glam::UVec2;

use crate::api::{Allocate, Device};
use crate::errors::Result;
use crate::resources::geometry::Geometry;
use crate::resources::material::SharedMaterial;
use crate::resources::material_library::MaterialLibrary;
use crate::resources::primitives::MeshBuilder;
use crate::resources::render_target::RenderTarget;
use crate::resources::texture::{Sampler, Texture, TextureFormat};

#[derive(Debug)]
enum TriangleState {
    Pending,
    Ready,
    Failed,
}

#[derive(Debug)]
pub struct ResourceManager {
    library: MaterialLibrary,
    screen_triangle: Arc<Geometry>,
    triangle_state: TriangleState,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(MaterialLibrary::new())
    }
}

impl ResourceManager {
    #[must_use]
    pub fn new(library: MaterialLibrary) -> Self {
        Self {
            library,
            screen_triangle: Arc::new(MeshBuilder::screen_triangle()),
            triangle_state: TriangleState::Pending,
        }
    }

    #[inline]
    #[must_use]
    pub fn library(&self) -> &MaterialLibrary {
        &self.library
    }

    #[inline]
    pub fn library_mut(&mut self) -> &mut MaterialLibrary {
        &mut self.library
    }

    /// New material on a library program.
    pub fn instantiate(&self, program: &str, name: &str) -> Result<SharedMaterial> {
        self.library.instantiate(program, name)
    }

    /// The full-screen triangle, allocated on first request.
    ///
    /// A failed allocation is logged once; screen-space passes then draw
    /// nothing.
    pub fn screen_triangle(&mut self, device: &mut dyn Device) -> Option<Arc<Geometry>> {
        match self.triangle_state {
            TriangleState::Ready => Some(Arc::clone(&self.screen_triangle)),
            TriangleState::Failed => None,
            TriangleState::Pending => match self.screen_triangle.allocate(device) {
                Ok(()) => {
                    self.triangle_state = TriangleState::Ready;
                    Some(Arc::clone(&self.screen_triangle))
                }
                Err(err) => {
                    log::error!("Full-screen triangle unavailable, post-processing disabled: {err}");
                    self.triangle_state = TriangleState::Failed;
                    None
                }
            },
        }
    }

    /// Single color attachment target of the given size.
    pub fn create_simple_color_target(
        &self,
        device: &mut dyn Device,
        width: u32,
        height: u32,
        format: TextureFormat,
        sampler: Sampler,
    ) -> Option<Arc<RenderTarget>> {
        let texture = Arc::new(Texture::new_2d(width, height, format, sampler));
        self.create_render_target(device, RenderTarget::color(texture, None))
    }

    /// Color target sized `source × scale`, rounded down.
    pub fn create_scaled_color_target(
        &self,
        device: &mut dyn Device,
        source: &RenderTarget,
        scale: f32,
        format: TextureFormat,
        sampler: Sampler,
    ) -> Option<Arc<RenderTarget>> {
        let size = scaled_size(source.size(), scale);
        self.create_simple_color_target(device, size.x, size.y, format, sampler)
    }

    /// Allocates `target`, logging and returning `None` on failure.
    pub fn create_render_target(
        &self,
        device: &mut dyn Device,
        target: RenderTarget,
    ) -> Option<Arc<RenderTarget>> {
        match target.allocate(device) {
            Ok(()) => Some(Arc::new(target)),
            Err(err) => {
                log::warn!("Render target '{}' not created: {err}", target.name());
                None
            }
        }
    }
}

/// `size × scale`, rounded down.
#[must_use]
pub fn scaled_size(size: UVec2, scale: f32) -> UVec2 {
    UVec2::new(
        (size.x as f32 * scale).floor() as u32,
        (size.y as f32 * scale).floor() as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Failures, HeadlessDevice, ResourceKind};

    #[test]
    fn scaled_size_rounds_down() {
        assert_eq!(scaled_size(UVec2::new(801, 599), 0.5), UVec2::new(400, 299));
        assert_eq!(scaled_size(UVec2::new(100, 100), 0.125), UVec2::new(12, 12));
    }

    #[test]
    fn zero_sized_target_is_none() {
        let mut device = HeadlessDevice::new();
        let manager = ResourceManager::default();
        let source = RenderTarget::default_framebuffer(4, 4);
        let target = manager.create_scaled_color_target(
            &mut device,
            &source,
            0.125,
            TextureFormat::RGBAHalf,
            Sampler::screen(),
        );
        assert!(target.is_none());
    }

    #[test]
    fn screen_triangle_is_allocated_once() {
        let mut device = HeadlessDevice::new();
        let mut manager = ResourceManager::default();
        assert!(manager.screen_triangle(&mut device).is_some());
        assert!(manager.screen_triangle(&mut device).is_some());
        assert_eq!(device.live_count(ResourceKind::Geometry), 1);
    }

    #[test]
    fn failed_screen_triangle_is_not_retried() {
        let mut device = HeadlessDevice::new();
        device.fail(Failures::GEOMETRY);
        let mut manager = ResourceManager::default();
        assert!(manager.screen_triangle(&mut device).is_none());
        device.heal(Failures::GEOMETRY);
        assert!(manager.screen_triangle(&mut device).is_none());
    }
}
