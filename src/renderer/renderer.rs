//! State-diffing draw submission.
//!
//! [`Renderer`] owns the cached device state. Every setter compares the
//! requested value against what it last issued and only talks to the device
//! when they differ. The first [`apply_state`](Renderer::apply_state) after
//! construction (or [`invalidate`](Renderer::invalidate)) issues everything.

use std::sync::Arc;

use glam::{UVec2, Vec4};
use smallvec::SmallVec;

use crate::api::{Allocate, BufferMask, Device, Handle};
use crate::resources::geometry::Geometry;
use crate::resources::material::{Material, UniformValue};
use crate::resources::render_target::RenderTarget;
use crate::resources::texture::{Texture, TextureFilter, TextureKind};

use super::state::{RendererState, Topology};

#[derive(Debug, Default)]
pub struct Renderer {
    state: RendererState,
    initialized: bool,
    // Last values actually sent to the device.
    clear_color_value: Option<Vec4>,
    clear_depth_value: Option<f32>,
    draw_buffers: Option<SmallVec<[u32; 4]>>,
    target: Option<(Handle, UVec2)>,
    primitives: u64,
    draw_calls: u64,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets all cached state; the next apply re-issues every field.
    pub fn invalidate(&mut self) {
        self.initialized = false;
        self.clear_color_value = None;
        self.clear_depth_value = None;
        self.draw_buffers = None;
        self.target = None;
    }

    /// Last applied state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &RendererState {
        &self.state
    }

    #[inline]
    #[must_use]
    pub fn current_target(&self) -> Option<Handle> {
        self.target.map(|(handle, _)| handle)
    }

    // ========================================================================
    // Counters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn primitive_count(&self) -> u64 {
        self.primitives
    }

    #[inline]
    #[must_use]
    pub fn draw_call_count(&self) -> u64 {
        self.draw_calls
    }

    pub fn reset_counters(&mut self) {
        self.primitives = 0;
        self.draw_calls = 0;
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Binds `target` unless it is already current. Returns `false` when the
    /// target is not linked.
    pub fn set_target(&mut self, device: &mut dyn Device, target: &RenderTarget) -> bool {
        let Some(handle) = target.handle() else {
            log::warn!("Render target '{}' is not allocated", target.name());
            return false;
        };
        let binding = (handle, target.size());
        if self.target == Some(binding) {
            return true;
        }
        device.bind_framebuffer(handle, binding.1);
        self.target = Some(binding);
        // Draw buffers belong to the framebuffer object.
        self.draw_buffers = None;
        true
    }

    /// Copies the selected planes of `source` into `destination`.
    /// Nothing happens when `mask` is empty.
    pub fn blit(
        &mut self,
        device: &mut dyn Device,
        source: &RenderTarget,
        destination: &RenderTarget,
        mask: BufferMask,
        filter: TextureFilter,
    ) -> bool {
        if mask.is_empty() {
            return false;
        }
        let (Some(src), Some(dst)) = (source.handle(), destination.handle()) else {
            log::warn!(
                "Cannot blit '{}' to '{}': target not allocated",
                source.name(),
                destination.name()
            );
            return false;
        };
        device.blit_framebuffer((src, source.size()), (dst, destination.size()), mask, filter);
        // The blit rebinds both framebuffers.
        self.target = None;
        self.draw_buffers = None;
        true
    }

    pub fn regenerate_mipmaps(&mut self, device: &mut dyn Device, texture: &Texture) {
        if let Some(handle) = texture.handle() {
            device.generate_mipmaps(texture.kind(), handle);
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Issues the fields of `state` that differ from the cached ones, then
    /// clears the planes `state` asks for.
    pub fn apply_state(&mut self, device: &mut dyn Device, state: &RendererState) {
        let force = !self.initialized;
        let current = &self.state;

        if force || state.wireframe != current.wireframe {
            device.set_polygon_mode(state.wireframe);
        }
        if force || state.write_color != current.write_color {
            device.set_color_mask(state.write_color);
        }
        if force || state.write_depth != current.write_depth {
            device.set_depth_mask(state.write_depth);
        }
        if state.clear_color && self.clear_color_value != Some(state.clear_color_value) {
            device.set_clear_color(state.clear_color_value);
            self.clear_color_value = Some(state.clear_color_value);
        }
        if state.clear_depth && self.clear_depth_value != Some(state.clear_depth_value) {
            device.set_clear_depth(state.clear_depth_value);
            self.clear_depth_value = Some(state.clear_depth_value);
        }
        if force || state.blend != current.blend {
            device.set_blend(state.blend);
        }
        if force || state.depth_offset != current.depth_offset {
            device.set_depth_offset(state.depth_offset);
        }
        if force || state.depth_test != current.depth_test {
            device.set_depth_test(state.depth_test);
        }
        if force || state.cull_mode != current.cull_mode {
            device.set_cull_mode(state.cull_mode);
        }
        if force || state.seamless_cubemap != current.seamless_cubemap {
            device.set_seamless_cubemap(state.seamless_cubemap);
        }
        if self.draw_buffers.as_ref() != Some(&state.draw_buffers) {
            device.set_draw_buffers(&state.draw_buffers);
            self.draw_buffers = Some(state.draw_buffers.clone());
        }

        self.state = state.clone();
        self.initialized = true;

        let mut mask = BufferMask::empty();
        mask.set(BufferMask::COLOR, state.clear_color);
        mask.set(BufferMask::DEPTH, state.clear_depth);
        mask.set(BufferMask::STENCIL, state.clear_stencil);
        if !mask.is_empty() {
            device.clear(mask);
        }
    }

    // ========================================================================
    // Draw
    // ========================================================================

    /// Draws `geometry` with `material` using the current state.
    ///
    /// Binds the material (which flushes its uniforms), its textures and the
    /// geometry, issues one draw and unbinds in reverse order. Unallocated
    /// resources are linked on first use; failures skip the draw.
    pub fn render(
        &mut self,
        device: &mut dyn Device,
        geometry: &Geometry,
        material: &mut Material,
    ) -> bool {
        if let Err(err) = geometry.allocate(device) {
            log::error!("Geometry '{}' skipped: {err}", geometry.name());
            return false;
        }
        let Some(geometry_handle) = geometry.handle() else {
            return false;
        };
        if let Err(err) = material.program().allocate(device) {
            log::error!("Material '{}' skipped: {err}", material.name());
            return false;
        }
        if !material.bind(device) {
            return false;
        }

        let program = Arc::clone(material.program());
        let mut units: SmallVec<[(u32, TextureKind); 8]> = SmallVec::new();
        material.with_bound_textures(|textures| {
            for &(name, texture) in textures {
                if let Err(err) = texture.allocate(device) {
                    log::warn!("Texture '{}' for '{name}' unavailable: {err}", texture.name());
                    continue;
                }
                let unit = units.len() as u32;
                program.set_uniform(device, name, &UniformValue::Int(unit as i32));
                device.bind_texture(unit, texture.kind(), texture.handle());
                units.push((unit, texture.kind()));
            }
        });

        let topology = match self.state.topology {
            Topology::Triangles if program.has_tessellation() => Topology::Patches,
            topology => topology,
        };

        device.bind_geometry(Some(geometry_handle));
        let count = if geometry.is_indexed() {
            let count = geometry.index_count();
            device.draw_indexed(topology, count);
            count
        } else {
            let count = geometry.vertex_count();
            device.draw_arrays(topology, 0, count);
            count
        };
        self.primitives += u64::from(topology.primitive_count(count));
        self.draw_calls += 1;

        device.bind_geometry(None);
        for (unit, kind) in units.into_iter().rev() {
            device.bind_texture(unit, kind, None);
        }
        material.unbind(device);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeviceCall, HeadlessDevice};

    #[test]
    fn second_apply_is_silent() {
        let mut device = HeadlessDevice::new();
        let mut renderer = Renderer::new();
        let state = RendererState::default();

        renderer.apply_state(&mut device, &state);
        assert!(device.state_change_count() > 0);

        device.clear_calls();
        renderer.apply_state(&mut device, &state);
        assert_eq!(device.state_change_count(), 0);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::Clear(_))), 1);
    }

    #[test]
    fn invalidate_forces_full_apply() {
        let mut device = HeadlessDevice::new();
        let mut renderer = Renderer::new();
        let state = RendererState::default();
        renderer.apply_state(&mut device, &state);
        let first = device.state_change_count();

        device.clear_calls();
        renderer.invalidate();
        renderer.apply_state(&mut device, &state);
        assert_eq!(device.state_change_count(), first);
    }
}
