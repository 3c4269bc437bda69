use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec3, Vec4};

use crate::api::{Allocate, Device, Handle, SharedResource};
use crate::errors::Result;
use crate::resources::shader::ShaderProgram;

/// Maximum number of lights uploaded to the lights block.
pub const MAX_LIGHT_COUNT: usize = 4;

/// Shadow slot of a light without a shadow map.
pub const NO_SHADOW: i32 = -1;

pub const CAMERA_BLOCK_NAME: &str = "CameraUBO";
pub const CAMERA_BLOCK_BINDING: u32 = 0;
pub const LIGHTS_BLOCK_NAME: &str = "LightsUBO";
pub const LIGHTS_BLOCK_BINDING: u32 = 1;

// ============================================================================
// Uniform Block
// ============================================================================

/// A fixed-layout value uploaded to a uniform buffer bound at `binding`.
///
/// [`upload`](Self::upload) compares against the last uploaded value and
/// skips the device write when nothing changed.
#[derive(Debug)]
pub struct UniformBlock<T: Pod + PartialEq> {
    name: &'static str,
    binding: u32,
    data: T,
    uploaded: Option<T>,
    link: OnceLock<SharedResource>,
}

impl<T: Pod + PartialEq> UniformBlock<T> {
    #[must_use]
    pub fn new(name: &'static str, binding: u32, data: T) -> Self {
        Self {
            name,
            binding,
            data,
            uploaded: None,
            link: OnceLock::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn set(&mut self, data: T) {
        self.data = data;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.uploaded.as_ref() != Some(&self.data)
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.link.get().map(SharedResource::handle)
    }

    /// Allocates on first use, then writes the buffer if the value changed.
    /// Returns whether a write was issued.
    pub fn upload(&mut self, device: &mut dyn Device) -> Result<bool> {
        self.allocate(device)?;
        if !self.is_dirty() {
            return Ok(false);
        }
        if let Some(buffer) = self.handle() {
            device.update_uniform_buffer(buffer, bytemuck::bytes_of(&self.data));
            self.uploaded = Some(self.data);
        }
        Ok(true)
    }

    /// Connects `program`'s block of this name to the binding point.
    pub fn attach(&self, program: &ShaderProgram, device: &mut dyn Device) -> bool {
        program.bind_uniform_block(device, self.name, self.binding)
    }
}

impl<T: Pod + PartialEq> Allocate for UniformBlock<T> {
    fn allocate(&self, device: &mut dyn Device) -> Result<()> {
        if self.link.get().is_some() {
            return Ok(());
        }
        let buffer = device.create_uniform_buffer(self.binding, std::mem::size_of::<T>())?;
        let _ = self.link.set(buffer);
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }
}

// ============================================================================
// Camera Block
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub projection: Mat4,
    pub inverse_projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub view_projection: Mat4,
    /// (width, height, 1/width, 1/height)
    pub dimensions: Vec4,
    /// (near, far, 1/near, 1/far)
    pub clip: Vec4,
}

impl Default for CameraUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, UVec2::ONE, 0.1, 100.0)
    }
}

impl CameraUniforms {
    #[must_use]
    pub fn new(projection: Mat4, view: Mat4, resolution: UVec2, near: f32, far: f32) -> Self {
        let w = resolution.x.max(1) as f32;
        let h = resolution.y.max(1) as f32;
        Self {
            projection,
            inverse_projection: projection.inverse(),
            view,
            inverse_view: view.inverse(),
            view_projection: projection * view,
            dimensions: Vec4::new(w, h, 1.0 / w, 1.0 / h),
            clip: Vec4::new(near, far, 1.0 / near, 1.0 / far),
        }
    }
}

// ============================================================================
// Lights Block
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightData {
    /// World position (w = 1) or direction towards the scene (w = 0).
    pub position: Vec4,
    /// Linear color in xyz, intensity in w.
    pub color: Vec4,
    pub light_matrix: Mat4,
    pub shadow_index: i32,
    pub _padding: [i32; 3],
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            position: Vec4::ZERO,
            color: Vec4::ZERO,
            light_matrix: Mat4::IDENTITY,
            shadow_index: NO_SHADOW,
            _padding: [0; 3],
        }
    }
}

impl LightData {
    #[must_use]
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: direction.extend(0.0),
            color: color.extend(intensity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shadow(mut self, index: i32, light_matrix: Mat4) -> Self {
        self.shadow_index = index;
        self.light_matrix = light_matrix;
        self
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsUniforms {
    pub ambient: Vec4,
    pub count: i32,
    pub _padding: [i32; 3],
    pub lights: [LightData; MAX_LIGHT_COUNT],
}

impl Default for LightsUniforms {
    fn default() -> Self {
        Self {
            ambient: Vec4::new(0.1, 0.1, 0.1, 1.0),
            count: 0,
            _padding: [0; 3],
            lights: [LightData::default(); MAX_LIGHT_COUNT],
        }
    }
}

impl LightsUniforms {
    /// Empties the light list, keeping the ambient term.
    pub fn clear(&mut self) {
        self.count = 0;
        self.lights = [LightData::default(); MAX_LIGHT_COUNT];
    }

    /// Appends a light. Returns `false` (and drops it) when full.
    pub fn push(&mut self, light: LightData) -> bool {
        let index = self.count as usize;
        if index >= MAX_LIGHT_COUNT {
            return false;
        }
        self.lights[index] = light;
        self.count += 1;
        true
    }

    #[must_use]
    pub fn active(&self) -> &[LightData] {
        &self.lights[..self.count as usize]
    }
}
