//! GPU resource layer.
//!
//! - [`handle`]: opaque handles and RAII [`SharedResource`] ownership
//! - [`device`]: the [`Device`] trait every backend implements
//! - [`headless`]: an in-process recording device
//! - `gl` (feature `gl`): the OpenGL backend on top of `glow`

pub mod device;
pub mod handle;
pub mod headless;
pub mod timer;

#[cfg(feature = "gl")]
pub mod gl;

pub use device::{
    BufferMask, ColorBinding, DepthBinding, Device, DeviceError, FramebufferDescriptor,
    GeometryUpload, UniformLocation, check_errors,
};
pub use handle::{Handle, INVALID_HANDLE, Release, ReleaseQueue, ResourceKind, SharedResource};
pub use headless::{DeviceCall, Failures, HeadlessDevice};
pub use timer::GpuTimer;

use crate::errors::Result;

/// A CPU-side description that can be linked to one device resource.
///
/// Allocation is idempotent: a linked description returns `Ok` without
/// creating anything. On failure the description stays unlinked and every
/// partially created device object is released.
pub trait Allocate {
    fn allocate(&self, device: &mut dyn Device) -> Result<()>;

    fn is_linked(&self) -> bool;
}
