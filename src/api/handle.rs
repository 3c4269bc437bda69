//! Device Handles & Shared Resources
//!
//! Every GPU object is identified by an opaque integer [`Handle`]. A CPU-side
//! description (geometry, texture, program, render target, uniform block)
//! links to at most one [`SharedResource`], which owns the handle.
//!
//! ```text
//!  Description ──link──▶ SharedResource ──drop──▶ ReleaseQueue ──drain──▶ Device::collect_garbage
//! ```
//!
//! Dropping a resource never touches the device directly: the release is
//! queued over a `flume` channel and executed by the device the next time it
//! collects garbage on the thread that owns the context.

use std::fmt;

use flume::{Receiver, Sender};

/// Opaque device object name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

/// Sentinel meaning "not yet allocated".
pub const INVALID_HANDLE: Handle = Handle(u32::MAX);

impl Handle {
    /// Default framebuffer of the window surface.
    pub const DEFAULT_FRAMEBUFFER: Handle = Handle(0);

    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_HANDLE.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        INVALID_HANDLE
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({})", self.0)
        } else {
            f.write_str("Handle(INVALID)")
        }
    }
}

/// Kind of device object behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Geometry,
    Texture,
    DepthBuffer,
    Framebuffer,
    UniformBuffer,
    Shader,
    Program,
    TimerQuery,
}

/// A pending release: the object to delete on the device.
pub type Release = (ResourceKind, Handle);

/// RAII owner of one device object.
///
/// Created by a [`Device`](crate::api::Device); released when dropped.
pub struct SharedResource {
    kind: ResourceKind,
    handle: Handle,
    release: Option<Sender<Release>>,
}

impl SharedResource {
    /// Wraps an object that is owned elsewhere (e.g. the window's default
    /// framebuffer). Dropping it releases nothing.
    #[must_use]
    pub fn external(kind: ResourceKind, handle: Handle) -> Self {
        Self {
            kind,
            handle,
            release: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.is_valid()
    }

    /// Whether dropping this resource releases a device object.
    #[inline]
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for SharedResource {
    fn drop(&mut self) {
        if let Some(sender) = self.release.take()
            && self.handle.is_valid()
        {
            // The device may already be gone; nothing left to release then.
            let _ = sender.send((self.kind, self.handle));
        }
    }
}

impl fmt::Debug for SharedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResource")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("owned", &self.is_owned())
            .finish()
    }
}

/// Release channel embedded by device implementations.
#[derive(Debug)]
pub struct ReleaseQueue {
    sender: Sender<Release>,
    receiver: Receiver<Release>,
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Hands out an owning resource for a freshly created device object.
    #[must_use]
    pub fn track(&self, kind: ResourceKind, handle: Handle) -> SharedResource {
        SharedResource {
            kind,
            handle,
            release: Some(self.sender.clone()),
        }
    }

    /// Releases queued so far, without blocking.
    pub fn drain(&self) -> impl Iterator<Item = Release> + '_ {
        self.receiver.try_iter()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
