//! Render passes.
//!
//! A pass is one orderable step of a frame: it binds one target, applies one
//! [`RendererState`] and draws. Passes share the [`RenderPass`] capability
//! trait and live in the engine as `Vec<Box<dyn RenderPass>>`.
//!
//! ```text
//!  render(ctx)                      update(ctx)
//!   ├─ disabled? → return            ├─ disabled? → return
//!   ├─ reset counters, start timers  └─ prepare(ctx)
//!   ├─ execute(ctx)
//!   └─ stop timers, record stats
//! ```
//!
//! - [`GeometryPass`]: draws a drawable list, optionally with one override material
//! - [`ScreenSpacePass`]: draws the full-screen triangle with one material
//! - [`BloomPass`]: bright-pass, downsample, separable blur, additive blend
//! - [`TonemapPass`]: tonemaps or copies the HDR image onto the output

mod bloom;
mod geometry;
mod screen_space;
mod tonemap;

pub use bloom::{BloomControls, BloomPass};
pub use geometry::GeometryPass;
pub use screen_space::ScreenSpacePass;
pub use tonemap::TonemapPass;

use std::fmt;
use std::sync::Arc;

use crate::api::Device;
use crate::renderer::Renderer;
use crate::renderer::resource_manager::ResourceManager;
use crate::renderer::state::RendererState;
use crate::renderer::stats::{PassTimers, RenderStatistics};
use crate::resources::render_target::RenderTarget;
use crate::scene::Scene;

/// Everything a pass may touch while rendering.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn Device,
    pub renderer: &'a mut Renderer,
    pub resources: &'a mut ResourceManager,
    pub scene: Option<&'a Scene>,
}

/// Input of the update lifecycle.
#[derive(Clone, Copy)]
pub struct UpdateContext<'a> {
    pub scene: Option<&'a Scene>,
    pub delta_time: f32,
}

/// Name, enabled flag and measurements shared by every pass.
#[derive(Debug)]
pub struct PassBase {
    name: String,
    enabled: bool,
    timers: PassTimers,
}

impl PassBase {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            timers: PassTimers::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub trait RenderPass: fmt::Debug {
    fn base(&self) -> &PassBase;

    fn base_mut(&mut self) -> &mut PassBase;

    /// Pass-specific draw sequence.
    fn execute(&mut self, ctx: &mut FrameContext<'_>);

    /// Pass-specific CPU-side refresh.
    fn prepare(&mut self, _ctx: &UpdateContext<'_>) {}

    /// Target the pass writes to.
    fn target(&self) -> Option<&Arc<RenderTarget>> {
        None
    }

    fn state(&self) -> Option<&RendererState> {
        None
    }

    fn set_wireframe(&mut self, _wireframe: bool) {}

    // ------------------------------------------------------------------------
    // Provided
    // ------------------------------------------------------------------------

    fn name(&self) -> &str {
        self.base().name()
    }

    fn is_enabled(&self) -> bool {
        self.base().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.base_mut().enabled = enabled;
    }

    fn render(&mut self, ctx: &mut FrameContext<'_>) {
        if !self.is_enabled() {
            return;
        }
        ctx.renderer.reset_counters();
        self.base_mut().timers.begin(ctx.device);
        self.execute(ctx);
        let primitives = ctx.renderer.primitive_count();
        self.base_mut().timers.end(ctx.device, primitives);
    }

    fn update(&mut self, ctx: &UpdateContext<'_>) {
        if !self.is_enabled() {
            return;
        }
        self.prepare(ctx);
    }

    /// Measurements of the last render. Resolves the GPU time, which blocks
    /// until the query is available.
    fn statistics(&mut self, device: &mut dyn Device) -> RenderStatistics {
        self.base_mut().timers.read(device)
    }

    /// Measurements of the last render without waiting on the GPU.
    fn last_statistics(&self) -> RenderStatistics {
        self.base().timers.peek()
    }
}
