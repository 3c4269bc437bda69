use std::sync::Arc;

use crate::api::{BufferMask, Device};
use crate::errors::{Result, SquareError};
use crate::renderer::resource_manager::ResourceManager;
use crate::renderer::settings::BloomSettings;
use crate::renderer::state::RendererState;
use crate::resources::material::SharedMaterial;
use crate::resources::material_library::programs;
use crate::resources::render_target::RenderTarget;
use crate::resources::texture::{Sampler, TextureFilter};

use super::{FrameContext, PassBase, RenderPass, ScreenSpacePass};

/// Materials whose uniforms are edited at runtime.
#[derive(Debug, Clone)]
pub struct BloomControls {
    pub highpass: SharedMaterial,
    pub blend: SharedMaterial,
}

impl BloomControls {
    pub fn set_threshold(&self, threshold: f32) {
        self.highpass.write().set_uniform("threshold", threshold);
    }

    pub fn set_intensity(&self, intensity: f32) {
        self.blend.write().set_uniform("intensity", intensity);
    }
}

/// Bloom on `source`, in place.
///
/// ```text
///  source ─highpass─▶ bright ─blit─▶ ping ─┬─vblur─▶ pong ─hblur─▶ ping ─┐ × N
///                                          └──────────────────────────────┘
///  ping ─blend(One, One)─▶ source
/// ```
#[derive(Debug)]
pub struct BloomPass {
    base: PassBase,
    source: Arc<RenderTarget>,
    highpass: ScreenSpacePass,
    ping: Arc<RenderTarget>,
    vertical: ScreenSpacePass,
    horizontal: ScreenSpacePass,
    blend: ScreenSpacePass,
    iterations: u32,
}

impl BloomPass {
    /// Allocates the bloom targets and materials. Fails when a program is
    /// missing or a target cannot be created.
    pub fn new(
        device: &mut dyn Device,
        resources: &ResourceManager,
        source: Arc<RenderTarget>,
        settings: &BloomSettings,
    ) -> Result<Self> {
        let input = source
            .color_texture(0)
            .cloned()
            .ok_or_else(|| SquareError::InvalidArgument("bloom source has no color".into()))?;

        let bright = resources
            .create_scaled_color_target(device, &source, 1.0, settings.format, Sampler::screen())
            .ok_or_else(|| target_error("bright"))?;
        let ping = resources
            .create_scaled_color_target(device, &source, settings.scale, settings.format, Sampler::screen())
            .ok_or_else(|| target_error("ping"))?;
        let pong = resources
            .create_scaled_color_target(device, &ping, 1.0, settings.format, Sampler::screen())
            .ok_or_else(|| target_error("pong"))?;
        let ping_color = ping
            .color_texture(0)
            .cloned()
            .ok_or_else(|| target_error("ping"))?;
        let pong_color = pong
            .color_texture(0)
            .cloned()
            .ok_or_else(|| target_error("pong"))?;

        let highpass = resources.instantiate(programs::HIGHPASS_FILTER, "Bloom.Highpass")?;
        {
            let mut m = highpass.write();
            m.set_texture("image", input);
            m.set_uniform("threshold", settings.threshold);
        }

        let vertical = resources.instantiate(programs::VERTICAL_BLUR, "Bloom.VerticalBlur")?;
        {
            let mut m = vertical.write();
            m.set_texture("image", Arc::clone(&ping_color));
            m.set_uniform("dim", ping.dimensions());
        }

        let horizontal = resources.instantiate(programs::HORIZONTAL_BLUR, "Bloom.HorizontalBlur")?;
        {
            let mut m = horizontal.write();
            m.set_texture("image", pong_color);
            m.set_uniform("dim", pong.dimensions());
        }

        let blend = resources.instantiate(programs::BLIT, "Bloom.Blend")?;
        {
            let mut m = blend.write();
            m.set_texture("screenTexture", ping_color);
            m.set_uniform("intensity", settings.intensity);
        }

        Ok(Self {
            base: PassBase::new("Bloom"),
            highpass: ScreenSpacePass::new("Bloom Highpass", bright, RendererState::blit(), highpass),
            vertical: ScreenSpacePass::new(
                "Bloom Vertical Blur",
                pong,
                RendererState::blit(),
                vertical,
            ),
            horizontal: ScreenSpacePass::new(
                "Bloom Horizontal Blur",
                Arc::clone(&ping),
                RendererState::blit(),
                horizontal,
            ),
            blend: ScreenSpacePass::new(
                "Bloom Blend",
                Arc::clone(&source),
                RendererState::additive(),
                blend,
            ),
            source,
            ping,
            iterations: settings.iterations,
        })
    }

    #[must_use]
    pub fn controls(&self) -> BloomControls {
        BloomControls {
            highpass: Arc::clone(self.highpass.material()),
            blend: Arc::clone(self.blend.material()),
        }
    }

    #[inline]
    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl RenderPass for BloomPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        if !self.highpass.draw(ctx) {
            return;
        }
        if let Some(bright) = self.highpass.target() {
            ctx.renderer.blit(
                ctx.device,
                bright,
                &self.ping,
                BufferMask::COLOR,
                TextureFilter::Linear,
            );
        }
        for _ in 0..self.iterations {
            self.vertical.draw(ctx);
            self.horizontal.draw(ctx);
        }
        self.blend.draw(ctx);
    }

    fn target(&self) -> Option<&Arc<RenderTarget>> {
        Some(&self.source)
    }
}

fn target_error(which: &str) -> SquareError {
    SquareError::InvalidRenderTarget(format!("bloom {which} target could not be created"))
}
