use std::sync::Arc;

use crate::errors::{Result, SquareError};
use crate::renderer::resource_manager::ResourceManager;
use crate::renderer::state::RendererState;
use crate::resources::material_library::programs;
use crate::resources::render_target::RenderTarget;

use super::{FrameContext, PassBase, RenderPass, ScreenSpacePass};

/// Final HDR to output step: tonemapping, or a plain copy when disabled.
#[derive(Debug)]
pub struct TonemapPass {
    base: PassBase,
    tonemap: Option<ScreenSpacePass>,
    passthrough: ScreenSpacePass,
    tonemapping: bool,
}

impl TonemapPass {
    /// The passthrough program is required; the tonemapping one is used when
    /// present.
    pub fn new(
        resources: &ResourceManager,
        source: &RenderTarget,
        output: Arc<RenderTarget>,
        tonemapping: bool,
    ) -> Result<Self> {
        let input = source
            .color_texture(0)
            .cloned()
            .ok_or_else(|| SquareError::InvalidArgument("tonemap source has no color".into()))?;

        let copy = resources.instantiate(programs::BLIT, "Passthrough")?;
        {
            let mut m = copy.write();
            m.set_texture("screenTexture", Arc::clone(&input));
            m.set_uniform("intensity", 1.0_f32);
        }
        let passthrough =
            ScreenSpacePass::new("Passthrough", Arc::clone(&output), RendererState::blit(), copy);

        let tonemap = match resources.instantiate(programs::TONEMAPPING, "Tonemapping") {
            Ok(material) => {
                material.write().set_texture("screenTexture", input);
                Some(ScreenSpacePass::new(
                    "Tonemapping",
                    output,
                    RendererState::blit(),
                    material,
                ))
            }
            Err(err) => {
                log::warn!("Tonemapping unavailable, copying HDR image: {err}");
                None
            }
        };

        Ok(Self {
            base: PassBase::new("Tonemap"),
            tonemap,
            passthrough,
            tonemapping,
        })
    }

    #[inline]
    #[must_use]
    pub fn is_tonemapping(&self) -> bool {
        self.tonemapping && self.tonemap.is_some()
    }

    pub fn set_tonemapping(&mut self, tonemapping: bool) {
        self.tonemapping = tonemapping;
    }
}

impl RenderPass for TonemapPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        match &self.tonemap {
            Some(tonemap) if self.tonemapping => tonemap.draw(ctx),
            _ => self.passthrough.draw(ctx),
        };
    }

    fn target(&self) -> Option<&Arc<RenderTarget>> {
        self.passthrough.target()
    }
}
