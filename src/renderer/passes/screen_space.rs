use std::sync::Arc;

use crate::renderer::state::RendererState;
use crate::resources::material::SharedMaterial;
use crate::resources::render_target::RenderTarget;

use super::{FrameContext, PassBase, RenderPass};

/// Full-screen triangle drawn with one material into one target.
#[derive(Debug)]
pub struct ScreenSpacePass {
    base: PassBase,
    target: Arc<RenderTarget>,
    state: RendererState,
    material: SharedMaterial,
}

impl ScreenSpacePass {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: Arc<RenderTarget>,
        state: RendererState,
        material: SharedMaterial,
    ) -> Self {
        Self {
            base: PassBase::new(name),
            target,
            state,
            material,
        }
    }

    #[inline]
    #[must_use]
    pub fn material(&self) -> &SharedMaterial {
        &self.material
    }

    /// Draws without timers; used directly by composite passes.
    pub fn draw(&self, ctx: &mut FrameContext<'_>) -> bool {
        let Some(triangle) = ctx.resources.screen_triangle(ctx.device) else {
            return false;
        };
        if !ctx.renderer.set_target(ctx.device, &self.target) {
            return false;
        }
        ctx.renderer.apply_state(ctx.device, &self.state);
        let mut material = self.material.write();
        ctx.renderer.render(ctx.device, &triangle, &mut material)
    }
}

impl RenderPass for ScreenSpacePass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        self.draw(ctx);
    }

    fn target(&self) -> Option<&Arc<RenderTarget>> {
        Some(&self.target)
    }

    fn state(&self) -> Option<&RendererState> {
        Some(&self.state)
    }

    fn set_wireframe(&mut self, wireframe: bool) {
        self.state.wireframe = wireframe;
    }
}
