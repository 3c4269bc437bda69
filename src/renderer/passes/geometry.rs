use std::sync::Arc;

use crate::renderer::drawable::Drawable;
use crate::renderer::state::RendererState;
use crate::resources::material::SharedMaterial;
use crate::resources::render_target::RenderTarget;

use super::{FrameContext, PassBase, RenderPass};

/// Draws a list of drawables into one target.
///
/// With an override material every drawable is drawn with it instead of its
/// own (shadow maps, single-material overlays).
#[derive(Debug)]
pub struct GeometryPass {
    base: PassBase,
    target: Arc<RenderTarget>,
    state: RendererState,
    drawables: Vec<Arc<dyn Drawable>>,
    override_material: Option<SharedMaterial>,
}

impl GeometryPass {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: Arc<RenderTarget>,
        state: RendererState,
        drawables: Vec<Arc<dyn Drawable>>,
    ) -> Self {
        Self {
            base: PassBase::new(name),
            target,
            state,
            drawables,
            override_material: None,
        }
    }

    #[must_use]
    pub fn with_override_material(mut self, material: SharedMaterial) -> Self {
        self.override_material = Some(material);
        self
    }

    #[inline]
    #[must_use]
    pub fn drawables(&self) -> &[Arc<dyn Drawable>] {
        &self.drawables
    }

    #[inline]
    #[must_use]
    pub fn override_material(&self) -> Option<&SharedMaterial> {
        self.override_material.as_ref()
    }
}

impl RenderPass for GeometryPass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        if !ctx.renderer.set_target(ctx.device, &self.target) {
            return;
        }
        ctx.renderer.apply_state(ctx.device, &self.state);

        for drawable in &self.drawables {
            let material = self
                .override_material
                .as_ref()
                .unwrap_or_else(|| drawable.material());
            let mut material = material.write();
            drawable.pre_render(ctx.scene, &mut material);
            ctx.renderer
                .render(ctx.device, drawable.geometry(), &mut material);
            drawable.post_render(ctx.scene, &mut material);
        }
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
