//! Rendering Layer
//!
//! - [`Renderer`]: state cache and draw submission against a [`Device`](crate::api::Device)
//! - [`RenderEngine`]: pass-list construction and the per-frame update/render cycle
//! - [`passes`]: the [`RenderPass`](passes::RenderPass) capability and its implementations
//! - [`settings`]: serde-backed engine configuration
//!
//! ```text
//!  RenderEngine
//!   ├── ResourceManager  (material library, full-screen triangle, targets)
//!   ├── Renderer         (cached RendererState, current target)
//!   └── passes: Vec<Box<dyn RenderPass>>
//!         └── render(ctx) → Renderer::set_target / apply_state / render
//! ```

pub mod drawable;
pub mod engine;
pub mod gizmo;
pub mod ibl;
pub mod passes;
#[allow(clippy::module_inception)]
mod renderer;
pub mod resource_manager;
pub mod settings;
pub mod shadow;
pub mod state;
pub mod stats;

pub use drawable::{Drawable, Primitive, SceneDrawable};
pub use engine::RenderEngine;
pub use ibl::IblMaps;
pub use passes::{
    BloomControls, BloomPass, FrameContext, GeometryPass, PassBase, RenderPass, ScreenSpacePass,
    TonemapPass, UpdateContext,
};
pub use renderer::Renderer;
pub use resource_manager::ResourceManager;
pub use settings::{BloomSettings, EngineSettings, ShadowSettings};
pub use shadow::{BIAS_MATRIX, ShadowData, light_space_matrix};
pub use state::{BlendFactor, CullMode, DepthTest, RendererState, Topology};
pub use stats::RenderStatistics;
