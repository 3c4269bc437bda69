#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Square
//!
//! Frame-graph and resource-lifecycle core of a real-time 3D renderer.
//!
//! - [`api`]: the [`Device`] seam, handles and RAII resource ownership
//! - [`resources`]: CPU-side descriptions linked lazily to device objects
//! - [`scene`]: nodes, lights and cameras
//! - [`renderer`]: state cache, render passes and the [`RenderEngine`]

pub mod api;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use api::{Allocate, Device, Handle, HeadlessDevice, ResourceKind, SharedResource};
pub use errors::{Result, SquareError};
pub use renderer::{
    EngineSettings, RenderEngine, RenderPass, Renderer, RendererState, ResourceManager,
};
pub use resources::{
    Geometry, Material, MaterialLibrary, MeshBuilder, RenderTarget, ShaderProgram, Texture,
};
pub use scene::{Camera, Light, Node, Scene};
