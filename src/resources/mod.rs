//! CPU-side resource descriptions.
//!
//! Every type here is inert until it is linked to a device resource through
//! [`Allocate`](crate::api::Allocate):
//! - Geometry: vertex/index data and bounds
//! - Texture: 2D textures and cubemaps
//! - RenderTarget: framebuffer attachment sets
//! - ShaderProgram: stage sources, defaults, uniform locations
//! - Material: a program plus buffered uniforms and textures
//! - UniformBlock: fixed-layout blocks shared across programs

pub mod geometry;
pub mod material;
pub mod material_library;
pub mod primitives;
pub mod render_target;
pub mod shader;
pub mod texture;
pub mod uniforms;

pub use geometry::{BoundingBox, Geometry, Vertex, VertexAttributes};
pub use material::{Material, MaterialLayer, SharedMaterial, UniformValue};
pub use material_library::{MaterialLibrary, programs};
pub use primitives::{LineSegment, MeshBuilder};
pub use render_target::{ColorAttachment, DepthAttachment, DepthFormat, RenderTarget};
pub use shader::{ShaderProgram, ShaderSource, ShaderStages, VALID_STAGE_COMBINATIONS};
pub use texture::{
    Sampler, Texture, TextureData, TextureDescriptor, TextureFilter, TextureFormat, TextureKind,
    TextureWrap,
};
pub use uniforms::{
    CameraUniforms, LightData, LightsUniforms, MAX_LIGHT_COUNT, NO_SHADOW, UniformBlock,
};
