//! Scene graph.
//!
//! - Node: hierarchy, transform, optional geometry and material
//! - Transform: local position, rotation and scale
//! - Scene: node arena, lights, sky, lazy world matrices
//! - Camera: projection and view
//! - Light: directional and point lights

pub mod camera;
pub mod light;
pub mod node;
pub mod scene;
pub mod transform;

pub use camera::{Camera, ProjectionType};
pub use light::{Light, LightKind};
pub use node::Node;
pub use scene::Scene;
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    pub struct NodeKey;
    pub struct LightKey;
}
