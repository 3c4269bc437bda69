//! Built-in geometry.

mod box_shape;
mod lines;

pub use box_shape::{create_cube, create_skybox};
pub use lines::{LineSegment, create_lines};

use crate::resources::geometry::{Geometry, Vertex, VertexAttributes};
use glam::{Vec2, Vec3};

/// Namespace for the built-in geometry constructors.
pub struct MeshBuilder;

impl MeshBuilder {
    /// Unit-normal cube of edge length `size`, indexed, 24 vertices.
    #[must_use]
    pub fn cube(size: f32) -> Geometry {
        create_cube(size)
    }

    /// Inward-facing cube of 36 vertices for sky rendering.
    #[must_use]
    pub fn skybox() -> Geometry {
        create_skybox()
    }

    /// One triangle covering the whole clip space.
    ///
    /// Vertices (-1,-1), (3,-1), (-1,3); uv (0,0), (2,0), (0,2).
    #[must_use]
    pub fn screen_triangle() -> Geometry {
        let vertex = |x: f32, y: f32| {
            Vertex::new(
                Vec3::new(x, y, 0.0),
                Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
                Vec3::Z,
            )
        };
        Geometry::primitive_set(
            vec![vertex(-1.0, -1.0), vertex(3.0, -1.0), vertex(-1.0, 3.0)],
            VertexAttributes::POSITION | VertexAttributes::UV,
        )
        .with_name("Screen Triangle")
    }

    /// Line list, two vertices per segment.
    #[must_use]
    pub fn lines(segments: &[LineSegment]) -> Geometry {
        create_lines(segments)
    }
}
