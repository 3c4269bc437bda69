use glam::Vec3;

use crate::resources::geometry::{Geometry, Vertex, VertexAttributes};

/// A colored line from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec3,
}

impl LineSegment {
    #[must_use]
    pub fn new(start: Vec3, end: Vec3, color: Vec3) -> Self {
        Self { start, end, color }
    }
}

/// Builds a line list. The color travels in the normal slot.
#[must_use]
pub fn create_lines(segments: &[LineSegment]) -> Geometry {
    let vertices = segments
        .iter()
        .flat_map(|s| {
            [
                Vertex::new(s.start, glam::Vec2::ZERO, s.color),
                Vertex::new(s.end, glam::Vec2::ZERO, s.color),
            ]
        })
        .collect();
    Geometry::primitive_set(vertices, VertexAttributes::POSITION | VertexAttributes::NORMAL)
        .with_name("Lines")
        .with_dynamic_usage()
}
