use glam::{Vec2, Vec3};

use crate::resources::geometry::{Geometry, Vertex, VertexAttributes};

// (normal, tangent-u, tangent-v) of each face
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
];

#[must_use]
pub fn create_cube(size: f32) -> Geometry {
    let half = size * 0.5;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in FACES {
        let base = vertices.len() as u32;
        // Counter-clockwise seen from outside
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + u * su + v * sv) * half;
            let uv = Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5);
            let mut vertex = Vertex::new(position, uv, normal);
            vertex.tangent = u.extend(1.0);
            vertices.push(vertex);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Geometry::mesh(
        vertices,
        indices,
        VertexAttributes::POSITION
            | VertexAttributes::UV
            | VertexAttributes::NORMAL
            | VertexAttributes::TANGENT,
    )
    .with_name("Cube")
}

/// Position-only cube with faces wound towards the inside.
#[must_use]
pub fn create_skybox() -> Geometry {
    let mut vertices = Vec::with_capacity(36);
    for (normal, u, v) in FACES {
        let corner = |su: f32, sv: f32| Vertex::position(normal + u * su + v * sv);
        let (a, b, c, d) = (
            corner(-1.0, -1.0),
            corner(1.0, -1.0),
            corner(1.0, 1.0),
            corner(-1.0, 1.0),
        );
        vertices.extend_from_slice(&[a, c, b, a, d, c]);
    }
    Geometry::primitive_set(vertices, VertexAttributes::POSITION).with_name("Skybox")
}
