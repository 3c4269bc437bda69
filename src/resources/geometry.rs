use std::sync::OnceLock;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::api::{Allocate, Device, GeometryUpload, Handle, SharedResource};
use crate::errors::Result;

// ============================================================================
// Bounding Volume
// ============================================================================

/// Axis-aligned bounding box.
///
/// An empty box has `min > max` and absorbs nothing when transformed; it is
/// the identity of [`union`](Self::union).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut acc, p| {
            acc.min = acc.min.min(p);
            acc.max = acc.max.max(p);
            acc
        })
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The eight corners, `min` first and `max` last.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after `matrix`, re-fitted around the moved corners.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(self.corners().into_iter().map(|p| matrix.transform_point3(p)))
    }
}

// ============================================================================
// Vertex Format
// ============================================================================

bitflags! {
    /// Vertex attributes that carry meaningful data.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VertexAttributes: u8 {
        const POSITION = 1 << 0;
        const UV       = 1 << 1;
        const NORMAL   = 1 << 2;
        const TANGENT  = 1 << 3;
    }
}

/// Interleaved vertex shared by every geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub tangent: Vec4,
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, uv: Vec2, normal: Vec3) -> Self {
        Self {
            position,
            uv,
            normal,
            tangent: Vec4::ZERO,
        }
    }

    #[must_use]
    pub fn position(position: Vec3) -> Self {
        Self::new(position, Vec2::ZERO, Vec3::ZERO)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Vertex (and optional index) data plus its local bounds.
///
/// An indexed geometry is drawn as a mesh with indexed draws; a geometry
/// without indices is a loose primitive set drawn with array draws.
#[derive(Debug)]
pub struct Geometry {
    name: String,
    vertices: Vec<Vertex>,
    indices: Option<Vec<u32>>,
    attributes: VertexAttributes,
    bounds: BoundingBox,
    dynamic: bool,
    link: OnceLock<SharedResource>,
}

impl Geometry {
    /// Indexed mesh.
    #[must_use]
    pub fn mesh(vertices: Vec<Vertex>, indices: Vec<u32>, attributes: VertexAttributes) -> Self {
        Self::build(vertices, Some(indices), attributes)
    }

    /// Non-indexed primitive set.
    #[must_use]
    pub fn primitive_set(vertices: Vec<Vertex>, attributes: VertexAttributes) -> Self {
        Self::build(vertices, None, attributes)
    }

    fn build(vertices: Vec<Vertex>, indices: Option<Vec<u32>>, attributes: VertexAttributes) -> Self {
        let bounds = BoundingBox::from_points(vertices.iter().map(|v| v.position));
        Self {
            name: String::from("Geometry"),
            vertices,
            indices,
            attributes: attributes | VertexAttributes::POSITION,
            bounds,
            dynamic: false,
            link: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hints the device that the buffers will be rewritten.
    #[must_use]
    pub fn with_dynamic_usage(mut self) -> Self {
        self.dynamic = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.indices.as_ref().is_some_and(|i| !i.is_empty())
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn index_count(&self) -> u32 {
        self.indices.as_ref().map_or(0, |i| i.len() as u32)
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> VertexAttributes {
        self.attributes
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        self.link.get().map(SharedResource::handle)
    }
}

impl Allocate for Geometry {
    fn allocate(&self, device: &mut dyn Device) -> Result<()> {
        if self.link.get().is_some() {
            return Ok(());
        }
        let upload = GeometryUpload {
            vertices: bytemuck::cast_slice(&self.vertices),
            vertex_count: self.vertex_count(),
            stride: std::mem::size_of::<Vertex>() as u32,
            attributes: self.attributes,
            indices: self.indices.as_deref(),
            dynamic: self.dynamic,
        };
        let resource = device.create_geometry(&upload)?;
        let _ = self.link.set(resource);
        Ok(())
    }

    fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_is_union_identity() {
        let b = BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE);
        assert_eq!(BoundingBox::EMPTY.union(&b), b);
        assert!(BoundingBox::EMPTY.transform(&Mat4::IDENTITY).is_empty());
    }

    #[test]
    fn geometry_bounds_cover_all_vertices() {
        let geo = Geometry::primitive_set(
            vec![
                Vertex::position(Vec3::new(-2.0, 0.0, 1.0)),
                Vertex::position(Vec3::new(3.0, 4.0, -1.0)),
            ],
            VertexAttributes::POSITION,
        );
        assert_eq!(geo.bounds().min, Vec3::new(-2.0, 0.0, -1.0));
        assert_eq!(geo.bounds().max, Vec3::new(3.0, 4.0, 1.0));
        assert!(!geo.is_indexed());
    }
}
