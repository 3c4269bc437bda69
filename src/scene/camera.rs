use glam::{Mat4, UVec2, Vec3};

use crate::resources::uniforms::CameraUniforms;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionType {
    /// Vertical field of view in radians.
    Perspective { fov_y: f32 },
    /// Half height of the view volume in world units.
    Orthographic { half_height: f32 },
}

/// Camera with OpenGL clip conventions (depth in [-1, 1]).
#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub projection_type: ProjectionType,
    pub near: f32,
    pub far: f32,

    position: Vec3,
    target: Vec3,
    up: Vec3,
    resolution: UVec2,
}

impl Camera {
    /// `fov_y` in degrees.
    #[must_use]
    pub fn new_perspective(fov_y: f32, resolution: UVec2, near: f32, far: f32) -> Self {
        Self {
            name: String::from("Camera"),
            projection_type: ProjectionType::Perspective {
                fov_y: fov_y.to_radians(),
            },
            near,
            far,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            resolution,
        }
    }

    #[must_use]
    pub fn new_orthographic(half_height: f32, resolution: UVec2, near: f32, far: f32) -> Self {
        Self {
            projection_type: ProjectionType::Orthographic { half_height },
            ..Self::new_perspective(60.0, resolution, near, far)
        }
    }

    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.position = position;
        self.target = target;
        self.up = up;
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: UVec2) {
        self.resolution = resolution;
    }

    /// Width over height.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        self.resolution.x.max(1) as f32 / self.resolution.y.max(1) as f32
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection_type {
            ProjectionType::Perspective { fov_y } => {
                Mat4::perspective_rh_gl(fov_y, self.aspect(), self.near, self.far)
            }
            ProjectionType::Orthographic { half_height } => {
                let half_width = half_height * self.aspect();
                Mat4::orthographic_rh_gl(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Contents of the camera block for this frame.
    #[must_use]
    pub fn uniforms(&self) -> CameraUniforms {
        CameraUniforms::new(
            self.projection_matrix(),
            self.view_matrix(),
            self.resolution,
            self.near,
            self.far,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn aspect_is_width_over_height() {
        let cam = Camera::new_perspective(60.0, UVec2::new(1600, 900), 0.1, 100.0);
        assert!((cam.aspect() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn near_plane_maps_to_minus_one() {
        let mut cam = Camera::new_perspective(60.0, UVec2::new(800, 800), 1.0, 10.0);
        cam.look_at(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let clip = cam.view_projection_matrix() * Vec4::new(0.0, 0.0, -1.0, 1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-5);
    }
}
