use glam::Vec3;

use crate::resources::uniforms::LightData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Infinitely far light shining along `direction`.
    Directional { direction: Vec3 },
    Point { position: Vec3 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Only honored by light kinds that support shadow maps.
    pub cast_shadows: bool,
}

impl Light {
    /// Directional lights cast shadows unless told otherwise.
    #[must_use]
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize_or(Vec3::NEG_Y),
            },
            color,
            intensity,
            cast_shadows: true,
        }
    }

    #[must_use]
    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point { position },
            color,
            intensity,
            cast_shadows: false,
        }
    }

    #[must_use]
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    #[must_use]
    pub fn supports_shadows(&self) -> bool {
        matches!(self.kind, LightKind::Directional { .. })
    }

    /// Gets a shadow map in the next pass list.
    #[must_use]
    pub fn is_shadow_caster(&self) -> bool {
        self.cast_shadows && self.supports_shadows()
    }

    #[must_use]
    pub fn direction(&self) -> Option<Vec3> {
        match self.kind {
            LightKind::Directional { direction } => Some(direction),
            LightKind::Point { .. } => None,
        }
    }

    #[must_use]
    pub fn position(&self) -> Option<Vec3> {
        match self.kind {
            LightKind::Point { position } => Some(position),
            LightKind::Directional { .. } => None,
        }
    }

    /// Entry for the lights block, without shadow data.
    #[must_use]
    pub fn to_uniform(&self) -> LightData {
        match self.kind {
            LightKind::Directional { direction } => {
                LightData::directional(direction, self.color, self.intensity)
            }
            LightKind::Point { position } => LightData::point(position, self.color, self.intensity),
        }
    }
}
