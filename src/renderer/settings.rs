//! Engine Settings
//!
//! Configuration consumed by [`RenderEngine::new`](crate::renderer::RenderEngine::new)
//! and edited at runtime through the engine's setters.
//!
//! Settings can be written in code or loaded from JSON. Every key is optional;
//! missing keys keep their defaults.
//!
//! ```rust,ignore
//! use square::renderer::EngineSettings;
//!
//! let settings = EngineSettings::from_json(r#"{
//!     "render_scale": 0.5,
//!     "bloom": { "threshold": 1.5 }
//! }"#)?;
//! assert_eq!(settings.bloom.iterations, 1);
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::resources::texture::TextureFormat;

// ---------------------------------------------------------------------------
// ShadowSettings
// ---------------------------------------------------------------------------

/// Shadow map configuration shared by every shadow-casting light.
///
/// | Field                 | Default |
/// |-----------------------|---------|
/// | `enabled`             | `true`  |
/// | `map_size`            | `1024`  |
/// | `depth_offset_factor` | `9.0`   |
/// | `depth_offset_units`  | `1.0`   |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    /// Edge length of each square shadow map in texels.
    pub map_size: u32,
    /// Slope-scaled polygon offset applied while rendering shadow maps.
    pub depth_offset_factor: f32,
    /// Constant polygon offset applied while rendering shadow maps.
    pub depth_offset_units: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            map_size: 1024,
            depth_offset_factor: 9.0,
            depth_offset_units: 1.0,
        }
    }
}

impl ShadowSettings {
    /// (factor, units)
    #[inline]
    #[must_use]
    pub fn depth_offset(&self) -> Vec2 {
        Vec2::new(self.depth_offset_factor, self.depth_offset_units)
    }
}

// ---------------------------------------------------------------------------
// BloomSettings
// ---------------------------------------------------------------------------

/// Bloom chain configuration.
///
/// | Field        | Default    |
/// |--------------|------------|
/// | `enabled`    | `true`     |
/// | `scale`      | `0.125`    |
/// | `threshold`  | `2.0`      |
/// | `intensity`  | `0.25`     |
/// | `iterations` | `1`        |
/// | `format`     | `RGBAHalf` |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Blur target size relative to the working target.
    pub scale: f32,
    /// Luminance above which pixels bloom.
    pub threshold: f32,
    /// Weight of the blurred image when added back.
    pub intensity: f32,
    /// Vertical + horizontal blur pairs.
    pub iterations: u32,
    pub format: TextureFormat,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: 0.125,
            threshold: 2.0,
            intensity: 0.25,
            iterations: 1,
            format: TextureFormat::RGBAHalf,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
///
/// | Field          | Description                                   | Default |
/// |----------------|-----------------------------------------------|---------|
/// | `render_scale` | Working target size relative to the output    | `1.0`   |
/// | `shadows`      | See [`ShadowSettings`]                        |         |
/// | `bloom`        | See [`BloomSettings`]                         |         |
/// | `tonemapping`  | Tonemap, or copy the HDR image as is          | `true`  |
/// | `gizmos`       | Draw axis and light gizmos over the output    | `false` |
/// | `gizmo_bounds` | Also draw the scene bounding box              | `false` |
/// | `ibl`          | Precompute image-based lighting from the sky  | `true`  |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub render_scale: f32,
    pub shadows: ShadowSettings,
    pub bloom: BloomSettings,
    pub tonemapping: bool,
    pub gizmos: bool,
    pub gizmo_bounds: bool,
    pub ibl: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            render_scale: 1.0,
            shadows: ShadowSettings::default(),
            bloom: BloomSettings::default(),
            tonemapping: true,
            gizmos: false,
            gizmo_bounds: false,
            ibl: true,
        }
    }
}

impl EngineSettings {
    /// Parses a JSON settings document.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Clamps values that would produce empty targets.
    pub fn sanitize(&mut self) {
        if !(self.render_scale > 0.0) {
            log::warn!("render_scale {} is invalid, using 1.0", self.render_scale);
            self.render_scale = 1.0;
        }
        if !(self.bloom.scale > 0.0) {
            self.bloom.scale = BloomSettings::default().scale;
        }
        self.shadows.map_size = self.shadows.map_size.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings =
            EngineSettings::from_json(r#"{ "render_scale": 0.5, "bloom": { "threshold": 1.5 } }"#)
                .unwrap();
        assert_eq!(settings.render_scale, 0.5);
        assert_eq!(settings.bloom.threshold, 1.5);
        assert_eq!(settings.bloom.intensity, 0.25);
        assert_eq!(settings.shadows.map_size, 1024);
        assert!(settings.tonemapping);
    }

    #[test]
    fn invalid_scale_is_sanitized() {
        let settings = EngineSettings::from_json(r#"{ "render_scale": 0.0 }"#).unwrap();
        assert_eq!(settings.render_scale, 1.0);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            EngineSettings::from_json("{ nope"),
            Err(crate::errors::SquareError::Config(_))
        ));
    }
}
