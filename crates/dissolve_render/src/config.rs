//! Renderer configuration.
//!
//! Loaded once at startup (usually embedded in the overlay's TOML file);
//! every field has a default so an empty table is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{DissolveError, DissolveResult};
use crate::gpu::{ApiVersion, BlendMode};

/// Tunables for [`DustRenderer`](crate::DustRenderer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Grid cell size in pixels; also the drawn particle size.
    pub particle_size: u32,
    /// Seconds an effect lives before it is removed.
    pub lifetime_secs: f32,
    /// Seconds for the reveal boundary to sweep the whole capture.
    pub reveal_secs: f32,
    /// Upper bound for one frame's delta, in seconds.
    pub max_frame_delta_secs: f32,
    /// Oldest API version accepted when the device reports one.
    pub min_api_version: ApiVersion,
    /// Clear color, RGBA.
    pub clear_color: [f32; 4],
    /// Blend equation for dust and sprite.
    pub blend: BlendMode,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            particle_size: 2,
            lifetime_secs: 2.5,
            reveal_secs: 0.3,
            max_frame_delta_secs: 0.25,
            min_api_version: ApiVersion::MIN_COMPUTE,
            clear_color: [0.0; 4],
            blend: BlendMode::AlphaBlend,
        }
    }
}

impl RendererConfig {
    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] naming the first offending field.
    pub fn validate(&self) -> DissolveResult<()> {
        if self.particle_size == 0 {
            return Err(DissolveError::Config("particle_size must be positive".into()));
        }
        positive("lifetime_secs", self.lifetime_secs)?;
        positive("reveal_secs", self.reveal_secs)?;
        positive("max_frame_delta_secs", self.max_frame_delta_secs)?;
        if self.reveal_secs > self.lifetime_secs {
            return Err(DissolveError::Config(format!(
                "reveal_secs ({}) exceeds lifetime_secs ({})",
                self.reveal_secs, self.lifetime_secs
            )));
        }
        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(DissolveError::Config(
                "clear_color components must be within 0..=1".into(),
            ));
        }
        Ok(())
    }
}

fn positive(field: &str, value: f32) -> DissolveResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(DissolveError::Config(format!(
            "{field} must be a positive number of seconds, got {value}"
        )))
    }
}
