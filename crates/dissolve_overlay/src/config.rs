//! Overlay configuration.
//!
//! ```toml
//! frame_delta_cap_secs = 0.0666
//! command_queue_capacity = 64
//!
//! [renderer]
//! particle_size = 3
//! ```

use std::path::Path;

use dissolve_render::{DissolveError, DissolveResult, RendererConfig};
use serde::{Deserialize, Serialize};

/// Tunables for [`DustOverlay`](crate::DustOverlay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Largest delta the frame clock hands to the renderer, in seconds.
    pub frame_delta_cap_secs: f32,
    /// Start commands that may wait for the render thread.
    pub command_queue_capacity: usize,
    /// Engine settings.
    pub renderer: RendererConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            frame_delta_cap_secs: 1.0 / 15.0,
            command_queue_capacity: 64,
            renderer: RendererConfig::default(),
        }
    }
}

impl OverlayConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] on parse or validation failure.
    pub fn from_toml_str(source: &str) -> DissolveResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| DissolveError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] when the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> DissolveResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| DissolveError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Rejects values the overlay cannot run with.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] naming the first offending field.
    pub fn validate(&self) -> DissolveResult<()> {
        if !self.frame_delta_cap_secs.is_finite() || self.frame_delta_cap_secs <= 0.0 {
            return Err(DissolveError::Config(format!(
                "frame_delta_cap_secs must be positive, got {}",
                self.frame_delta_cap_secs
            )));
        }
        if self.command_queue_capacity == 0 {
            return Err(DissolveError::Config(
                "command_queue_capacity must be at least 1".to_string(),
            ));
        }
        self.renderer.validate()
    }
}
