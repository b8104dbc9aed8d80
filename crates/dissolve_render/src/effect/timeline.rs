//! Reveal and lifetime timing.
//!
//! Time is accumulated in whole microseconds. Summing `0.1` as `f32` 25 times
//! lands just above 2.5, which would end an effect one frame early; integer
//! microseconds keep the lifetime boundary exact.

use crate::config::RendererConfig;

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Converts seconds to whole microseconds. NaN and negatives become zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn secs_to_micros(secs: f32) -> u64 {
    if secs.is_nan() || secs <= 0.0 {
        return 0;
    }
    (f64::from(secs) * MICROS_PER_SEC).round() as u64
}

/// Converts microseconds to seconds.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn micros_to_secs(micros: u64) -> f32 {
    (micros as f64 / MICROS_PER_SEC) as f32
}

/// Reveal sweep and lifetime of one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTimeline {
    reveal_us: u64,
    lifetime_us: u64,
}

impl RevealTimeline {
    /// Timeline with the given durations.
    #[must_use]
    pub fn new(reveal_secs: f32, lifetime_secs: f32) -> Self {
        Self {
            reveal_us: secs_to_micros(reveal_secs),
            lifetime_us: secs_to_micros(lifetime_secs),
        }
    }

    /// Timeline from renderer config.
    #[must_use]
    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(config.reveal_secs, config.lifetime_secs)
    }

    /// `clamp(elapsed / reveal, 0, 1)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn progress(&self, elapsed_us: u64) -> f32 {
        if self.reveal_us == 0 || elapsed_us >= self.reveal_us {
            return 1.0;
        }
        (elapsed_us as f64 / self.reveal_us as f64) as f32
    }

    /// `ceil(progress * columns)`, computed exactly.
    #[must_use]
    pub fn right_column(&self, elapsed_us: u64, columns: u32) -> u32 {
        if self.reveal_us == 0 || elapsed_us >= self.reveal_us {
            return columns;
        }
        let revealed = (elapsed_us * u64::from(columns)).div_ceil(self.reveal_us);
        u32::try_from(revealed).map_or(columns, |r| r.min(columns))
    }

    /// The sprite is drawn while the reveal is incomplete.
    #[must_use]
    pub fn sprite_visible(&self, elapsed_us: u64) -> bool {
        elapsed_us < self.reveal_us
    }

    /// True once elapsed time is strictly past the lifetime.
    #[must_use]
    pub fn expired(&self, elapsed_us: u64) -> bool {
        elapsed_us > self.lifetime_us
    }
}

impl Default for RevealTimeline {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}
