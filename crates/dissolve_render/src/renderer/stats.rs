//! Rendering statistics.

use crate::effect::EffectId;

/// Statistics from the last render frame plus lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Number of draw calls last frame.
    pub draw_calls: u32,
    /// Particles drawn last frame.
    pub particles: u32,
    /// Live effects after the last frame.
    pub live_effects: u32,
    /// Frames rendered since init.
    pub frames: u64,
    /// Effects started since init.
    pub effects_started: u64,
    /// Effects finished and released since init.
    pub effects_finished: u64,
}

impl RenderStats {
    pub(crate) fn begin_frame(&mut self) {
        self.draw_calls = 0;
        self.particles = 0;
    }
}

/// Summary of a finished effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectReport {
    /// Effect id.
    pub id: EffectId,
    /// Particles the effect spawned.
    pub particles: u32,
    /// Render calls it took part in.
    pub frames: u64,
    /// Seconds from spawn to finish.
    pub elapsed_secs: f32,
    /// `frames / elapsed_secs`, zero when no time passed.
    pub average_fps: f32,
}

impl EffectReport {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(id: EffectId, particles: u32, frames: u64, elapsed_secs: f32) -> Self {
        let average_fps = if elapsed_secs > 0.0 {
            frames as f32 / elapsed_secs
        } else {
            0.0
        };
        Self {
            id,
            particles,
            frames,
            elapsed_secs,
            average_fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_fps() {
        let report = EffectReport::new(EffectId::new(1), 12, 26, 2.6);
        assert!((report.average_fps - 10.0).abs() < 1e-4);
        let instant = EffectReport::new(EffectId::new(2), 0, 1, 0.0);
        assert!(instant.average_fps.abs() < f32::EPSILON);
    }

    #[test]
    fn test_begin_frame_resets_per_frame_counters() {
        let mut stats = RenderStats {
            draw_calls: 4,
            particles: 100,
            frames: 9,
            ..RenderStats::default()
        };
        stats.begin_frame();
        assert_eq!(stats.draw_calls, 0);
        assert_eq!(stats.particles, 0);
        assert_eq!(stats.frames, 9);
    }
}
