//! Frame clock.

use std::time::Instant;

/// Turns frame timestamps into clamped deltas.
///
/// The first tick yields `0.0`; later ticks yield the time since the
/// previous one, never more than the cap.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Option<Instant>,
    cap_secs: f32,
}

impl FrameClock {
    /// Clock clamping deltas to `cap_secs`.
    #[must_use]
    pub const fn new(cap_secs: f32) -> Self {
        Self {
            last: None,
            cap_secs,
        }
    }

    /// Delta in seconds since the previous tick.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let delta = self.last.map_or(0.0, |last| {
            now.saturating_duration_since(last)
                .as_secs_f32()
                .min(self.cap_secs)
        });
        self.last = Some(now);
        delta
    }

    /// Forgets the previous tick; the next one yields `0.0`.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
