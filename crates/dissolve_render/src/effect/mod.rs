//! Dust effects.
//!
//! Lifecycle of one effect:
//! ```text
//! spawn ──► texture upload ──► particle buffer ──► spawn dispatch ──► barrier
//!   │
//!   ▼  every frame
//! render: dust (revealed columns) + sprite (unrevealed remainder, first 0.3 s)
//!   │
//!   ▼  elapsed > lifetime
//! release: vertex arrays, buffers, texture
//! ```

pub mod grid;
pub mod instance;
pub mod particle;
pub mod timeline;

pub use grid::GridSpec;
pub use instance::{DustEffect, EffectId, EffectStatus, VisibleCallback};
pub use particle::{Particle, PARTICLE_LAYOUT};
pub use timeline::{micros_to_secs, secs_to_micros, RevealTimeline};
