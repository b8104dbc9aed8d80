//! # DISSOLVE Render Engine
//!
//! GPU particle engine that turns a captured bitmap into dust:
//! - One particle per `particle_size x particle_size` cell, spawned on the GPU
//! - Left-to-right reveal over 0.3 s, dust drift and fade over 2.5 s
//! - Any number of concurrent effects, one frame each render call
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       DUST PIPELINE                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Bitmap → Texture → Spawn (compute) → Particle Buffer        │
//! │                                            ↓                 │
//! │  Barrier → Dust draw (revealed columns) → Sprite (remainder) │
//! │                                            ↓                 │
//! │  Expire → Release → Idle hook                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## MANDATE
//!
//! - Particle data never leaves the GPU
//! - Every handle an effect creates is released exactly once
//! - A device failure disables the renderer, never the host

pub mod capture;
pub mod config;
pub mod effect;
pub mod error;
pub mod gpu;
pub mod program;
pub mod renderer;
pub mod shaders;

pub use capture::{Bitmap, Point, Rect};
pub use config::RendererConfig;
pub use effect::{
    DustEffect, EffectId, EffectStatus, GridSpec, Particle, RevealTimeline, VisibleCallback,
};
pub use error::{DissolveError, DissolveResult, ShaderStage};
pub use gpu::{
    ApiVersion, BlendMode, GpuCapabilities, GpuCommand, GpuDevice, InjectedFailure,
    RecordingDevice, WgpuDevice,
};
pub use renderer::{DustRenderer, EffectReport, IdleHook, Projection, RenderStats, RendererPhase};
pub use shaders::ShaderSources;
