//! # DISSOLVE Overlay
//!
//! Host-side driver for [`dissolve_render`]: a transparent surface above the
//! host UI that plays dust effects and hides itself when idle.
//!
//! ## Threads
//!
//! ```text
//! ┌──────────────┐   start (channel)    ┌────────────────┐
//! │  UI thread   │ ───────────────────► │ render thread  │
//! │ DustOverlay  │                      │ OverlaySurface │
//! │              │ ◄─────────────────── │ DustRenderer   │
//! └──────────────┘   UiQueue tasks      └────────────────┘
//! ```
//!
//! The host calls the `surface_*` / `draw_frame` methods from its render
//! loop and drains [`UiQueue::run_pending`] on its UI thread.

pub mod clock;
pub mod config;
pub mod host;
pub mod idle;
pub mod overlay;
pub mod ui_queue;

pub use clock::FrameClock;
pub use config::OverlayConfig;
pub use host::OverlayHost;
pub use idle::{IdleListener, IdleNotifier};
pub use overlay::{DustOverlay, OverlaySurface};
pub use ui_queue::{TaskId, UiQueue, UiTask};
