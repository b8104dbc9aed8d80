//! Dust Renderer - owns the device, the programs and every live effect.
//!
//! ```text
//!                 init()                       dispose()
//! Uninitialized ─────────► Ready ─────────────────────────► Disposed
//!       │                    │
//!       │ init error         │ any error in resize / start / render
//!       ▼                    ▼
//!     Failed ◄───────────────┘      (permanent, no further GPU calls)
//! ```
//!
//! ## FRAME ORDER
//!
//! 1. Sanitize the delta (NaN/negative → 0, capped)
//! 2. `begin_frame` clears to transparent
//! 3. Every live effect renders, in start order
//! 4. Finished effects are released and removed
//! 5. `end_frame` submits
//! 6. Live set went non-empty → empty: the idle hook fires once

pub mod projection;
pub mod stats;

use tracing::{debug, error, info, warn};

use crate::capture::{Bitmap, Point};
use crate::config::RendererConfig;
use crate::effect::{
    secs_to_micros, DustEffect, EffectId, EffectStatus, RevealTimeline, VisibleCallback,
};
use crate::error::{DissolveError, DissolveResult};
use crate::gpu::{GlobalState, GpuDevice};
use crate::program::ProgramSet;
use crate::shaders::ShaderSources;

pub use projection::Projection;
pub use stats::{EffectReport, RenderStats};

/// Receives busy/idle transitions of the live effect set.
///
/// Called on the render thread, synchronously inside `start` / `render`.
pub trait IdleHook: Send {
    /// The last live effect finished.
    fn became_idle(&mut self);

    /// An effect started while none were live.
    fn became_busy(&mut self) {}
}

impl<F> IdleHook for F
where
    F: FnMut() + Send,
{
    fn became_idle(&mut self) {
        self();
    }
}

/// Externally visible renderer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererPhase {
    /// Created, `init` not yet called.
    Uninitialized,
    /// Programs compiled, accepting effects.
    Ready,
    /// A device call failed; permanently unavailable.
    Failed,
    /// Resources released.
    Disposed,
}

enum State {
    Uninitialized,
    Ready(ProgramSet),
    /// Programs compiled before the failure stay here until `dispose`.
    Failed(Option<ProgramSet>),
    Disposed,
}

/// The effect engine.
pub struct DustRenderer<D: GpuDevice> {
    device: D,
    config: RendererConfig,
    shaders: ShaderSources,
    state: State,
    projection: Projection,
    timeline: RevealTimeline,
    max_delta_us: u64,
    effects: Vec<DustEffect>,
    finished: Vec<usize>,
    idle_hook: Option<Box<dyn IdleHook>>,
    next_effect_id: u64,
    stats: RenderStats,
}

impl<D: GpuDevice> DustRenderer<D> {
    /// Creates a renderer over `device`. No GPU work happens until `init`.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] when `config` fails validation.
    pub fn new(device: D, config: RendererConfig) -> DissolveResult<Self> {
        config.validate()?;
        Ok(Self {
            device,
            timeline: RevealTimeline::from_config(&config),
            max_delta_us: secs_to_micros(config.max_frame_delta_secs),
            config,
            shaders: ShaderSources::default(),
            state: State::Uninitialized,
            projection: Projection::default(),
            effects: Vec::new(),
            finished: Vec::new(),
            idle_hook: None,
            next_effect_id: 1,
            stats: RenderStats::default(),
        })
    }

    /// Replaces the embedded shaders. Only effective before `init`.
    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderSources) -> Self {
        self.shaders = shaders;
        self
    }

    /// Installs the idle hook.
    #[must_use]
    pub fn with_idle_hook(mut self, hook: impl IdleHook + 'static) -> Self {
        self.idle_hook = Some(Box::new(hook));
        self
    }

    /// Replaces the idle hook.
    pub fn set_idle_hook(&mut self, hook: impl IdleHook + 'static) {
        self.idle_hook = Some(Box::new(hook));
    }

    /// Validates the device, sets global state and compiles the programs.
    ///
    /// Calling it again once ready is a no-op.
    ///
    /// # Errors
    ///
    /// `UnsupportedPlatform`, `ShaderCompile`, `ProgramLink` or `GpuCall`;
    /// the renderer is then `Failed`.
    pub fn init(&mut self) -> DissolveResult<()> {
        match self.state {
            State::Uninitialized => {}
            State::Ready(_) => return Ok(()),
            State::Failed(_) | State::Disposed => {
                warn!(phase = ?self.phase(), "init ignored");
                return Ok(());
            }
        }
        let result = self.build_programs();
        let programs = self.check("init", result)?;
        self.state = State::Ready(programs);
        info!(
            backend = %self.device.capabilities().backend,
            particle_size = self.config.particle_size,
            "dust renderer initialized"
        );
        Ok(())
    }

    /// Updates viewport and projection for a new surface size.
    ///
    /// # Errors
    ///
    /// Device failure; the renderer is then `Failed`.
    pub fn resize(&mut self, width: u32, height: u32) -> DissolveResult<()> {
        let State::Ready(programs) = &mut self.state else {
            return Ok(());
        };
        self.projection = Projection::orthographic(width, height);
        let result = apply_viewport(&mut self.device, programs, width, height, &self.projection);
        self.check("resize", result)?;
        debug!(width, height, "dust renderer resized");
        Ok(())
    }

    /// Starts a dissolve of `bitmap` with its top-left corner at `origin`.
    ///
    /// Returns `Ok(false)` without touching the device unless the renderer
    /// is ready.
    ///
    /// # Errors
    ///
    /// Device failure; the renderer is then `Failed`.
    pub fn start(
        &mut self,
        origin: Point,
        bitmap: &Bitmap,
        on_became_visible: VisibleCallback,
    ) -> DissolveResult<bool> {
        let State::Ready(programs) = &mut self.state else {
            debug!(phase = ?self.phase(), "start ignored");
            return Ok(false);
        };
        let id = EffectId::new(self.next_effect_id);
        self.next_effect_id += 1;
        let result = DustEffect::spawn(
            &mut self.device,
            programs,
            id,
            origin,
            bitmap,
            self.config.particle_size,
            on_became_visible,
        );
        let effect = self.check("start", result)?;

        let was_idle = self.effects.is_empty();
        self.effects.push(effect);
        self.stats.effects_started += 1;
        self.stats.live_effects = live_count(&self.effects);
        if was_idle {
            if let Some(hook) = self.idle_hook.as_mut() {
                hook.became_busy();
            }
        }
        Ok(true)
    }

    /// Advances every effect by `delta_secs` and draws one frame.
    ///
    /// # Errors
    ///
    /// Device failure; the renderer is then `Failed`.
    pub fn render(&mut self, delta_secs: f32) -> DissolveResult<()> {
        let State::Ready(programs) = &mut self.state else {
            return Ok(());
        };
        let delta_us = secs_to_micros(delta_secs).min(self.max_delta_us);
        let had_effects = !self.effects.is_empty();

        let result = render_frame(
            &mut self.device,
            programs,
            &self.timeline,
            &mut self.effects,
            &mut self.finished,
            &mut self.stats,
            delta_us,
        );
        self.check("render", result)?;
        let result = self.release_finished();
        self.check("render", result)?;
        let result = self.device.end_frame();
        self.check("render", result)?;
        self.stats.frames += 1;

        if had_effects && self.effects.is_empty() {
            debug!("dust renderer idle");
            if let Some(hook) = self.idle_hook.as_mut() {
                hook.became_idle();
            }
        }
        Ok(())
    }

    /// Releases every effect and program, also after a failure. Idempotent.
    ///
    /// # Errors
    ///
    /// The first release failure; everything else is still released.
    pub fn dispose(&mut self) -> DissolveResult<()> {
        let programs = match std::mem::replace(&mut self.state, State::Disposed) {
            State::Ready(programs) => Some(programs),
            State::Failed(programs) => programs,
            State::Uninitialized => None,
            State::Disposed => return Ok(()),
        };
        let mut first_error = None;
        for effect in self.effects.drain(..) {
            if let Err(err) = effect.release(&mut self.device) {
                first_error.get_or_insert(err);
            }
        }
        if let Some(programs) = programs {
            if let Err(err) = programs.release(&mut self.device) {
                first_error.get_or_insert(err);
            }
        }
        self.finished.clear();
        self.stats.live_effects = 0;
        match first_error {
            Some(err) => {
                warn!(error = %err, "dust renderer disposed with release failures");
                Err(err)
            }
            None => {
                info!("dust renderer disposed");
                Ok(())
            }
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RendererPhase {
        match self.state {
            State::Uninitialized => RendererPhase::Uninitialized,
            State::Ready(_) => RendererPhase::Ready,
            State::Failed(_) => RendererPhase::Failed,
            State::Disposed => RendererPhase::Disposed,
        }
    }

    /// True when effects can be started.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// True when no effect is live.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.effects.is_empty()
    }

    /// Live effects in start order.
    #[must_use]
    pub fn effects(&self) -> &[DustEffect] {
        &self.effects
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Current projection.
    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The device, mutably (render targets, test inspection).
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn build_programs(&mut self) -> DissolveResult<ProgramSet> {
        let capabilities = self.device.capabilities();
        if !capabilities.compute_shaders {
            return Err(DissolveError::unsupported(format!(
                "{} device has no compute shader support",
                capabilities.backend
            )));
        }
        if let Some(version) = capabilities.api_version {
            if version < self.config.min_api_version {
                return Err(DissolveError::unsupported(format!(
                    "API {version} is older than required {}",
                    self.config.min_api_version
                )));
            }
        }
        self.device.set_global_state(GlobalState {
            clear_color: self.config.clear_color,
            blend: self.config.blend,
        })?;
        ProgramSet::compile(&mut self.device, &self.shaders, &self.config)
    }

    fn release_finished(&mut self) -> DissolveResult<()> {
        for index in self.finished.drain(..).rev() {
            let effect = self.effects.remove(index);
            effect.release(&mut self.device)?;
            self.stats.effects_finished += 1;
        }
        self.stats.live_effects = live_count(&self.effects);
        Ok(())
    }

    fn check<T>(&mut self, operation: &'static str, result: DissolveResult<T>) -> DissolveResult<T> {
        if let Err(err) = &result {
            error!(operation, error = %err, "dust renderer failed");
            let programs = match std::mem::replace(&mut self.state, State::Failed(None)) {
                State::Ready(programs) => Some(programs),
                State::Failed(programs) => programs,
                State::Uninitialized | State::Disposed => None,
            };
            self.state = State::Failed(programs);
        }
        result
    }
}

fn live_count(effects: &[DustEffect]) -> u32 {
    u32::try_from(effects.len()).unwrap_or(u32::MAX)
}

fn apply_viewport<D: GpuDevice>(
    device: &mut D,
    programs: &mut ProgramSet,
    width: u32,
    height: u32,
    projection: &Projection,
) -> DissolveResult<()> {
    device.set_viewport(width, height)?;
    programs.set_projection(device, projection.matrix())
}

fn render_frame<D: GpuDevice>(
    device: &mut D,
    programs: &mut ProgramSet,
    timeline: &RevealTimeline,
    effects: &mut [DustEffect],
    finished: &mut Vec<usize>,
    stats: &mut RenderStats,
    delta_us: u64,
) -> DissolveResult<()> {
    finished.clear();
    stats.begin_frame();
    device.begin_frame()?;
    for (index, effect) in effects.iter_mut().enumerate() {
        match effect.render(device, programs, timeline, delta_us)? {
            EffectStatus::Running { particles, sprite } => {
                stats.particles = stats.particles.saturating_add(particles);
                stats.draw_calls += u32::from(particles > 0) + u32::from(sprite);
            }
            EffectStatus::Finished => finished.push(index),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ApiVersion, GpuCapabilities, GpuCommand, InjectedFailure, RecordingDevice};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ready_renderer() -> DustRenderer<RecordingDevice> {
        let mut renderer =
            DustRenderer::new(RecordingDevice::new(), RendererConfig::default()).unwrap();
        renderer.init().unwrap();
        renderer.resize(320, 240).unwrap();
        renderer
    }

    fn noop() -> VisibleCallback {
        Box::new(|| {})
    }

    #[test]
    fn test_init_sets_global_state() {
        let renderer = ready_renderer();
        assert_eq!(renderer.phase(), RendererPhase::Ready);
        let state = renderer.device().global_state().unwrap();
        assert_eq!(state.clear_color, [0.0; 4]);
        assert_eq!(state.blend, crate::gpu::BlendMode::AlphaBlend);
        assert_eq!(renderer.device().live_programs(), 3);
    }

    #[test]
    fn test_init_rejects_old_api() {
        let device = RecordingDevice::with_capabilities(GpuCapabilities {
            backend: "gles".into(),
            api_version: Some(ApiVersion::new(3, 0)),
            compute_shaders: true,
        });
        let mut renderer = DustRenderer::new(device, RendererConfig::default()).unwrap();
        let err = renderer.init().unwrap_err();
        assert!(matches!(err, DissolveError::UnsupportedPlatform { .. }));
        assert_eq!(renderer.phase(), RendererPhase::Failed);
        assert!(renderer.device().commands().is_empty());
    }

    #[test]
    fn test_init_rejects_missing_compute() {
        let device = RecordingDevice::with_capabilities(GpuCapabilities {
            backend: "webgl2".into(),
            api_version: None,
            compute_shaders: false,
        });
        let mut renderer = DustRenderer::new(device, RendererConfig::default()).unwrap();
        assert!(renderer.init().is_err());
        assert!(!renderer.is_ready());
    }

    #[test]
    fn test_start_before_init_is_ignored() {
        let mut renderer =
            DustRenderer::new(RecordingDevice::new(), RendererConfig::default()).unwrap();
        let started = renderer
            .start(Point::default(), &Bitmap::solid(10, 10, [255; 4]), noop())
            .unwrap();
        assert!(!started);
        assert!(renderer.device().commands().is_empty());
    }

    #[test]
    fn test_failure_is_permanent() {
        let mut renderer = ready_renderer();
        renderer
            .start(Point::default(), &Bitmap::solid(20, 20, [255; 4]), noop())
            .unwrap();
        renderer.device_mut().inject_failure(InjectedFailure::Call { operation: "draw" });
        assert!(renderer.render(0.016).is_err());
        assert_eq!(renderer.phase(), RendererPhase::Failed);

        renderer.device_mut().take_commands();
        renderer.render(0.016).unwrap();
        renderer.resize(10, 10).unwrap();
        let started = renderer
            .start(Point::default(), &Bitmap::solid(20, 20, [255; 4]), noop())
            .unwrap();
        assert!(!started);
        assert!(renderer.device().commands().is_empty());
    }

    #[test]
    fn test_delta_is_sanitized() {
        let mut renderer = ready_renderer();
        renderer
            .start(Point::default(), &Bitmap::solid(20, 20, [255; 4]), noop())
            .unwrap();
        renderer.render(f32::NAN).unwrap();
        renderer.render(-3.0).unwrap();
        assert!(renderer.effects()[0].elapsed_secs().abs() < f32::EPSILON);
        renderer.render(10.0).unwrap();
        assert!((renderer.effects()[0].elapsed_secs() - 0.25).abs() < 1e-6);
    }

    struct Counting {
        busy: Arc<AtomicUsize>,
        idle: Arc<AtomicUsize>,
    }

    impl IdleHook for Counting {
        fn became_idle(&mut self) {
            self.idle.fetch_add(1, Ordering::SeqCst);
        }

        fn became_busy(&mut self) {
            self.busy.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_idle_hook_transitions() {
        let busy = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(AtomicUsize::new(0));
        let mut renderer = ready_renderer();
        renderer.set_idle_hook(Counting {
            busy: Arc::clone(&busy),
            idle: Arc::clone(&idle),
        });
        let bitmap = Bitmap::solid(20, 20, [255; 4]);
        renderer.start(Point::default(), &bitmap, noop()).unwrap();
        renderer.start(Point::new(30, 0), &bitmap, noop()).unwrap();
        assert_eq!(busy.load(Ordering::SeqCst), 1);

        for _ in 0..12 {
            renderer.render(0.25).unwrap();
        }
        assert!(renderer.is_idle());
        assert_eq!(idle.load(Ordering::SeqCst), 1);

        renderer.render(0.25).unwrap();
        assert_eq!(idle.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.stats().effects_finished, 2);
    }

    #[test]
    fn test_dispose_releases_everything_once() {
        let mut renderer = ready_renderer();
        renderer
            .start(Point::default(), &Bitmap::solid(20, 20, [255; 4]), noop())
            .unwrap();
        renderer.render(0.016).unwrap();
        renderer.dispose().unwrap();
        let device = renderer.device();
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);

        let before = renderer.device().commands().len();
        renderer.dispose().unwrap();
        assert_eq!(renderer.device().commands().len(), before);
        assert_eq!(renderer.phase(), RendererPhase::Disposed);
    }

    #[test]
    fn test_dispose_after_failure_releases_everything() {
        let mut renderer = ready_renderer();
        renderer
            .start(Point::default(), &Bitmap::solid(20, 20, [255; 4]), noop())
            .unwrap();
        renderer.device_mut().inject_failure(InjectedFailure::Call { operation: "draw" });
        assert!(renderer.render(0.016).is_err());
        assert_eq!(renderer.phase(), RendererPhase::Failed);
        assert_eq!(renderer.device().live_programs(), 3);

        renderer.dispose().unwrap();
        assert_eq!(renderer.phase(), RendererPhase::Disposed);
        assert!(renderer.effects().is_empty());
        let device = renderer.device();
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);
    }

    #[test]
    fn test_frame_clears_even_when_idle() {
        let mut renderer = ready_renderer();
        renderer.device_mut().take_commands();
        renderer.render(0.016).unwrap();
        assert_eq!(
            renderer.device().commands(),
            &[GpuCommand::BeginFrame, GpuCommand::EndFrame]
        );
    }
}
