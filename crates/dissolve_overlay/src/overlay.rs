//! Overlay driver: UI-thread handle plus render-thread surface.
//!
//! ```text
//!  UI thread                          render thread
//!  ─────────                          ─────────────
//!  DustOverlay::start ──[channel]──►  OverlaySurface::draw_frame
//!        ▲                                 │  drain starts, render(delta)
//!        │                                 │
//!  UiQueue::run_pending ◄──[UiQueue]──  on_became_visible, idle, failure
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dissolve_render::{
    Bitmap, DissolveError, DissolveResult, DustRenderer, GpuDevice, IdleHook, Point,
    RendererPhase, VisibleCallback,
};
use tracing::{debug, error, info, warn};

use crate::clock::FrameClock;
use crate::config::OverlayConfig;
use crate::host::OverlayHost;
use crate::idle::IdleNotifier;
use crate::ui_queue::UiQueue;

/// Work handed from the UI thread to the render thread.
enum RenderCommand {
    Start {
        origin: Point,
        bitmap: Bitmap,
        on_became_visible: VisibleCallback,
    },
}

struct Shared {
    available: AtomicBool,
    host: Arc<dyn OverlayHost>,
    ui: UiQueue,
    notifier: Arc<IdleNotifier>,
}

impl Shared {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Marks the overlay unavailable and has the UI thread hide and detach it.
    fn fail(&self, operation: &'static str, err: &DissolveError) {
        error!(operation, error = %err, "dust overlay failed");
        if self.available.swap(false, Ordering::AcqRel) {
            self.notifier.cancel();
            let host = Arc::clone(&self.host);
            self.ui.post(move || {
                host.set_visible(false);
                host.detach();
            });
        }
    }
}

/// Forwards renderer busy/idle transitions to the notifier.
struct NotifierHook {
    notifier: Arc<IdleNotifier>,
}

impl IdleHook for NotifierHook {
    fn became_idle(&mut self) {
        self.notifier.schedule();
    }

    fn became_busy(&mut self) {
        self.notifier.cancel();
    }
}

/// UI-thread handle to the overlay.
#[derive(Clone)]
pub struct DustOverlay {
    shared: Arc<Shared>,
    commands: Sender<RenderCommand>,
}

impl DustOverlay {
    /// Builds the handle and the render-thread surface over `device`.
    ///
    /// # Errors
    ///
    /// [`DissolveError::Config`] when `config` fails validation.
    pub fn create<D: GpuDevice>(
        device: D,
        host: Arc<dyn OverlayHost>,
        config: &OverlayConfig,
    ) -> DissolveResult<(Self, OverlaySurface<D>)> {
        config.validate()?;
        let ui = UiQueue::new();
        let notifier = Arc::new(IdleNotifier::new(ui.clone(), Arc::clone(&host)));
        let renderer = DustRenderer::new(device, config.renderer.clone())?.with_idle_hook(
            NotifierHook {
                notifier: Arc::clone(&notifier),
            },
        );
        let shared = Arc::new(Shared {
            available: AtomicBool::new(true),
            host,
            ui,
            notifier,
        });
        let (sender, receiver) = bounded(config.command_queue_capacity);

        let overlay = Self {
            shared: Arc::clone(&shared),
            commands: sender,
        };
        let surface = OverlaySurface {
            renderer,
            shared,
            commands: receiver,
            clock: FrameClock::new(config.frame_delta_cap_secs),
        };
        Ok((overlay, surface))
    }

    /// Queues a dissolve of `bitmap` at `origin`.
    ///
    /// Cancels a pending idle notification and shows the surface. The
    /// callback runs on the UI thread once the effect has been on screen for
    /// a frame. Returns `false` when the overlay is unavailable or the
    /// command queue is full.
    pub fn start(
        &self,
        origin: Point,
        bitmap: Bitmap,
        on_became_visible: impl FnOnce() + Send + 'static,
    ) -> bool {
        if !self.is_available() {
            return false;
        }
        self.shared.notifier.cancel();
        if !self.shared.host.is_visible() {
            self.shared.host.set_visible(true);
            debug!("dust overlay becoming visible");
        }

        let ui = self.shared.ui.clone();
        let on_became_visible: VisibleCallback = Box::new(move || {
            ui.post(on_became_visible);
        });
        let command = RenderCommand::Start {
            origin,
            bitmap,
            on_became_visible,
        };
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("dust overlay command queue full, start dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("dust overlay surface gone, start dropped");
                false
            }
        }
    }

    /// False once the renderer has failed.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.shared.is_available()
    }

    /// Listener run on the UI thread after the overlay hides itself.
    pub fn set_on_became_idle(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.shared.notifier.set_listener(Arc::new(listener));
    }

    /// Queue the host must drain on its UI thread.
    #[must_use]
    pub fn ui_queue(&self) -> &UiQueue {
        &self.shared.ui
    }
}

impl fmt::Debug for DustOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DustOverlay")
            .field("available", &self.is_available())
            .field("queued_starts", &self.commands.len())
            .finish_non_exhaustive()
    }
}

/// Render-thread side of the overlay; owns the renderer.
pub struct OverlaySurface<D: GpuDevice> {
    renderer: DustRenderer<D>,
    shared: Arc<Shared>,
    commands: Receiver<RenderCommand>,
    clock: FrameClock,
}

impl<D: GpuDevice> OverlaySurface<D> {
    /// Initializes the renderer, then schedules an idle notification so an
    /// unused overlay hides itself.
    ///
    /// A recreated surface restarts the frame clock; its first frame
    /// advances effects by zero.
    pub fn surface_created(&mut self) {
        debug!("dust overlay surface created");
        self.clock.reset();
        if !self.shared.is_available() {
            return;
        }
        match self.renderer.init() {
            Ok(()) => {
                info!("dust overlay ready");
                if self.renderer.is_idle() {
                    self.shared.notifier.schedule();
                }
            }
            Err(err) => self.shared.fail("init", &err),
        }
    }

    /// Resizes the renderer to the new surface size.
    pub fn surface_changed(&mut self, width: u32, height: u32) {
        debug!(width, height, "dust overlay surface changed");
        if !self.shared.is_available() {
            return;
        }
        if let Err(err) = self.renderer.resize(width, height) {
            self.shared.fail("resize", &err);
        }
    }

    /// Starts queued effects and renders one frame stamped `now`.
    pub fn draw_frame(&mut self, now: Instant) {
        let delta = self.clock.tick(now);
        let available = self.shared.is_available();

        while let Ok(command) = self.commands.try_recv() {
            if !available {
                continue;
            }
            match command {
                RenderCommand::Start {
                    origin,
                    bitmap,
                    on_became_visible,
                } => {
                    if let Err(err) = self.renderer.start(origin, &bitmap, on_became_visible) {
                        self.shared.fail("start", &err);
                        return;
                    }
                }
            }
        }
        if !available {
            return;
        }
        if let Err(err) = self.renderer.render(delta) {
            self.shared.fail("render", &err);
        }
    }

    /// Releases the renderer's GPU resources.
    pub fn dispose(&mut self) {
        self.shared.notifier.cancel();
        if let Err(err) = self.renderer.dispose() {
            warn!(error = %err, "dust overlay dispose incomplete");
        }
        info!("dust overlay disposed");
    }

    /// Renderer phase.
    #[must_use]
    pub fn phase(&self) -> RendererPhase {
        self.renderer.phase()
    }

    /// The renderer.
    #[must_use]
    pub fn renderer(&self) -> &DustRenderer<D> {
        &self.renderer
    }

    /// The renderer, mutably (render targets, device inspection).
    pub fn renderer_mut(&mut self) -> &mut DustRenderer<D> {
        &mut self.renderer
    }
}
