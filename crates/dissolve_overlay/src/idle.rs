//! Single-flight idle notification.
//!
//! ```text
//! render thread                 UiQueue                  UI thread
//! ─────────────                 ───────                  ─────────
//! became_idle ── schedule() ──► [notify#g] ── run ──►  hide host, listener()
//! became_busy ── cancel() ────► (removed)
//! start()     ── cancel() ────► (removed)
//! ```
//!
//! At most one notification is queued. Every `schedule` or `cancel` bumps the
//! generation, so a notification that was already dequeued but is stale does
//! nothing when it runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::host::OverlayHost;
use crate::ui_queue::{TaskId, UiQueue};

/// Callback for the idle transition, run on the UI thread.
pub type IdleListener = Arc<dyn Fn() + Send + Sync>;

/// Deferred, cancellable "overlay became idle" delivery.
pub struct IdleNotifier {
    ui: UiQueue,
    host: Arc<dyn OverlayHost>,
    listener: Mutex<Option<IdleListener>>,
    pending: Mutex<Option<TaskId>>,
    generation: AtomicU64,
}

impl IdleNotifier {
    /// Notifier posting to `ui` and hiding `host` on delivery.
    #[must_use]
    pub fn new(ui: UiQueue, host: Arc<dyn OverlayHost>) -> Self {
        Self {
            ui,
            host,
            listener: Mutex::new(None),
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Sets the host listener invoked after the surface is hidden.
    pub fn set_listener(&self, listener: IdleListener) {
        *self.listener.lock() = Some(listener);
    }

    /// Queues a notification, replacing any pending one.
    pub fn schedule(self: &Arc<Self>) {
        let mut pending = self.pending.lock();
        if let Some(previous) = pending.take() {
            self.ui.cancel(previous);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let notifier = Arc::clone(self);
        *pending = Some(self.ui.post(move || notifier.deliver(generation)));
        debug!(generation, "idle notification scheduled");
    }

    /// Drops the pending notification, if any.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(id) = pending.take() {
            if self.ui.cancel(id) {
                debug!("idle notification cancelled");
            }
        }
    }

    /// True while a notification waits in the queue.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn deliver(&self, generation: u64) {
        {
            let mut pending = self.pending.lock();
            if self.generation.load(Ordering::Acquire) != generation {
                return;
            }
            *pending = None;
        }
        self.host.set_visible(false);
        debug!("overlay idle, becoming invisible");
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct TestHost {
        visible: AtomicBool,
    }

    impl OverlayHost for TestHost {
        fn set_visible(&self, visible: bool) {
            self.visible.store(visible, Ordering::SeqCst);
        }

        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        fn detach(&self) {}
    }

    fn setup() -> (UiQueue, Arc<TestHost>, Arc<IdleNotifier>, Arc<AtomicUsize>) {
        let ui = UiQueue::new();
        let host = Arc::new(TestHost::default());
        host.set_visible(true);
        let notifier = Arc::new(IdleNotifier::new(ui.clone(), host.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        notifier.set_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (ui, host, notifier, calls)
    }

    #[test]
    fn test_delivery_hides_host() {
        let (ui, host, notifier, calls) = setup();
        notifier.schedule();
        assert!(notifier.is_pending());
        ui.run_pending();
        assert!(!host.is_visible());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!notifier.is_pending());
    }

    #[test]
    fn test_schedule_is_single_flight() {
        let (ui, _host, notifier, calls) = setup();
        notifier.schedule();
        notifier.schedule();
        notifier.schedule();
        assert_eq!(ui.len(), 1);
        ui.run_pending();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_delivery() {
        let (ui, host, notifier, calls) = setup();
        notifier.schedule();
        notifier.cancel();
        assert!(ui.is_empty());
        ui.run_pending();
        assert!(host.is_visible());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
