//! # Overlay Lifecycle Integration Test
//!
//! Runs the overlay the way a host does: a render thread driving the
//! surface, a UI thread draining the task queue, against the recording
//! device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dissolve_overlay::{DustOverlay, OverlayConfig, OverlayHost, OverlaySurface};
use dissolve_render::{Bitmap, InjectedFailure, Point, RecordingDevice, RendererPhase};

#[derive(Default)]
struct ViewHost {
    visible: AtomicBool,
    detached: AtomicBool,
    visibility_changes: AtomicUsize,
}

impl OverlayHost for ViewHost {
    fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::SeqCst) != visible {
            self.visibility_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

fn overlay(
    device: RecordingDevice,
) -> (Arc<ViewHost>, DustOverlay, OverlaySurface<RecordingDevice>) {
    let host = Arc::new(ViewHost::default());
    let (overlay, mut surface) =
        DustOverlay::create(device, host.clone(), &OverlayConfig::default()).unwrap();
    surface.surface_created();
    surface.surface_changed(720, 1280);
    overlay.ui_queue().run_pending();
    (host, overlay, surface)
}

/// Draws `frames` 50 ms apart, draining the UI queue after each.
fn run_frames(
    surface: &mut OverlaySurface<RecordingDevice>,
    overlay: &DustOverlay,
    start: Instant,
    frames: std::ops::Range<u32>,
) {
    for frame in frames {
        surface.draw_frame(start + Duration::from_millis(50) * frame);
        overlay.ui_queue().run_pending();
    }
}

#[test]
fn test_effect_shows_then_hides_overlay() {
    let (host, overlay, mut surface) = overlay(RecordingDevice::new());
    assert!(!host.is_visible());

    let idle_calls = Arc::new(AtomicUsize::new(0));
    let idle_counter = Arc::clone(&idle_calls);
    overlay.set_on_became_idle(move || {
        idle_counter.fetch_add(1, Ordering::SeqCst);
    });

    let visible = Arc::new(AtomicUsize::new(0));
    let ui_overlay = overlay.clone();
    let visible_counter = Arc::clone(&visible);
    let started = std::thread::spawn(move || {
        ui_overlay.start(
            Point::new(100, 200),
            Bitmap::solid(120, 40, [40, 120, 200, 255]),
            move || {
                visible_counter.fetch_add(1, Ordering::SeqCst);
            },
        )
    })
    .join()
    .unwrap();
    assert!(started);
    assert!(host.is_visible());

    let start = Instant::now();
    run_frames(&mut surface, &overlay, start, 0..2);
    assert_eq!(visible.load(Ordering::SeqCst), 1);
    assert_eq!(surface.renderer().effects().len(), 1);

    run_frames(&mut surface, &overlay, start, 2..60);
    assert!(surface.renderer().effects().is_empty());
    assert!(!host.is_visible());
    assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
    assert_eq!(visible.load(Ordering::SeqCst), 1);
    assert_eq!(host.visibility_changes.load(Ordering::SeqCst), 2);

    surface.dispose();
    assert_eq!(surface.phase(), RendererPhase::Disposed);
    let device = surface.renderer().device();
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_start_before_idle_delivery_keeps_overlay_visible() {
    let (host, overlay, mut surface) = overlay(RecordingDevice::new());
    let idle_calls = Arc::new(AtomicUsize::new(0));
    let idle_counter = Arc::clone(&idle_calls);
    overlay.set_on_became_idle(move || {
        idle_counter.fetch_add(1, Ordering::SeqCst);
    });
    let bitmap = Bitmap::solid(16, 16, [255; 4]);

    assert!(overlay.start(Point::new(0, 0), bitmap.clone(), || {}));
    let start = Instant::now();
    for frame in 0..60 {
        surface.draw_frame(start + Duration::from_millis(50) * frame);
    }
    assert!(surface.renderer().effects().is_empty());

    // Idle notification is queued but the UI thread has not run it yet.
    assert!(overlay.start(Point::new(0, 0), bitmap, || {}));
    overlay.ui_queue().run_pending();
    assert!(host.is_visible());
    assert_eq!(idle_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_render_failure_marks_unavailable_and_detaches() {
    let (host, overlay, mut surface) = overlay(RecordingDevice::new());
    assert!(overlay.start(Point::new(0, 0), Bitmap::solid(8, 8, [255; 4]), || {}));
    surface
        .renderer_mut()
        .device_mut()
        .inject_failure(InjectedFailure::Call { operation: "draw" });

    surface.draw_frame(Instant::now());
    assert!(!overlay.is_available());
    assert_eq!(surface.phase(), RendererPhase::Failed);
    overlay.ui_queue().run_pending();
    assert!(!host.is_visible());
    assert!(host.detached.load(Ordering::SeqCst));

    assert!(!overlay.start(Point::new(0, 0), Bitmap::solid(8, 8, [255; 4]), || {}));
    let before = surface.renderer().device().commands().len();
    surface.draw_frame(Instant::now());
    assert_eq!(surface.renderer().device().commands().len(), before);
}

#[test]
fn test_frame_clock_clamps_long_pauses() {
    let (_host, overlay, mut surface) = overlay(RecordingDevice::new());
    assert!(overlay.start(Point::new(0, 0), Bitmap::solid(8, 8, [255; 4]), || {}));
    let start = Instant::now();
    surface.draw_frame(start);
    surface.draw_frame(start + Duration::from_secs(3));
    let elapsed = surface.renderer().effects()[0].elapsed_secs();
    assert!((elapsed - 1.0 / 15.0).abs() < 1e-5);
}

#[test]
fn test_recreated_surface_restarts_frame_clock() {
    let (host, overlay, mut surface) = overlay(RecordingDevice::new());
    assert!(overlay.start(Point::new(0, 0), Bitmap::solid(8, 8, [255; 4]), || {}));
    let start = Instant::now();
    surface.draw_frame(start);
    surface.draw_frame(start + Duration::from_millis(50));

    surface.surface_created();
    surface.surface_changed(1280, 720);
    surface.draw_frame(start + Duration::from_millis(60));
    let elapsed = surface.renderer().effects()[0].elapsed_secs();
    assert!((elapsed - 0.05).abs() < 1e-5);
    assert_eq!(surface.phase(), RendererPhase::Ready);

    overlay.ui_queue().run_pending();
    assert!(host.is_visible());
}
