//! Host view surface.

/// The host's view operations for the overlay surface.
///
/// Always called on the UI thread, from tasks drained by
/// [`UiQueue::run_pending`](crate::UiQueue::run_pending) or from
/// [`DustOverlay::start`](crate::DustOverlay::start).
pub trait OverlayHost: Send + Sync {
    /// Shows or hides the overlay surface.
    fn set_visible(&self, visible: bool);

    /// Whether the overlay surface is currently shown.
    fn is_visible(&self) -> bool;

    /// Removes the overlay surface from the view tree for good.
    fn detach(&self);
}
