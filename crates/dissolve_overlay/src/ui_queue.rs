//! UI-thread task queue.
//!
//! Any thread posts, the host's UI thread drains with
//! [`UiQueue::run_pending`]. Posting, cancelling and dequeuing share one lock,
//! so a task is either cancelled or run, never both.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

/// Work for the UI thread.
pub type UiTask = Box<dyn FnOnce() + Send>;

/// Id of a posted task, for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Default)]
struct Inner {
    tasks: Mutex<VecDeque<(TaskId, UiTask)>>,
    next_id: AtomicU64,
}

/// Cloneable handle to one FIFO of UI tasks.
#[derive(Clone, Default)]
pub struct UiQueue {
    inner: Arc<Inner>,
}

impl UiQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `task` and returns its id.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> TaskId {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.tasks.lock().push_back((id, Box::new(task)));
        trace!(task = id.0, "ui task posted");
        id
    }

    /// Removes a still-queued task. Returns whether it was found.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut tasks = self.inner.tasks.lock();
        match tasks.iter().position(|(queued, _)| *queued == id) {
            Some(index) => {
                tasks.remove(index);
                trace!(task = id.0, "ui task cancelled");
                true
            }
            None => false,
        }
    }

    /// Runs the tasks queued at call time, in order, outside the lock.
    ///
    /// Tasks posted while running wait for the next call. Returns the number
    /// of tasks run.
    pub fn run_pending(&self) -> usize {
        let budget = self.len();
        let mut ran = 0;
        while ran < budget {
            let Some((_, task)) = self.inner.tasks.lock().pop_front() else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Queued task count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.tasks.lock().is_empty()
    }
}

impl fmt::Debug for UiQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_in_order() {
        let queue = UiQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            queue.post(move || log.lock().push(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancel_only_queued() {
        let queue = UiQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let log = Arc::clone(&log);
            queue.post(move || log.lock().push("first"))
        };
        let second = {
            let log = Arc::clone(&log);
            queue.post(move || log.lock().push("second"))
        };
        assert_ne!(first, second);
        assert!(queue.cancel(first));
        assert!(!queue.cancel(first));
        queue.run_pending();
        assert!(!queue.cancel(second));
        assert_eq!(*log.lock(), vec!["second"]);
    }

    #[test]
    fn test_tasks_posted_while_running_wait() {
        let queue = UiQueue::new();
        let inner = queue.clone();
        queue.post(move || {
            inner.post(|| {});
        });
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_post_from_other_thread() {
        let queue = UiQueue::new();
        let remote = queue.clone();
        std::thread::spawn(move || {
            remote.post(|| {});
        })
        .join()
        .unwrap();
        assert_eq!(queue.run_pending(), 1);
    }
}
