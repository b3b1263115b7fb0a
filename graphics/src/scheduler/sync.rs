//! GPU synchronization primitives.
//!
//! Every hardware queue owns one timeline [`Fence`]: a monotonically
//! increasing completion counter. Each submission signals the next value on
//! the timeline; the CPU waits for a value to be reached before reusing the
//! resources that submission touched. A [`SubmitPoint`] names one such value
//! on one queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::QueueType;

#[derive(Debug, Default)]
struct FenceInner {
    completed: Mutex<u64>,
    cond: Condvar,
}

/// Timeline fence for CPU-GPU synchronization.
///
/// Cloning a fence creates another handle to the same timeline.
///
/// # Example
///
/// ```ignore
/// let value = queue.submit(&*commands)?;
///
/// // Later, before reusing the resources of that submission:
/// queue.fence().wait(value);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Fence {
    inner: Arc<FenceInner>,
}

impl Fence {
    /// Create a fence with completed value 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value the GPU has completed.
    pub fn completed_value(&self) -> u64 {
        *self.inner.completed.lock()
    }

    /// Returns true if `value` has been reached (non-blocking).
    pub fn is_complete(&self, value: u64) -> bool {
        self.completed_value() >= value
    }

    /// Advance the timeline to `value` and wake waiters.
    ///
    /// Signalling a value lower than the current one has no effect.
    pub fn signal(&self, value: u64) {
        let mut completed = self.inner.completed.lock();
        if value > *completed {
            *completed = value;
            self.inner.cond.notify_all();
        }
    }

    /// Block until `value` has been reached.
    pub fn wait(&self, value: u64) {
        let mut completed = self.inner.completed.lock();
        while *completed < value {
            self.inner.cond.wait(&mut completed);
        }
    }

    /// Block until `value` has been reached or `timeout` elapses.
    ///
    /// Returns `true` if the value was reached.
    pub fn wait_timeout(&self, value: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.inner.completed.lock();
        while *completed < value {
            if self
                .inner
                .cond
                .wait_until(&mut completed, deadline)
                .timed_out()
            {
                return *completed >= value;
            }
        }
        true
    }

    /// Returns true if both handles refer to the same timeline.
    pub fn same_timeline(&self, other: &Fence) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A value on a queue's fence timeline, signalled by one submission.
#[derive(Debug, Clone)]
pub struct SubmitPoint {
    /// Queue that performed the submission.
    pub queue: QueueType,
    /// The queue's timeline fence.
    pub fence: Fence,
    /// Value signalled when the submission completes.
    pub value: u64,
}

impl SubmitPoint {
    pub fn new(queue: QueueType, fence: Fence, value: u64) -> Self {
        Self {
            queue,
            fence,
            value,
        }
    }

    /// Returns true if the submission has completed.
    pub fn is_complete(&self) -> bool {
        self.fence.is_complete(self.value)
    }

    /// Block until the submission has completed.
    pub fn wait(&self) {
        self.fence.wait(self.value);
    }

    /// Block until the submission has completed or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.fence.wait_timeout(self.value, timeout)
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);
static_assertions::assert_impl_all!(SubmitPoint: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_starts_at_zero() {
        let fence = Fence::new();
        assert_eq!(fence.completed_value(), 0);
        assert!(fence.is_complete(0));
        assert!(!fence.is_complete(1));
    }

    #[test]
    fn test_fence_signal_is_monotonic() {
        let fence = Fence::new();
        fence.signal(5);
        fence.signal(3);
        assert_eq!(fence.completed_value(), 5);
    }

    #[test]
    fn test_fence_signal_and_wait() {
        let fence = Fence::new();

        // Simulate GPU signaling from another thread
        let fence_clone = fence.clone();
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            fence_clone.signal(2);
        });

        fence.wait(2);
        assert!(fence.is_complete(2));
        signaller.join().unwrap();
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new();
        fence.signal(1);

        assert!(fence.wait_timeout(1, Duration::from_millis(10)));
        assert!(!fence.wait_timeout(2, Duration::from_millis(10)));
    }

    #[test]
    fn test_fence_clone_shares_timeline() {
        let fence = Fence::new();
        let other = fence.clone();
        other.signal(7);
        assert_eq!(fence.completed_value(), 7);
        assert!(fence.same_timeline(&other));
        assert!(!fence.same_timeline(&Fence::new()));
    }

    #[test]
    fn test_submit_point_completion() {
        let fence = Fence::new();
        let point = SubmitPoint::new(QueueType::Copy, fence.clone(), 3);
        assert!(!point.is_complete());
        fence.signal(3);
        assert!(point.is_complete());
        point.wait();
    }
}
