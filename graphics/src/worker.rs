//! Frame worker: one dedicated thread running a per-frame callback.
//!
//! The owner [`kick`](FrameWorker::kick)s `(frame, slot)` units of work into
//! an unbounded FIFO queue. The worker thread sleeps on a condition variable
//! while the queue is empty, runs the callback for each unit in order, and
//! publishes the frame number as its finished watermark.
//!
//! Stopping is cooperative and checked only between units:
//! [`FrameWorker::stop`] blocks until the callback currently running returns.

use std::collections::VecDeque;
use std::sync::Arc;

use ember_core::{StopToken, ThreadDesc, ThreadFactory, ThreadHandle};
use parking_lot::{Condvar, Mutex};

use crate::profiling::profile_scope;

/// Callback invoked by a worker with `(frame, slot)`.
pub type FrameCallback = Arc<dyn Fn(u64, usize) + Send + Sync>;

#[derive(Debug, Default)]
struct WorkerState {
    queue: VecDeque<(u64, usize)>,
    exit: bool,
    finished: Option<u64>,
}

#[derive(Debug, Default)]
struct WorkerShared {
    state: Mutex<WorkerState>,
    cond: Condvar,
}

impl WorkerShared {
    fn run(&self, token: &StopToken, callback: &(dyn Fn(u64, usize) + Send + Sync)) {
        loop {
            let (frame, slot) = {
                let mut state = self.state.lock();
                loop {
                    if state.exit || token.stop_requested() {
                        return;
                    }
                    if let Some(unit) = state.queue.pop_front() {
                        break unit;
                    }
                    self.cond.wait(&mut state);
                }
            };

            {
                profile_scope!("FrameWorker::callback");
                callback(frame, slot);
            }

            let mut state = self.state.lock();
            state.finished = Some(state.finished.map_or(frame, |f| f.max(frame)));
            self.cond.notify_all();
        }
    }
}

/// A long-lived thread that processes frames in submission order.
///
/// # Example
///
/// ```ignore
/// let mut worker = FrameWorker::new();
/// worker.start(&StdThreadFactory, "update", Arc::new(|frame, slot| simulate(frame, slot)));
/// worker.kick(0, 1);
/// // ...
/// if worker.get_finished_frame() >= Some(0) { /* frame 0 done */ }
/// worker.stop();
/// ```
pub struct FrameWorker {
    shared: Arc<WorkerShared>,
    handle: Option<ThreadHandle>,
}

impl FrameWorker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WorkerShared::default()),
            handle: None,
        }
    }

    /// Spawn the worker thread.
    ///
    /// Clears the queue and the finished watermark. Returns `false` if the
    /// factory could not create the thread.
    ///
    /// # Panics
    ///
    /// Panics if the worker is already running.
    pub fn start(&mut self, factory: &dyn ThreadFactory, name: &str, callback: FrameCallback) -> bool {
        assert!(self.handle.is_none(), "frame worker '{name}' is already running");

        *self.shared.state.lock() = WorkerState::default();

        let shared = self.shared.clone();
        let entry = Box::new(move |token: StopToken| shared.run(&token, &*callback));
        match factory.spawn(&ThreadDesc::new(name), entry) {
            Ok(handle) => {
                log::debug!("Frame worker '{name}' started");
                self.handle = Some(handle);
                true
            }
            Err(err) => {
                log::error!("Failed to start frame worker '{name}': {err}");
                false
            }
        }
    }

    /// Queue a unit of work and wake the worker. Never blocks on the callback.
    pub fn kick(&self, frame: u64, slot: usize) {
        let mut state = self.shared.state.lock();
        state.queue.push_back((frame, slot));
        self.shared.cond.notify_all();
    }

    /// Highest frame whose callback has returned, if any.
    pub fn get_finished_frame(&self) -> Option<u64> {
        self.shared.state.lock().finished
    }

    /// Units queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Ask the worker to exit and join it.
    ///
    /// Queued units that have not started are discarded. Blocks until the
    /// callback in progress, if any, returns.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut state = self.shared.state.lock();
            state.exit = true;
            self.shared.cond.notify_all();
        }
        handle.request_stop();
        let name = handle.name().to_owned();
        handle.join();
        log::debug!("Frame worker '{name}' stopped");
    }
}

impl Default for FrameWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FrameWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("FrameWorker")
            .field("running", &self.handle.is_some())
            .field("pending", &state.queue.len())
            .field("finished", &state.finished)
            .finish()
    }
}

static_assertions::assert_impl_all!(FrameWorker: Send);
