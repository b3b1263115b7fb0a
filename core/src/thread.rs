//! Thread creation capability with cooperative stop tokens.
//!
//! Long-lived worker threads are created through a [`ThreadFactory`] so that
//! callers (and tests) can substitute how threads come into existence. Every
//! spawned entry function receives a [`StopToken`] which the owner of the
//! [`ThreadHandle`] can trigger with [`ThreadHandle::request_stop`].
//!
//! Cancellation is cooperative: the entry function decides where it polls
//! the token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Entry point of a spawned thread.
pub type ThreadEntry = Box<dyn FnOnce(StopToken) + Send + 'static>;

/// Error returned when a thread could not be created.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The operating system refused to create the thread.
    #[error("failed to spawn thread '{name}': {source}")]
    Os {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// The factory does not allow creating more threads.
    #[error("thread factory refused to spawn '{0}'")]
    Refused(String),
}

/// Token that signals a stop request to a cooperative thread.
///
/// Cloning a token creates another handle to the same flag.
/// Calling [`request_stop()`](StopToken::request_stop) on any clone affects all.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Creates a new token (stop not requested).
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals a stop request.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor for a thread to be created.
#[derive(Debug, Clone, Default)]
pub struct ThreadDesc {
    /// Thread name, visible in debuggers and the profiler.
    pub name: String,
    /// Stack size in bytes. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl ThreadDesc {
    /// Creates a descriptor with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }

    /// Sets the stack size.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// Handle to a thread created by a [`ThreadFactory`].
///
/// Dropping the handle without calling [`join`](Self::join) detaches the thread.
pub struct ThreadHandle {
    name: String,
    token: StopToken,
    join: Option<JoinHandle<()>>,
}

impl ThreadHandle {
    /// Wraps an already running thread.
    pub fn new(name: impl Into<String>, token: StopToken, join: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            token,
            join: Some(join),
        }
    }

    /// Returns the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the token shared with the thread's entry function.
    pub fn stop_token(&self) -> &StopToken {
        &self.token
    }

    /// Asks the thread to stop at its next poll of the token.
    pub fn request_stop(&self) {
        self.token.request_stop();
    }

    /// Returns true if the thread has returned from its entry function.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Blocks until the thread exits.
    ///
    /// A panic inside the thread is logged, not propagated.
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            log::error!("Thread '{}' panicked", self.name);
        }
    }
}

impl std::fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.name)
            .field("stop_requested", &self.token.stop_requested())
            .finish()
    }
}

/// Capability to create threads.
pub trait ThreadFactory: Send + Sync {
    /// Creates a thread running `entry`.
    fn spawn(&self, desc: &ThreadDesc, entry: ThreadEntry) -> Result<ThreadHandle, SpawnError>;
}

/// Thread factory backed by [`std::thread::Builder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdThreadFactory;

impl ThreadFactory for StdThreadFactory {
    fn spawn(&self, desc: &ThreadDesc, entry: ThreadEntry) -> Result<ThreadHandle, SpawnError> {
        let token = StopToken::new();
        let thread_token = token.clone();

        let mut builder = std::thread::Builder::new().name(desc.name.clone());
        if let Some(size) = desc.stack_size {
            builder = builder.stack_size(size);
        }

        let join = builder
            .spawn(move || entry(thread_token))
            .map_err(|source| SpawnError::Os {
                name: desc.name.clone(),
                source,
            })?;

        log::debug!("Spawned thread '{}'", desc.name);
        Ok(ThreadHandle::new(desc.name.clone(), token, join))
    }
}
