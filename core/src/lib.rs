//! # Ember Core
//!
//! Platform capabilities shared by the Ember frame scheduler:
//!
//! - [`thread`] - Thread creation with cooperative stop tokens
//! - [`relax`] - Blocking "nothing to do yet" primitive for driving loops
//! - [`profiling`] - Optional Tracy instrumentation macros

pub mod profiling;
pub mod relax;
pub mod thread;

pub use relax::{Relax, SleepRelax};
pub use thread::{
    SpawnError, StdThreadFactory, StopToken, ThreadDesc, ThreadEntry, ThreadFactory, ThreadHandle,
};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
