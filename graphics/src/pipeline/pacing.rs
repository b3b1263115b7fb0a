//! Ring-slot arithmetic and per-policy pacing state.

use crate::config::PacingMode;

/// Ring slots used by one frame in the Update → Render → Present pipeline.
///
/// Each stage works on its own slot: while frame `N` is presented from
/// `present`, the render worker fills `render` and the update worker fills
/// `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameIndices {
    pub present: usize,
    pub render: usize,
    pub update: usize,
}

/// Compute the ring slots of `frame`.
///
/// `base` shifts the ring so that a chosen frame presents from slot 0 (used
/// after a resize).
///
/// # Example
///
/// ```
/// use ember_graphics::pipeline::{FrameIndices, compute_indices};
///
/// assert_eq!(
///     compute_indices(5, 0, 3),
///     FrameIndices { present: 2, render: 0, update: 1 }
/// );
/// ```
///
/// # Panics
///
/// Panics if `buffer_count < 2`.
pub fn compute_indices(frame: u64, base: u64, buffer_count: usize) -> FrameIndices {
    assert!(buffer_count >= 2, "buffer_count must be at least 2");
    let n = buffer_count as u64;
    let present = ((frame % n + base % n) % n) as usize;
    FrameIndices {
        present,
        render: (present + buffer_count - 2) % buffer_count,
        update: (present + buffer_count - 1) % buffer_count,
    }
}

/// Base offset that makes `next_frame` present from slot 0.
pub(crate) fn rebase(next_frame: u64, buffer_count: usize) -> u64 {
    let n = buffer_count as u64;
    (n - next_frame % n) % n
}

/// Counters of the active pacing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingState {
    /// Every frame is presented in order.
    Fixed {
        /// Next frame to hand to the workers.
        produce_frame: u64,
        /// Next frame to present; frames below it are presented.
        total_frame: u64,
    },
    /// The newest frame finished by both workers is presented.
    Mailbox {
        produce_frame: u64,
        last_presented_frame: u64,
        has_presented: bool,
    },
    /// One frame at a time.
    Backpressure { current_frame: u64, in_flight: bool },
}

impl PacingState {
    /// Initial state of `mode`; frame numbering starts at 0.
    pub(crate) fn new(mode: PacingMode) -> Self {
        match mode {
            PacingMode::Fixed => Self::Fixed {
                produce_frame: 0,
                total_frame: 0,
            },
            PacingMode::Mailbox => Self::Mailbox {
                produce_frame: 0,
                last_presented_frame: 0,
                has_presented: false,
            },
            PacingMode::Backpressure => Self::Backpressure {
                current_frame: 0,
                in_flight: false,
            },
        }
    }

    pub fn mode(&self) -> PacingMode {
        match self {
            Self::Fixed { .. } => PacingMode::Fixed,
            Self::Mailbox { .. } => PacingMode::Mailbox,
            Self::Backpressure { .. } => PacingMode::Backpressure,
        }
    }

    /// Next frame number that will be handed to the workers.
    pub fn next_frame(&self) -> u64 {
        match *self {
            Self::Fixed { produce_frame, .. } | Self::Mailbox { produce_frame, .. } => {
                produce_frame
            }
            Self::Backpressure {
                current_frame,
                in_flight,
            } => current_frame + u64::from(in_flight),
        }
    }

    /// Frames handed to the workers and not yet presented (or superseded).
    pub fn in_flight(&self) -> u64 {
        match *self {
            Self::Fixed {
                produce_frame,
                total_frame,
            } => produce_frame - total_frame,
            Self::Mailbox {
                produce_frame,
                last_presented_frame,
                has_presented,
            } => produce_frame - Self::mailbox_base(last_presented_frame, has_presented),
            Self::Backpressure { in_flight, .. } => u64::from(in_flight),
        }
    }

    /// First frame the mailbox has not presented yet.
    pub(crate) fn mailbox_base(last_presented_frame: u64, has_presented: bool) -> u64 {
        if has_presented {
            last_presented_frame + 1
        } else {
            0
        }
    }
}

/// Counters collected by the pacing controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames handed to the workers.
    pub produced: u64,
    /// Frames presented.
    pub presented: u64,
    /// Frames finished but never presented (mailbox only).
    pub skipped: u64,
    /// Resizes applied.
    pub resizes: u64,
}
