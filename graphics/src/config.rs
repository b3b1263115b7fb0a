//! Explicit configuration objects.
//!
//! [`GraphicsConfig`] is handed to the orchestrator and the render graph at
//! construction and is visible to passes during setup and execution.
//! [`PipelineConfig`] configures the frame pacing controller.

use crate::types::{ClearColor, Extent3d, TextureFormat};

/// Frame pacing policy.
///
/// | Mode | Lead | Presentation |
/// |------|------|--------------|
/// | `Fixed` | up to `buffer_count - 1` | every frame, strictly in order |
/// | `Mailbox` | up to `buffer_count - 1` | latest finished frame, may skip |
/// | `Backpressure` | 0 | lock-step, one frame at a time |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacingMode {
    /// Strict in-order presentation, bounded lead.
    #[default]
    Fixed,
    /// Latest-wins presentation, intermediate frames may be skipped.
    Mailbox,
    /// One frame in flight at a time.
    Backpressure,
}

/// Configuration of the frame pacing controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of ring slots. Must be at least 2.
    pub buffer_count: usize,
    /// Presentation rate cap. 0 means unlimited.
    pub max_fps: u32,
    /// Pacing policy.
    pub mode: PacingMode,
}

impl PipelineConfig {
    /// Create a config with `buffer_count` ring slots, unlimited rate, fixed pacing.
    pub fn new(buffer_count: usize) -> Self {
        Self {
            buffer_count,
            max_fps: 0,
            mode: PacingMode::Fixed,
        }
    }

    /// Cap presentation at `max_fps` frames per second (0 = unlimited).
    pub fn with_max_fps(mut self, max_fps: u32) -> Self {
        self.max_fps = max_fps;
        self
    }

    /// Select the pacing policy.
    pub fn with_mode(mut self, mode: PacingMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Graphics settings shared by the orchestrator, the render graph and passes.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsConfig {
    /// Number of ring slots whose GPU work may overlap.
    pub frames_in_flight: usize,
    /// Allow compute passes that opt in to run on the compute queue.
    pub async_compute: bool,
    /// Allow copy passes that opt in to run on the copy queue.
    pub async_copy: bool,
    /// Present without waiting for vertical blank.
    pub allow_tearing: bool,
    /// Back buffer dimensions.
    pub back_buffer_size: Extent3d,
    /// Back buffer format.
    pub back_buffer_format: TextureFormat,
    /// Color used by the default clear pass.
    pub clear_color: ClearColor,
}

impl GraphicsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_async_compute(mut self, enabled: bool) -> Self {
        self.async_compute = enabled;
        self
    }

    pub fn with_async_copy(mut self, enabled: bool) -> Self {
        self.async_copy = enabled;
        self
    }

    pub fn with_allow_tearing(mut self, enabled: bool) -> Self {
        self.allow_tearing = enabled;
        self
    }

    pub fn with_back_buffer_size(mut self, width: u32, height: u32) -> Self {
        self.back_buffer_size = Extent3d::new_2d(width, height);
        self
    }

    pub fn with_back_buffer_format(mut self, format: TextureFormat) -> Self {
        self.back_buffer_format = format;
        self
    }

    pub fn with_clear_color(mut self, color: ClearColor) -> Self {
        self.clear_color = color;
        self
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            async_compute: false,
            async_copy: false,
            allow_tearing: false,
            back_buffer_size: Extent3d::new_2d(1280, 720),
            back_buffer_format: TextureFormat::Bgra8Unorm,
            clear_color: ClearColor::BLACK,
        }
    }
}
