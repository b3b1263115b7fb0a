//! # Ember Graphics
//!
//! Frame pacing and per-frame GPU work scheduling.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FramePipeline`] - Update → Render → Present pacing over two worker threads
//! - [`FrameWorker`] - A dedicated thread running one callback per frame
//! - [`FrameRenderer`] - Per-frame orchestration: slot reuse, graph build, submission
//! - [`RenderGraph`] - Declarative passes with automatic dependencies and barriers
//! - [`backend`] - Capability traits the scheduler consumes, plus a Dummy backend
//!
//! ## Example
//!
//! ```ignore
//! use ember_graphics::{
//!     DummyBackend, FramePipeline, FrameRenderer, GraphicsConfig, PacingMode, PipelineConfig,
//! };
//!
//! let backend = DummyBackend::new();
//! let renderer = Arc::new(Mutex::new(FrameRenderer::new(backend.context(), GraphicsConfig::default())));
//! let presenter = renderer.lock().presenter();
//!
//! let mut pipeline = FramePipeline::new();
//! pipeline.configure(PipelineConfig::default().with_mode(PacingMode::Mailbox));
//! pipeline.bind_update(|frame, slot| simulate(frame, slot));
//! pipeline.bind_render(move |frame, slot| { let _ = renderer.lock().render(frame, slot); });
//! pipeline.bind_present(move |frame, slot| { let _ = presenter.present(frame, slot); });
//! pipeline.start();
//! while running {
//!     pipeline.step();
//! }
//! pipeline.stop();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod passes;
pub mod pipeline;
pub mod profiling;
pub mod scheduler;
pub mod types;
pub mod worker;

// Re-export main types for convenience
#[cfg(any(test, feature = "dummy"))]
pub use backend::dummy::DummyBackend;
pub use backend::{BackendContext, GpuResourceId, PresentMode, QueueType};
pub use config::{GraphicsConfig, PacingMode, PipelineConfig};
pub use error::{ErrorKind, Facility, GraphicsError, GraphicsResult, Severity};
pub use graph::{GraphState, Pass, PassBuilder, PassContext, PassHandle, PassType, RenderGraph, ResourceHandle};
pub use passes::{ClearPass, CopyBufferPass};
pub use pipeline::{FramePipeline, PipelineStatus, ResizeRequester};
pub use scheduler::{
    BACK_BUFFER, Fence, FramePresenter, FrameRenderer, FrameResourceProvider, SubmitPoint,
    UploadProvider,
};
pub use types::{
    BufferDescriptor, BufferUsage, ClearColor, Extent3d, ResourceState, TextureDescriptor,
    TextureFormat, TextureUsage,
};
pub use worker::{FrameCallback, FrameWorker};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// Only logs the version; call it once at startup.
pub fn init() {
    log::info!("Ember Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_render_graph_creation() {
        let backend = DummyBackend::new();
        let graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
        assert_eq!(graph.state(), GraphState::Reset);
        assert_eq!(graph.pass_count(), 0);
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
