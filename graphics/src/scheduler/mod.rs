//! Per-frame GPU orchestration.
//!
//! [`FrameRenderer`] turns one `(frame, slot)` request from the render worker
//! into GPU work:
//!
//! 1. Wait for the work submitted the last time this ring slot was used
//! 2. Reset the render graph, releasing what that earlier frame retired
//! 3. Import the back buffer and let [`FrameResourceProvider`]s contribute
//! 4. Add the registered passes, or a [`ClearPass`] if there are none
//! 5. Build and execute the graph, then remember every queue's last
//!    submission as the slot's fences
//!
//! A failed build or execute drops the frame: the error is logged, counted
//! and returned, and the next frame starts from scratch.
//!
//! # Synchronization Model
//!
//! | Level | Primitive | Purpose |
//! |-------|-----------|---------|
//! | Pass → Pass, same queue | Barriers | Resource state transitions |
//! | Pass → Pass, other queue | Queue fence wait | GPU-GPU ordering |
//! | Frame → Frame, same slot | [`SubmitPoint`] wait | CPU-GPU, slot reuse |
//!
//! Presentation is split off into [`FramePresenter`] so the driving thread
//! can present while the render worker owns the renderer.

mod sync;
mod upload;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub use sync::{Fence, SubmitPoint};
pub use upload::UploadProvider;

use crate::backend::{BackendContext, PresentMode, Presenter};
use crate::config::GraphicsConfig;
use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::graph::{Pass, RenderGraph};
use crate::passes::ClearPass;
use crate::profiling::profile_function;
use crate::types::{Extent3d, ResourceState};

/// Name under which the back buffer is imported every frame.
pub const BACK_BUFFER: &str = "backbuffer";

/// Slot fence waits longer than this are reported.
const SLOW_SLOT_WAIT: Duration = Duration::from_millis(100);

/// Upper bound on how long dropping a renderer waits for the GPU.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// Auxiliary source of per-frame passes and resources.
///
/// Providers run after the back buffer is imported and before the registered
/// passes are added, so registered passes can look up what they import.
pub trait FrameResourceProvider: Send {
    fn name(&self) -> &str;

    /// Import resources and add passes for the current frame.
    fn contribute(&mut self, graph: &mut RenderGraph) -> GraphicsResult<()>;
}

/// Cloneable presentation handle.
#[derive(Clone)]
pub struct FramePresenter {
    presenter: Arc<dyn Presenter>,
    mode: PresentMode,
}

impl FramePresenter {
    fn new(presenter: Arc<dyn Presenter>, config: &GraphicsConfig) -> Self {
        let mode = if config.allow_tearing {
            PresentMode::Immediate
        } else {
            PresentMode::Vsync
        };
        Self { presenter, mode }
    }

    pub fn mode(&self) -> PresentMode {
        self.mode
    }

    /// Present the back buffer of ring slot `slot`.
    pub fn present(&self, frame: u64, slot: usize) -> GraphicsResult<()> {
        let count = self.presenter.back_buffer_count();
        if count == 0 {
            return Err(no_back_buffers());
        }
        let index = slot % count;
        log::trace!("Presenting frame {frame} (back buffer {index}, {:?})", self.mode);
        self.presenter
            .present(index, self.mode)
            .inspect_err(|err| log::warn!("Present of frame {frame} failed: {err}"))
    }
}

fn no_back_buffers() -> GraphicsError {
    GraphicsError::invalid_state(Facility::Orchestrator, "presenter has no back buffers")
}

impl std::fmt::Debug for FramePresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePresenter")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Builds and submits one frame's render graph per call.
///
/// # Example
///
/// ```ignore
/// let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
/// renderer.register_pass(Arc::new(MyScenePass::new()));
///
/// renderer.render(frame, slot)?;
/// renderer.present(frame, slot)?;
///
/// renderer.wait_idle();
/// ```
pub struct FrameRenderer {
    backend: BackendContext,
    config: GraphicsConfig,
    graph: RenderGraph,
    /// Last submission on every queue, per ring slot.
    slot_fences: Vec<Vec<SubmitPoint>>,
    providers: Vec<Box<dyn FrameResourceProvider>>,
    passes: Vec<Arc<dyn Pass>>,
    clear_pass: Arc<dyn Pass>,
    /// State each back buffer was left in by the last frame that used it.
    back_buffer_states: Vec<ResourceState>,
    presenter: FramePresenter,
    rendered_frames: u64,
    dropped_frames: u64,
}

impl FrameRenderer {
    /// Create a renderer.
    ///
    /// # Panics
    ///
    /// Panics if `config.frames_in_flight` is 0.
    pub fn new(backend: BackendContext, config: GraphicsConfig) -> Self {
        let graph = RenderGraph::new(backend.clone(), config.clone());
        let presenter = FramePresenter::new(backend.presenter.clone(), &config);
        let back_buffer_states = vec![ResourceState::PRESENT; backend.presenter.back_buffer_count()];
        log::debug!(
            "FrameRenderer created: {} frames in flight, {} back buffers, {:?}",
            config.frames_in_flight,
            back_buffer_states.len(),
            presenter.mode()
        );
        Self {
            slot_fences: vec![Vec::new(); config.frames_in_flight],
            backend,
            config,
            graph,
            providers: Vec::new(),
            passes: Vec::new(),
            clear_pass: Arc::new(ClearPass::default()),
            back_buffer_states,
            presenter,
            rendered_frames: 0,
            dropped_frames: 0,
        }
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    /// Graph of the most recent frame.
    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Handle for presenting from another thread.
    pub fn presenter(&self) -> FramePresenter {
        self.presenter.clone()
    }

    /// Add a pass to every subsequent frame, after previously registered ones.
    pub fn register_pass(&mut self, pass: Arc<dyn Pass>) {
        log::debug!("Registered pass '{}'", pass.name());
        self.passes.push(pass);
    }

    /// Remove all registered passes; frames fall back to clearing.
    pub fn clear_registered_passes(&mut self) {
        self.passes.clear();
    }

    pub fn registered_pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn add_provider(&mut self, provider: Box<dyn FrameResourceProvider>) {
        log::debug!("Added frame resource provider '{}'", provider.name());
        self.providers.push(provider);
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Submissions the next use of `slot` will wait for.
    pub fn slot_fences(&self, slot: usize) -> &[SubmitPoint] {
        self.slot_fences
            .get(slot % self.slot_fences.len())
            .map_or(&[], Vec::as_slice)
    }

    /// Record and submit frame `frame` on ring slot `slot`.
    ///
    /// Blocks while the GPU still uses the slot. On failure the frame is
    /// dropped and the error returned.
    pub fn render(&mut self, frame: u64, slot: usize) -> GraphicsResult<()> {
        profile_function!();
        let graph_slot = slot % self.config.frames_in_flight;

        self.wait_slot(graph_slot);
        self.graph.reset(frame, graph_slot);

        let result = self.record(frame, slot);
        // Partial submissions are waited on as well.
        self.slot_fences[graph_slot] = self.graph.queue_tails().cloned().collect();

        match result {
            Ok(()) => {
                self.rendered_frames += 1;
                log::trace!("Frame {frame} submitted on slot {graph_slot}");
                Ok(())
            }
            Err(err) => {
                self.dropped_frames += 1;
                log::error!("Dropped frame {frame}: {err}");
                Err(err)
            }
        }
    }

    fn record(&mut self, frame: u64, slot: usize) -> GraphicsResult<()> {
        if self.back_buffer_states.is_empty() {
            return Err(no_back_buffers());
        }
        let back_buffer = slot % self.back_buffer_states.len();
        let gpu = self
            .backend
            .presenter
            .back_buffer(back_buffer)
            .ok_or_else(no_back_buffers)?;
        let handle =
            self.graph
                .import_texture(BACK_BUFFER, gpu, self.back_buffer_states[back_buffer])?;

        for provider in &mut self.providers {
            provider.contribute(&mut self.graph)?;
        }

        if self.passes.is_empty() {
            self.graph.add_pass(self.clear_pass.clone())?;
        } else {
            for pass in &self.passes {
                self.graph.add_pass(pass.clone())?;
            }
        }

        self.graph.build()?;
        self.graph.execute()?;

        self.back_buffer_states[back_buffer] = self.graph.get_resource(handle)?.current_state();
        log::trace!(
            "Frame {frame}: back buffer {back_buffer} left in {:?}",
            self.back_buffer_states[back_buffer]
        );
        Ok(())
    }

    /// Present frame `frame` from ring slot `slot`.
    pub fn present(&self, frame: u64, slot: usize) -> GraphicsResult<()> {
        self.presenter.present(frame, slot)
    }

    fn wait_slot(&mut self, slot: usize) {
        let start = Instant::now();
        for point in self.slot_fences[slot].drain(..) {
            if !point.wait_timeout(SLOW_SLOT_WAIT) {
                log::warn!(
                    "Ring slot {slot} still busy after {SLOW_SLOT_WAIT:?} ({:?} value {})",
                    point.queue,
                    point.value
                );
                point.wait();
            }
        }
        log::trace!("Ring slot {slot} free after {:?}", start.elapsed());
    }

    /// Block until every submitted frame has completed, then release
    /// retired graph resources.
    pub fn wait_idle(&mut self) {
        for slot in 0..self.slot_fences.len() {
            self.wait_slot(slot);
        }
        self.graph.release_retired();
    }

    /// Resize the back buffers.
    ///
    /// Waits for the GPU first. Back buffers are recreated in `PRESENT`.
    pub fn resize(&mut self, width: u32, height: u32) -> GraphicsResult<()> {
        self.wait_idle();
        self.backend
            .presenter
            .resize(width, height)
            .inspect_err(|err| log::warn!("Resize to {width}x{height} rejected: {err}"))?;
        self.back_buffer_states = vec![ResourceState::PRESENT; self.backend.presenter.back_buffer_count()];
        self.config.back_buffer_size = Extent3d::new_2d(width, height);
        self.graph.config_mut().back_buffer_size = self.config.back_buffer_size;
        log::info!("Back buffers resized to {width}x{height}");
        Ok(())
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        let deadline = Instant::now() + SHUTDOWN_WAIT;
        for (slot, points) in self.slot_fences.iter_mut().enumerate() {
            for point in points.drain(..) {
                if !point.wait_timeout(deadline.saturating_duration_since(Instant::now())) {
                    log::error!(
                        "Renderer dropped while ring slot {slot} is busy ({:?} value {})",
                        point.queue,
                        point.value
                    );
                }
            }
        }
        self.graph.release_retired();
    }
}

impl std::fmt::Debug for FrameRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRenderer")
            .field("graph", &self.graph)
            .field("passes", &self.passes.len())
            .field("providers", &self.providers.len())
            .field("rendered_frames", &self.rendered_frames)
            .field("dropped_frames", &self.dropped_frames)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(FrameRenderer: Send);
static_assertions::assert_impl_all!(FramePresenter: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueueType;
    use crate::backend::dummy::{BackendEvent, DummyBackend};
    use crate::graph::{PassBuilder, PassContext, PassType};

    struct FailingPass;

    impl Pass for FailingPass {
        fn name(&self) -> &str {
            "failing"
        }

        fn pass_type(&self) -> PassType {
            PassType::Render
        }

        fn setup(&self, _builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
            Ok(())
        }

        fn execute(&self, _ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
            Err(GraphicsError::invalid_state(Facility::Graph, "no pipeline state"))
        }
    }

    fn presents(events: &[BackendEvent]) -> Vec<(usize, PresentMode)> {
        events
            .iter()
            .filter_map(|e| match *e {
                BackendEvent::Present { index, mode } => Some((index, mode)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_frame_clears_back_buffer() {
        let backend = DummyBackend::new();
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());

        renderer.render(0, 1).unwrap();
        let bb = backend.context().presenter.back_buffer(1).unwrap();
        assert!(backend.events().iter().any(|e| matches!(
            e,
            BackendEvent::ClearRenderTarget { target, .. } if *target == bb
        )));
        assert_eq!(renderer.rendered_frames(), 1);
        assert_eq!(renderer.slot_fences(1).len(), 1);
        assert_eq!(renderer.graph().pass_count(), 1);
    }

    #[test]
    fn test_present_mode_follows_config() {
        let backend = DummyBackend::new();
        let vsync = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        vsync.present(0, 4).unwrap();

        let tearing = FrameRenderer::new(
            backend.context(),
            GraphicsConfig::default().with_allow_tearing(true),
        );
        tearing.presenter().present(1, 2).unwrap();

        assert_eq!(
            presents(&backend.events()),
            vec![(1, PresentMode::Vsync), (2, PresentMode::Immediate)]
        );
    }

    #[test]
    fn test_failed_frame_is_dropped() {
        let backend = DummyBackend::new();
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        renderer.register_pass(Arc::new(FailingPass));

        let err = renderer.render(0, 0).unwrap_err();
        assert!(err.message().contains("no pipeline state"));
        assert_eq!(renderer.dropped_frames(), 1);
        assert_eq!(backend.outstanding_leases(), 0);

        // The next frame is independent.
        renderer.clear_registered_passes();
        renderer.render(1, 1).unwrap();
        assert_eq!(renderer.rendered_frames(), 1);
    }

    #[test]
    fn test_slot_reuse_waits_for_previous_work() {
        let backend = DummyBackend::new();
        backend.set_auto_complete(false);
        let config = GraphicsConfig::default().with_frames_in_flight(2);
        let mut renderer = FrameRenderer::new(backend.context(), config);

        renderer.render(0, 0).unwrap();
        renderer.render(1, 1).unwrap();
        let fence = backend.queue_fence(QueueType::Graphics);
        assert_eq!(fence.completed_value(), 0);

        let gpu = {
            let backend = backend.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                backend.complete_all();
            })
        };
        // Slot 0 again: blocks until frame 0's submission completes.
        renderer.render(2, 2).unwrap();
        assert!(fence.completed_value() >= 1);
        gpu.join().unwrap();

        backend.complete_all();
        renderer.wait_idle();
        assert_eq!(fence.completed_value(), backend.submitted_value(QueueType::Graphics));
    }

    #[test]
    fn test_rejected_resize_keeps_rendering() {
        let backend = DummyBackend::new();
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        renderer.render(0, 0).unwrap();
        let before = backend.context().presenter.back_buffer(0).unwrap();

        // A minimized window reports 0x0.
        assert!(renderer.resize(0, 0).is_err());
        assert!(backend.is_live(before));
        assert_eq!(renderer.config().back_buffer_size, GraphicsConfig::default().back_buffer_size);

        renderer.render(1, 1).unwrap();
        renderer.present(1, 1).unwrap();
        assert_eq!(renderer.dropped_frames(), 0);
    }

    #[test]
    fn test_drop_with_unfinished_gpu_work_returns() {
        let backend = DummyBackend::new();
        backend.set_auto_complete(false);
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        renderer.render(0, 0).unwrap();

        let start = Instant::now();
        drop(renderer);
        assert!(start.elapsed() < SHUTDOWN_WAIT * 5);
        assert_eq!(backend.queue_fence(QueueType::Graphics).completed_value(), 0);
    }

    #[test]
    fn test_back_buffer_state_is_carried_between_frames() {
        let backend = DummyBackend::new();
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        renderer.render(0, 0).unwrap();
        backend.take_events();

        renderer.render(3, 0).unwrap();
        let bb = backend.context().presenter.back_buffer(0).unwrap();
        let transitions: Vec<_> = backend
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Barriers { barriers, .. } => Some(barriers),
                _ => None,
            })
            .flatten()
            .filter(|b| b.resource() == bb)
            .collect();
        // PRESENT -> RENDER_TARGET -> PRESENT, starting from the saved state.
        assert_eq!(transitions.len(), 2);
    }

    #[test]
    fn test_resize_recreates_back_buffers() {
        let backend = DummyBackend::new();
        let mut renderer = FrameRenderer::new(backend.context(), GraphicsConfig::default());
        renderer.render(0, 0).unwrap();
        let old = backend.context().presenter.back_buffer(0).unwrap();

        renderer.resize(640, 480).unwrap();
        assert!(!backend.is_live(old));
        assert_eq!(renderer.config().back_buffer_size, Extent3d::new_2d(640, 480));
        assert_eq!(renderer.graph().config().back_buffer_size, Extent3d::new_2d(640, 480));

        renderer.render(1, 1).unwrap();
        assert!(backend.events().contains(&BackendEvent::Resize {
            width: 640,
            height: 480
        }));
    }
}
