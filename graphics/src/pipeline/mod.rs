//! Frame pacing controller.
//!
//! [`FramePipeline`] drives a three-stage pipeline over a ring of
//! `buffer_count` slots:
//!
//! ```text
//!            slot u            slot r            slot p
//!   frame N: [Update] ───────► [Render] ───────► [Present]
//!            update worker     render worker     driving thread
//! ```
//!
//! The update and render callbacks run on two long-lived [`FrameWorker`]s;
//! the present callback runs on the thread calling [`step`](FramePipeline::step).
//! The active [`PacingMode`](crate::config::PacingMode) decides how far production may run ahead of
//! presentation and which finished frame is shown:
//!
//! | Policy | Production gate | Presentation |
//! |--------|-----------------|--------------|
//! | Fixed | `produce - total < buffer_count - 1` | frame `total` once both workers finished it |
//! | Mailbox | `produce - base < buffer_count - 1` | newest frame both workers finished; may skip |
//! | Backpressure | nothing in flight | as soon as both finish, then the next frame is kicked |
//!
//! When no progress is possible, `step` calls the [`Relax`] capability
//! instead of spinning.
//!
//! # Resizing
//!
//! [`poll_resize_request`](FramePipeline::poll_resize_request) (or a
//! [`ResizeRequester`] on another thread) raises a pending flag. Production
//! stops, in-flight frames drain, then the ring is rebased so the next frame
//! presents from slot 0, the resize callback runs and every slot is reseeded
//! through the update callback.
//!
//! # Example
//!
//! ```ignore
//! let renderer = Arc::new(Mutex::new(FrameRenderer::new(backend.context(), config)));
//! let presenter = renderer.lock().presenter();
//!
//! let mut pipeline = FramePipeline::new();
//! pipeline.configure(PipelineConfig::new(3).with_mode(PacingMode::Mailbox));
//! pipeline.bind_update(move |frame, slot| world.update(frame, slot));
//! pipeline.bind_render(move |frame, slot| {
//!     let _ = renderer.lock().render(frame, slot);
//! });
//! pipeline.bind_present(move |frame, slot| {
//!     let _ = presenter.present(frame, slot);
//! });
//!
//! if pipeline.start() {
//!     while running() {
//!         pipeline.step();
//!     }
//! }
//! pipeline.stop();
//! ```

mod pacing;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ember_core::{Relax, SleepRelax, StdThreadFactory, ThreadFactory};

pub use pacing::{FrameIndices, FrameStats, PacingState, compute_indices};

use crate::config::PipelineConfig;
use crate::profiling::{frame_mark, profile_plot, profile_scope};
use crate::worker::{FrameCallback, FrameWorker};

/// Present callback, run on the driving thread with `(frame, slot)`.
pub type PresentCallback = Box<dyn FnMut(u64, usize) + Send>;

/// Resize callback, run on the driving thread before the ring is reseeded.
pub type ResizeCallback = Box<dyn FnMut() + Send>;

/// Lifecycle of a [`FramePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStatus {
    NotStarted,
    Running,
    /// Stopped, or a worker failed to start.
    Finished,
}

/// Thread-safe handle that requests a deferred resize.
#[derive(Debug, Clone)]
pub struct ResizeRequester {
    pending: Arc<AtomicBool>,
}

impl ResizeRequester {
    pub fn request(&self) {
        self.pending.store(true, Ordering::Relaxed);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Relaxed)
    }
}

/// Paces frame production against presentation.
///
/// # Thread Safety
///
/// The pipeline itself is driven from one thread. Only resize requests may
/// come from elsewhere, through [`ResizeRequester`].
pub struct FramePipeline {
    config: PipelineConfig,
    status: PipelineStatus,
    pacing: PacingState,
    /// Ring offset applied by the last resize.
    base: u64,
    update: Option<FrameCallback>,
    render: Option<FrameCallback>,
    present: Option<PresentCallback>,
    resize: Option<ResizeCallback>,
    update_worker: FrameWorker,
    render_worker: FrameWorker,
    factory: Arc<dyn ThreadFactory>,
    relax: Arc<dyn Relax>,
    resize_pending: Arc<AtomicBool>,
    last_present: Option<Instant>,
    stats: FrameStats,
}

impl FramePipeline {
    /// Create a pipeline with the default configuration, standard threads and
    /// a sleeping relax.
    pub fn new() -> Self {
        let config = PipelineConfig::default();
        Self {
            config,
            status: PipelineStatus::NotStarted,
            pacing: PacingState::new(config.mode),
            base: 0,
            update: None,
            render: None,
            present: None,
            resize: None,
            update_worker: FrameWorker::new(),
            render_worker: FrameWorker::new(),
            factory: Arc::new(StdThreadFactory),
            relax: Arc::new(SleepRelax::default()),
            resize_pending: Arc::new(AtomicBool::new(false)),
            last_present: None,
            stats: FrameStats::default(),
        }
    }

    /// Use `factory` to create the worker threads.
    pub fn with_thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `relax` when a step makes no progress.
    pub fn with_relax(mut self, relax: Arc<dyn Relax>) -> Self {
        self.relax = relax;
        self
    }

    fn assert_not_running(&self, operation: &str) {
        assert!(
            self.status != PipelineStatus::Running,
            "{operation} while the frame pipeline is running"
        );
    }

    /// Set ring size, rate cap and pacing policy.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline is running.
    pub fn configure(&mut self, config: PipelineConfig) {
        self.assert_not_running("configure");
        self.config = config;
        self.pacing = PacingState::new(config.mode);
    }

    /// Bind the callback run on the update worker (and to seed ring slots).
    pub fn bind_update(&mut self, callback: impl Fn(u64, usize) + Send + Sync + 'static) {
        self.assert_not_running("bind_update");
        self.update = Some(Arc::new(callback));
    }

    /// Bind the callback run on the render worker.
    pub fn bind_render(&mut self, callback: impl Fn(u64, usize) + Send + Sync + 'static) {
        self.assert_not_running("bind_render");
        self.render = Some(Arc::new(callback));
    }

    /// Bind the callback run by [`step`](Self::step) to present a frame.
    pub fn bind_present(&mut self, callback: impl FnMut(u64, usize) + Send + 'static) {
        self.assert_not_running("bind_present");
        self.present = Some(Box::new(callback));
    }

    /// Bind the optional callback run when a deferred resize is applied.
    pub fn bind_resize(&mut self, callback: impl FnMut() + Send + 'static) {
        self.assert_not_running("bind_resize");
        self.resize = Some(Box::new(callback));
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Counters of the active pacing policy.
    pub fn pacing_state(&self) -> PacingState {
        self.pacing
    }

    /// Watermark of the update worker.
    pub fn update_finished(&self) -> Option<u64> {
        self.update_worker.get_finished_frame()
    }

    /// Watermark of the render worker.
    pub fn render_finished(&self) -> Option<u64> {
        self.render_worker.get_finished_frame()
    }

    /// Ring slots of `frame` under the current base offset.
    pub fn indices(&self, frame: u64) -> FrameIndices {
        compute_indices(frame, self.base, self.config.buffer_count)
    }

    /// Seed every ring slot, then start both workers.
    ///
    /// Returns `false` and moves to [`PipelineStatus::Finished`] if a worker
    /// thread could not be created.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_count < 2`, if the update, render or present
    /// callback is unbound, or if the pipeline is already running.
    pub fn start(&mut self) -> bool {
        self.assert_not_running("start");
        assert!(
            self.config.buffer_count >= 2,
            "buffer_count must be at least 2, got {}",
            self.config.buffer_count
        );
        let Some(update) = self.update.clone() else {
            panic!("update callback is not bound");
        };
        let Some(render) = self.render.clone() else {
            panic!("render callback is not bound");
        };
        assert!(self.present.is_some(), "present callback is not bound");

        self.pacing = PacingState::new(self.config.mode);
        self.base = 0;
        self.stats = FrameStats::default();
        self.last_present = None;
        self.resize_pending.store(false, Ordering::Relaxed);

        self.seed_slots(0);

        let started = self
            .update_worker
            .start(&*self.factory, "ember-update", update)
            && self
                .render_worker
                .start(&*self.factory, "ember-render", render);
        if !started {
            self.update_worker.stop();
            self.render_worker.stop();
            self.status = PipelineStatus::Finished;
            return false;
        }

        self.status = PipelineStatus::Running;
        log::info!(
            "Frame pipeline started: {} slots, {:?} pacing, max_fps {}",
            self.config.buffer_count,
            self.config.mode,
            self.config.max_fps
        );
        true
    }

    /// Advance the active pacing policy once.
    ///
    /// Returns `true` if a frame was produced, presented, or a resize was
    /// applied. Otherwise relaxes and returns `false`.
    pub fn step(&mut self) -> bool {
        if self.status != PipelineStatus::Running {
            return false;
        }
        profile_scope!("FramePipeline::step");

        let progressed = match self.pacing {
            PacingState::Fixed {
                produce_frame,
                total_frame,
            } => self.step_fixed(produce_frame, total_frame),
            PacingState::Mailbox {
                produce_frame,
                last_presented_frame,
                has_presented,
            } => self.step_mailbox(produce_frame, last_presented_frame, has_presented),
            PacingState::Backpressure {
                current_frame,
                in_flight,
            } => self.step_backpressure(current_frame, in_flight),
        };

        profile_plot!("pacing lead", self.pacing.in_flight());
        if !progressed {
            self.relax.relax();
        }
        progressed
    }

    /// Request a deferred resize. Callable through a [`ResizeRequester`] from
    /// any thread.
    pub fn poll_resize_request(&self) {
        self.resize_pending.store(true, Ordering::Relaxed);
    }

    pub fn resize_requester(&self) -> ResizeRequester {
        ResizeRequester {
            pending: self.resize_pending.clone(),
        }
    }

    /// Stop both workers. Frames in flight are abandoned.
    pub fn stop(&mut self) {
        if self.status != PipelineStatus::Running {
            return;
        }
        self.update_worker.stop();
        self.render_worker.stop();
        self.status = PipelineStatus::Finished;
        log::info!(
            "Frame pipeline stopped: {} produced, {} presented, {} skipped",
            self.stats.produced,
            self.stats.presented,
            self.stats.skipped
        );
    }

    // ------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------

    fn step_fixed(&mut self, mut produce_frame: u64, mut total_frame: u64) -> bool {
        let lead = self.config.buffer_count as u64 - 1;
        let mut progressed = false;

        if self.resize_requested() && produce_frame == total_frame {
            self.apply_resize(produce_frame);
            progressed = true;
        }

        if total_frame < produce_frame && self.both_finished(total_frame) && self.present_due() {
            self.present_frame(total_frame);
            total_frame += 1;
            progressed = true;
        }

        while !self.resize_requested() && produce_frame - total_frame < lead {
            self.produce(produce_frame);
            produce_frame += 1;
            progressed = true;
        }

        debug_assert!(total_frame <= produce_frame);
        debug_assert!(produce_frame - total_frame <= lead);
        self.pacing = PacingState::Fixed {
            produce_frame,
            total_frame,
        };
        progressed
    }

    fn step_mailbox(
        &mut self,
        mut produce_frame: u64,
        mut last_presented_frame: u64,
        mut has_presented: bool,
    ) -> bool {
        let lead = self.config.buffer_count as u64 - 1;
        let mut progressed = false;
        let mut base = PacingState::mailbox_base(last_presented_frame, has_presented);
        assert!(
            produce_frame - base <= lead,
            "mailbox lead bound violated: produced {produce_frame}, presented up to {base}"
        );

        if self.resize_requested() && produce_frame == base {
            assert!(
                produce_frame == 0 || self.both_finished(produce_frame - 1),
                "mailbox resize with frames still running"
            );
            self.apply_resize(produce_frame);
            progressed = true;
        }

        if let (Some(update), Some(render)) = (self.update_finished(), self.render_finished()) {
            let candidate = update.min(render);
            let newer = !has_presented || candidate > last_presented_frame;
            if newer && candidate < produce_frame && self.present_due() {
                self.stats.skipped += candidate - base;
                self.present_frame(candidate);
                last_presented_frame = candidate;
                has_presented = true;
                base = candidate + 1;
                progressed = true;
            }
        }

        while !self.resize_requested() && produce_frame - base < lead {
            self.produce(produce_frame);
            produce_frame += 1;
            progressed = true;
        }

        self.pacing = PacingState::Mailbox {
            produce_frame,
            last_presented_frame,
            has_presented,
        };
        progressed
    }

    fn step_backpressure(&mut self, mut current_frame: u64, mut in_flight: bool) -> bool {
        let mut progressed = false;

        if in_flight && self.both_finished(current_frame) && self.present_due() {
            self.present_frame(current_frame);
            current_frame += 1;
            in_flight = false;
            progressed = true;
        }

        if !in_flight {
            if self.resize_requested() {
                self.apply_resize(current_frame);
            } else {
                self.produce(current_frame);
                in_flight = true;
            }
            progressed = true;
        }

        self.pacing = PacingState::Backpressure {
            current_frame,
            in_flight,
        };
        progressed
    }

    // ------------------------------------------------------------------
    // Shared steps
    // ------------------------------------------------------------------

    fn resize_requested(&self) -> bool {
        self.resize_pending.load(Ordering::Relaxed)
    }

    fn both_finished(&self, frame: u64) -> bool {
        self.update_finished().is_some_and(|f| f >= frame)
            && self.render_finished().is_some_and(|f| f >= frame)
    }

    fn present_due(&self) -> bool {
        if self.config.max_fps == 0 {
            return true;
        }
        let interval = Duration::from_secs_f64(1.0 / f64::from(self.config.max_fps));
        self.last_present
            .is_none_or(|last| last.elapsed() >= interval)
    }

    fn produce(&mut self, frame: u64) {
        let idx = self.indices(frame);
        log::trace!(
            "Producing frame {frame}: update slot {}, render slot {}",
            idx.update,
            idx.render
        );
        self.update_worker.kick(frame, idx.update);
        self.render_worker.kick(frame, idx.render);
        self.stats.produced += 1;
    }

    fn present_frame(&mut self, frame: u64) {
        let idx = self.indices(frame);
        log::trace!("Presenting frame {frame} from slot {}", idx.present);
        if let Some(present) = self.present.as_mut() {
            present(frame, idx.present);
        }
        frame_mark!();
        self.last_present = Some(Instant::now());
        self.stats.presented += 1;
    }

    fn seed_slots(&self, frame: u64) {
        if let Some(update) = &self.update {
            for slot in 0..self.config.buffer_count {
                update(frame, slot);
            }
        }
    }

    fn apply_resize(&mut self, next_frame: u64) {
        self.base = pacing::rebase(next_frame, self.config.buffer_count);
        if let Some(resize) = self.resize.as_mut() {
            resize();
        }
        self.seed_slots(next_frame);
        self.resize_pending.store(false, Ordering::Relaxed);
        self.stats.resizes += 1;
        log::info!(
            "Resize applied before frame {next_frame}; ring base is now {}",
            self.base
        );
    }
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("pacing", &self.pacing)
            .field("base", &self.base)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(FramePipeline: Send);
