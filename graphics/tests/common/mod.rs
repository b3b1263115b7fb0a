//! Shared infrastructure for the pipeline and frame integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_graphics::{FramePipeline, PacingMode, PipelineConfig};
use parking_lot::Mutex;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A callback observed by a [`Recorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Update callback; `seeded` is true when run on the driving thread.
    Update { frame: u64, slot: usize, seeded: bool },
    Render { frame: u64, slot: usize },
    Present { frame: u64, slot: usize },
    Resize,
}

/// Ordered log of every pipeline callback.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn presented(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match *e {
                Event::Present { frame, .. } => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

fn on_driving_thread() -> bool {
    !matches!(
        std::thread::current().name(),
        Some("ember-update" | "ember-render")
    )
}

/// Build a pipeline whose callbacks are recorded.
///
/// `work` is slept in both worker callbacks.
pub fn recorded_pipeline(config: PipelineConfig, work: Duration) -> (FramePipeline, Recorder) {
    let recorder = Recorder::default();
    let mut pipeline = FramePipeline::new().with_relax(Arc::new(|| std::thread::yield_now()));
    pipeline.configure(config);

    let r = recorder.clone();
    pipeline.bind_update(move |frame, slot| {
        std::thread::sleep(work);
        r.push(Event::Update {
            frame,
            slot,
            seeded: on_driving_thread(),
        });
    });
    let r = recorder.clone();
    pipeline.bind_render(move |frame, slot| {
        std::thread::sleep(work);
        r.push(Event::Render { frame, slot });
    });
    let r = recorder.clone();
    pipeline.bind_present(move |frame, slot| r.push(Event::Present { frame, slot }));
    let r = recorder.clone();
    pipeline.bind_resize(move || r.push(Event::Resize));

    (pipeline, recorder)
}

/// Step until `done` holds or `timeout` elapses. Returns whether `done` held.
pub fn step_until(
    pipeline: &mut FramePipeline,
    timeout: Duration,
    mut done: impl FnMut(&FramePipeline) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done(pipeline) {
            return true;
        }
        pipeline.step();
    }
    done(pipeline)
}

pub fn config(mode: PacingMode, buffer_count: usize) -> PipelineConfig {
    PipelineConfig::new(buffer_count).with_mode(mode)
}

pub const TIMEOUT: Duration = Duration::from_secs(10);
