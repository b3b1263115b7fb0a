use std::sync::Arc;

use super::*;
use crate::backend::dummy::{BackendEvent, DummyBackend};
use crate::error::GraphicsError;
use crate::types::{BufferUsage, TextureFormat, TextureUsage};

/// Configurable pass used across the graph tests.
struct TestPass {
    name: String,
    pass_type: PassType,
    async_queue: bool,
    reads: Vec<(String, ResourceState)>,
    writes: Vec<(String, ResourceState, Option<ResourceState>)>,
    fail: bool,
}

impl TestPass {
    fn new(name: &str, pass_type: PassType) -> Self {
        Self {
            name: name.to_owned(),
            pass_type,
            async_queue: false,
            reads: Vec::new(),
            writes: Vec::new(),
            fail: false,
        }
    }

    fn reads(mut self, resource: &str, state: ResourceState) -> Self {
        self.reads.push((resource.to_owned(), state));
        self
    }

    fn writes(mut self, resource: &str, state: ResourceState) -> Self {
        self.writes.push((resource.to_owned(), state, None));
        self
    }

    fn writes_with_final(mut self, resource: &str, state: ResourceState, last: ResourceState) -> Self {
        self.writes.push((resource.to_owned(), state, Some(last)));
        self
    }

    fn async_queue(mut self) -> Self {
        self.async_queue = true;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn build(self) -> Arc<dyn Pass> {
        Arc::new(self)
    }
}

fn find(builder: &PassBuilder<'_>, name: &str) -> GraphicsResult<(ResourceHandle, ResourceKind)> {
    let handle = builder
        .lookup(name)
        .ok_or_else(|| GraphicsError::invalid_arg(Facility::Graph, format!("no resource '{name}'")))?;
    Ok((handle, builder.resource(handle)?.kind()))
}

impl Pass for TestPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass_type(&self) -> PassType {
        self.pass_type
    }

    fn async_queue(&self) -> bool {
        self.async_queue
    }

    fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
        for (name, state) in &self.reads {
            match find(builder, name)? {
                (handle, ResourceKind::Texture) => builder.read_texture(handle, *state),
                (handle, ResourceKind::Buffer) => builder.read_buffer(handle, *state),
            }
        }
        for (name, state, last) in &self.writes {
            match (find(builder, name)?, last) {
                ((handle, ResourceKind::Texture), None) => builder.write_texture(handle, *state),
                ((handle, ResourceKind::Texture), Some(last)) => {
                    builder.write_texture_with_final(handle, *state, *last)
                }
                ((handle, ResourceKind::Buffer), None) => builder.write_buffer(handle, *state),
                ((handle, ResourceKind::Buffer), Some(last)) => {
                    builder.write_buffer_with_final(handle, *state, *last)
                }
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
        if self.fail {
            return Err(GraphicsError::invalid_state(
                Facility::Graph,
                format!("{} failed on purpose", self.name),
            ));
        }
        match self.pass_type {
            PassType::Render => ctx.commands().draw(3, 1),
            PassType::Compute => ctx.commands().dispatch(1, 1, 1),
            PassType::Copy => {}
        }
        Ok(())
    }
}

fn setup() -> (DummyBackend, RenderGraph) {
    let backend = DummyBackend::new();
    let graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
    (backend, graph)
}

fn color_target() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        64,
        64,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
    )
}

fn uav_buffer() -> BufferDescriptor {
    BufferDescriptor::new(256, BufferUsage::STORAGE)
}

fn submits(events: &[BackendEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, BackendEvent::Submit { .. }))
        .count()
}

// ------------------------------------------------------------------
// Declaration
// ------------------------------------------------------------------

#[test]
fn test_new_graph_is_reset() {
    let (_backend, graph) = setup();
    assert_eq!(graph.state(), GraphState::Reset);
    assert_eq!(graph.pass_count(), 0);
    assert_eq!(graph.resource_count(), 0);
}

#[test]
fn test_add_pass_moves_to_declared() {
    let (_backend, mut graph) = setup();
    graph
        .create_transient_texture("color", &color_target(), ResourceState::COMMON)
        .unwrap();
    let pass = graph
        .add_pass(TestPass::new("draw", PassType::Render).writes("color", ResourceState::RENDER_TARGET).build())
        .unwrap();

    assert_eq!(pass.index(), 0);
    assert_eq!(graph.state(), GraphState::Declared);
    assert_eq!(graph.pass_name(pass), Some("draw"));
}

#[test]
fn test_setup_error_propagates() {
    let (_backend, mut graph) = setup();
    let err = graph
        .add_pass(TestPass::new("lost", PassType::Render).reads("missing", ResourceState::COPY_SOURCE).build())
        .unwrap_err();
    assert!(err.is_invalid_arg());
    assert_eq!(graph.pass_count(), 0);
}

#[test]
fn test_stale_handle_after_reset() {
    let (_backend, mut graph) = setup();
    let handle = graph
        .create_transient_texture("color", &color_target(), ResourceState::COMMON)
        .unwrap();
    graph.validate_handle(handle, ResourceKind::Texture).unwrap();
    assert!(
        graph
            .validate_handle(handle, ResourceKind::Buffer)
            .unwrap_err()
            .is_invalid_arg()
    );

    graph.reset(1, 1);
    let err = graph
        .validate_handle(handle, ResourceKind::Texture)
        .unwrap_err();
    assert!(err.is_invalid_arg());
    assert!(err.message().contains("stale"));

    // A new resource in the same table slot never aliases the old handle.
    let fresh = graph
        .create_transient_texture("color", &color_target(), ResourceState::COMMON)
        .unwrap();
    assert_eq!(fresh.index(), handle.index());
    assert!(
        graph
            .validate_handle(handle, ResourceKind::Texture)
            .unwrap_err()
            .message()
            .contains("stale")
    );
    graph.validate_handle(fresh, ResourceKind::Texture).unwrap();
}

#[test]
#[should_panic(expected = "cannot depend on itself")]
fn test_self_dependency_panics() {
    let (_backend, mut graph) = setup();
    let pass = graph
        .add_pass(TestPass::new("a", PassType::Compute).build())
        .unwrap();
    graph.add_dependency(pass, pass);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_dependency_out_of_range_panics() {
    let (_backend, mut graph) = setup();
    let pass = graph
        .add_pass(TestPass::new("a", PassType::Compute).build())
        .unwrap();
    graph.add_dependency(pass, PassHandle::new(7));
}

#[test]
#[should_panic(expected = "reads with write state")]
fn test_read_with_write_state_panics() {
    let (_backend, mut graph) = setup();
    graph
        .create_transient_texture("color", &color_target(), ResourceState::COMMON)
        .unwrap();
    let _ = graph.add_pass(
        TestPass::new("bad", PassType::Render)
            .reads("color", ResourceState::RENDER_TARGET)
            .build(),
    );
}

// ------------------------------------------------------------------
// Build
// ------------------------------------------------------------------

#[test]
fn test_dependencies_from_accesses() {
    let (_backend, mut graph) = setup();
    graph
        .create_transient_texture("r", &color_target(), ResourceState::COMMON)
        .unwrap();

    let w1 = graph
        .add_pass(TestPass::new("w1", PassType::Render).writes("r", ResourceState::RENDER_TARGET).build())
        .unwrap();
    let r1 = graph
        .add_pass(TestPass::new("r1", PassType::Render).reads("r", ResourceState::PIXEL_SHADER_RESOURCE).build())
        .unwrap();
    let w2 = graph
        .add_pass(TestPass::new("w2", PassType::Render).writes("r", ResourceState::RENDER_TARGET).build())
        .unwrap();
    graph.build().unwrap();

    assert_eq!(graph.state(), GraphState::OrderBuilt);
    assert!(graph.dependencies(w1).is_empty());
    assert_eq!(graph.dependencies(r1), vec![w1]);
    // WAW on w1 and WAR on r1
    assert_eq!(graph.dependencies(w2), vec![w1, r1]);
    assert_eq!(graph.execution_order(), vec![w1, r1, w2]);
}

#[test]
fn test_explicit_dependency_reorders() {
    let (_backend, mut graph) = setup();
    let a = graph
        .add_pass(TestPass::new("a", PassType::Compute).build())
        .unwrap();
    let b = graph
        .add_pass(TestPass::new("b", PassType::Compute).build())
        .unwrap();
    graph.add_dependency(a, b);
    graph.build().unwrap();

    assert_eq!(graph.execution_order(), vec![b, a]);
}

#[test]
fn test_cycle_is_reported_and_execute_refused() {
    let (backend, mut graph) = setup();
    graph
        .create_transient_texture("r", &color_target(), ResourceState::COMMON)
        .unwrap();

    let a = graph
        .add_pass(TestPass::new("a", PassType::Render).writes("r", ResourceState::RENDER_TARGET).build())
        .unwrap();
    graph
        .add_pass(
            TestPass::new("b", PassType::Render)
                .reads("r", ResourceState::PIXEL_SHADER_RESOURCE)
                .writes("r", ResourceState::RENDER_TARGET)
                .build(),
        )
        .unwrap();
    let c = graph
        .add_pass(TestPass::new("c", PassType::Render).reads("r", ResourceState::PIXEL_SHADER_RESOURCE).build())
        .unwrap();
    graph.add_dependency(a, c);

    let err = graph.build().unwrap_err();
    assert!(err.is_invalid_state());
    assert!(err.message().contains("dependency cycle"));
    assert_eq!(graph.state(), GraphState::DependencyBuilt);

    let err = graph.execute().unwrap_err();
    assert!(err.is_invalid_state());
    assert_eq!(submits(&backend.events()), 0);
}

#[test]
fn test_transient_read_before_write() {
    let (_backend, mut graph) = setup();
    graph
        .create_transient_texture("r", &color_target(), ResourceState::COMMON)
        .unwrap();
    graph
        .add_pass(TestPass::new("reader", PassType::Render).reads("r", ResourceState::PIXEL_SHADER_RESOURCE).build())
        .unwrap();

    let err = graph.build().unwrap_err();
    assert!(err.is_invalid_state());
    assert!(err.message().starts_with("read before write"));
}

#[test]
fn test_imported_read_without_writer_is_allowed() {
    let (backend, mut graph) = setup();
    let gpu = backend.context().presenter.back_buffer(0).unwrap();
    graph
        .import_texture("r", gpu, ResourceState::PIXEL_SHADER_RESOURCE)
        .unwrap();
    graph
        .add_pass(TestPass::new("reader", PassType::Render).reads("r", ResourceState::PIXEL_SHADER_RESOURCE).build())
        .unwrap();

    graph.build().unwrap();
    graph.execute().unwrap();
}

#[test]
fn test_order_is_deterministic() {
    fn record(graph: &mut RenderGraph) -> Vec<PassHandle> {
        graph
            .create_transient_buffer("a", &uav_buffer(), ResourceState::UNORDERED_ACCESS)
            .unwrap();
        graph
            .create_transient_buffer("b", &uav_buffer(), ResourceState::UNORDERED_ACCESS)
            .unwrap();
        for (name, reads, writes) in [
            ("p0", None, Some("a")),
            ("p1", None, Some("b")),
            ("p2", Some("a"), None),
            ("p3", Some("b"), None),
            ("p4", Some("a"), Some("b")),
        ] {
            let mut pass = TestPass::new(name, PassType::Compute);
            if let Some(r) = reads {
                pass = pass.reads(r, ResourceState::NON_PIXEL_SHADER_RESOURCE);
            }
            if let Some(w) = writes {
                pass = pass.writes(w, ResourceState::UNORDERED_ACCESS);
            }
            graph.add_pass(pass.build()).unwrap();
        }
        graph.build().unwrap();
        graph.execution_order()
    }

    let (_backend, mut graph) = setup();
    let first = record(&mut graph);
    for frame in 1..8u64 {
        graph.reset(frame, frame as usize % 3);
        assert_eq!(record(&mut graph), first);
    }
}

#[test]
fn test_add_pass_after_build_is_rejected() {
    let (_backend, mut graph) = setup();
    graph
        .add_pass(TestPass::new("a", PassType::Compute).build())
        .unwrap();
    graph.build().unwrap();

    let err = graph
        .add_pass(TestPass::new("b", PassType::Compute).build())
        .unwrap_err();
    assert!(err.is_invalid_state());
    assert!(graph.build().unwrap_err().is_invalid_state());
}

// ------------------------------------------------------------------
// Execute
// ------------------------------------------------------------------

#[test]
fn test_execute_requires_build() {
    let (_backend, mut graph) = setup();
    graph
        .add_pass(TestPass::new("a", PassType::Compute).build())
        .unwrap();
    assert!(graph.execute().unwrap_err().is_invalid_state());
}

#[test]
fn test_execute_records_barriers_around_pass() {
    let (backend, mut graph) = setup();
    let gpu = backend.context().presenter.back_buffer(0).unwrap();
    graph
        .import_texture("backbuffer", gpu, ResourceState::PRESENT)
        .unwrap();
    graph
        .add_pass(
            TestPass::new("draw", PassType::Render)
                .writes_with_final("backbuffer", ResourceState::RENDER_TARGET, ResourceState::PRESENT)
                .build(),
        )
        .unwrap();
    graph.build().unwrap();
    backend.take_events();
    graph.execute().unwrap();

    let events = backend.take_events();
    assert_eq!(
        events,
        vec![
            BackendEvent::Barriers {
                queue: QueueType::Graphics,
                barriers: vec![Barrier::Transition {
                    resource: gpu,
                    before: ResourceState::PRESENT,
                    after: ResourceState::RENDER_TARGET,
                }],
            },
            BackendEvent::Draw {
                queue: QueueType::Graphics,
                vertex_count: 3,
                instance_count: 1,
            },
            BackendEvent::Barriers {
                queue: QueueType::Graphics,
                barriers: vec![Barrier::Transition {
                    resource: gpu,
                    before: ResourceState::RENDER_TARGET,
                    after: ResourceState::PRESENT,
                }],
            },
            BackendEvent::Submit {
                queue: QueueType::Graphics,
                commands: 1,
                value: 1,
            },
        ]
    );

    assert_eq!(graph.state(), GraphState::Executed);
    let signal = graph.completion_signal().unwrap();
    assert_eq!(signal.queue, QueueType::Graphics);
    assert_eq!(signal.value, 1);
    assert!(signal.is_complete());
    assert_eq!(graph.get_resource(graph.lookup("backbuffer").unwrap()).unwrap().current_state(), ResourceState::PRESENT);
    assert_eq!(backend.outstanding_leases(), 0);
}

#[test]
fn test_consecutive_uav_writes_get_uav_barrier() {
    let (backend, mut graph) = setup();
    graph
        .create_transient_buffer("data", &uav_buffer(), ResourceState::UNORDERED_ACCESS)
        .unwrap();
    for name in ["first", "second"] {
        graph
            .add_pass(TestPass::new(name, PassType::Compute).writes("data", ResourceState::UNORDERED_ACCESS).build())
            .unwrap();
    }
    graph.build().unwrap();
    backend.take_events();
    graph.execute().unwrap();

    let barriers: Vec<Barrier> = backend
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            BackendEvent::Barriers { barriers, .. } => Some(barriers),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(barriers.len(), 2);
    assert!(barriers.iter().all(|b| matches!(b, Barrier::UnorderedAccess { .. })));
}

#[test]
fn test_failing_pass_returns_leases() {
    let (backend, mut graph) = setup();
    graph
        .add_pass(TestPass::new("ok", PassType::Compute).build())
        .unwrap();
    graph
        .add_pass(TestPass::new("boom", PassType::Compute).failing().build())
        .unwrap();
    graph.build().unwrap();

    let err = graph.execute().unwrap_err();
    assert!(err.message().contains("boom"));
    assert_eq!(backend.outstanding_leases(), 0);
    assert_ne!(graph.state(), GraphState::Executed);

    // The first pass was submitted and is visible to the caller.
    assert_eq!(graph.queue_tails().count(), 1);
    assert_eq!(submits(&backend.events()), 1);
}

#[test]
fn test_exhausted_pool_fails_cleanly() {
    let (backend, mut graph) = setup();
    backend.set_command_pool_exhausted(QueueType::Graphics, true);
    graph
        .add_pass(TestPass::new("a", PassType::Render).build())
        .unwrap();
    graph.build().unwrap();

    assert!(graph.execute().unwrap_err().is_invalid_state());
    assert_eq!(backend.outstanding_leases(), 0);
    assert!(graph.completion_signal().is_none());
}

#[test]
fn test_cross_queue_wait_on_async_compute() {
    let backend = DummyBackend::new();
    let config = GraphicsConfig::default().with_async_compute(true);
    let mut graph = RenderGraph::new(backend.context(), config);

    graph
        .create_transient_buffer("particles", &uav_buffer(), ResourceState::UNORDERED_ACCESS)
        .unwrap();
    graph
        .add_pass(
            TestPass::new("simulate", PassType::Compute)
                .async_queue()
                .writes("particles", ResourceState::UNORDERED_ACCESS)
                .build(),
        )
        .unwrap();
    graph
        .add_pass(
            TestPass::new("draw", PassType::Render)
                .reads("particles", ResourceState::NON_PIXEL_SHADER_RESOURCE)
                .build(),
        )
        .unwrap();
    graph.build().unwrap();
    backend.take_events();
    graph.execute().unwrap();

    let events = backend.take_events();
    assert!(events.contains(&BackendEvent::QueueWait {
        queue: QueueType::Graphics,
        on: QueueType::Compute,
        value: 1,
    }));
    assert!(events.contains(&BackendEvent::Dispatch {
        queue: QueueType::Compute,
        groups: [1, 1, 1],
    }));

    let tails: Vec<QueueType> = graph.queue_tails().map(|p| p.queue).collect();
    assert_eq!(tails, vec![QueueType::Graphics, QueueType::Compute]);
    assert_eq!(graph.completion_signal().unwrap().queue, QueueType::Graphics);
}

#[test]
fn test_same_queue_needs_no_wait() {
    let (backend, mut graph) = setup();
    graph
        .create_transient_buffer("particles", &uav_buffer(), ResourceState::UNORDERED_ACCESS)
        .unwrap();
    graph
        .add_pass(
            TestPass::new("simulate", PassType::Compute)
                .async_queue()
                .writes("particles", ResourceState::UNORDERED_ACCESS)
                .build(),
        )
        .unwrap();
    graph
        .add_pass(
            TestPass::new("draw", PassType::Render)
                .reads("particles", ResourceState::NON_PIXEL_SHADER_RESOURCE)
                .build(),
        )
        .unwrap();
    graph.build().unwrap();
    graph.execute().unwrap();

    assert!(
        !backend
            .events()
            .iter()
            .any(|e| matches!(e, BackendEvent::QueueWait { .. }))
    );
}

// ------------------------------------------------------------------
// Lifetimes
// ------------------------------------------------------------------

#[test]
fn test_transients_released_when_slot_reused() {
    let backend = DummyBackend::new();
    let config = GraphicsConfig::default().with_frames_in_flight(2);
    let mut graph = RenderGraph::new(backend.context(), config);
    let baseline = backend.live_resources();

    graph.reset(0, 0);
    let handle = graph
        .create_transient_texture("color", &color_target(), ResourceState::COMMON)
        .unwrap();
    let gpu = graph.get_resource(handle).unwrap().gpu();
    graph.create_view(handle, ViewKind::RenderTarget).unwrap();
    assert_eq!(backend.live_views(), 1);

    // Frame 1 uses the other slot; frame 0's objects may still be in use.
    graph.reset(1, 1);
    assert!(backend.is_live(gpu));
    assert_eq!(backend.live_views(), 1);

    // Slot 0 comes around again.
    graph.reset(2, 0);
    assert!(!backend.is_live(gpu));
    assert_eq!(backend.live_views(), 0);
    assert_eq!(backend.live_resources(), baseline);
}

#[test]
fn test_imported_resources_are_never_destroyed() {
    let (backend, mut graph) = setup();
    let gpu = backend.context().presenter.back_buffer(1).unwrap();
    graph.import_texture("bb", gpu, ResourceState::PRESENT).unwrap();

    for frame in 1..=4u64 {
        graph.reset(frame, frame as usize % 3);
    }
    drop(graph);
    assert!(backend.is_live(gpu));
}

#[test]
fn test_drop_releases_everything() {
    let backend = DummyBackend::new();
    let baseline = backend.live_resources();
    {
        let mut graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
        graph
            .create_transient_texture("a", &color_target(), ResourceState::COMMON)
            .unwrap();
        graph.reset(1, 1);
        graph
            .create_transient_buffer("b", &uav_buffer(), ResourceState::COMMON)
            .unwrap();
        assert_eq!(backend.live_resources(), baseline + 2);
    }
    assert_eq!(backend.live_resources(), baseline);
}

#[test]
#[should_panic(expected = "ring slot")]
fn test_reset_slot_out_of_range_panics() {
    let (_backend, mut graph) = setup();
    graph.reset(0, 3);
}
