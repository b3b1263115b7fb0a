//! Render graph infrastructure.
//!
//! The render graph turns declarative "this pass reads/writes resource X in
//! state Y" statements into a validated execution order, hardware state
//! transitions and multi-queue submission:
//!
//! - Access validation (handle generation, kind, read-before-write)
//! - Dependency construction (RAW / WAR / WAW) and cycle detection
//! - Deterministic topological ordering
//! - Queue selection, barrier synthesis and cross-queue fence waits
//!
//! # Frame State Machine
//!
//! ```text
//!   reset() ──► Reset ──add_pass()──► Declared ──build()──► DependencyBuilt
//!                 ▲                                              │
//!                 │                                              ▼
//!              reset() ◄── Executed ◄──execute()── OrderBuilt ◄──┘
//! ```
//!
//! A build that finds a cycle stops in `DependencyBuilt`; `execute()` then
//! refuses to run and no pass is submitted.
//!
//! # Resource Lifetimes
//!
//! Transient resources are created when declared and released when their
//! ring slot comes around again, after the orchestrator has waited on that
//! slot's fence. Imported resources are never freed by the graph.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
//!
//! graph.reset(frame, slot);
//! let bb = graph.import_texture("backbuffer", back_buffer, ResourceState::PRESENT)?;
//! graph.add_pass(Arc::new(ClearPass::new("backbuffer")))?;
//! graph.build()?;
//! graph.execute()?;
//! ```

mod barrier;
mod dependency;
mod executor;
mod pass;
mod resource;

use std::sync::Arc;

pub use barrier::Barrier;
pub use executor::select_queue;
pub use pass::{Pass, PassBuilder, PassContext, PassHandle, PassType};
pub use resource::{
    AccessMode, GraphResource, ResourceAccess, ResourceHandle, ResourceKind, ResourceLifetime,
};

use crate::backend::{
    BackendContext, CpuDescriptor, GpuDescriptor, GpuResourceId, QueueType, ResourceDesc,
    ViewKind, ViewSlot,
};
use crate::config::GraphicsConfig;
use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::profiling::profile_scope;
use crate::scheduler::SubmitPoint;
use crate::types::{BufferDescriptor, ResourceState, TextureDescriptor};

use pass::PassNode;
use resource::{ResourceTable, Retired};

/// Per-frame state of a [`RenderGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphState {
    /// Freshly reset, nothing declared.
    Reset,
    /// Passes have been added.
    Declared,
    /// Dependencies computed.
    DependencyBuilt,
    /// Execution order computed.
    OrderBuilt,
    /// Submitted to the GPU.
    Executed,
}

/// The render graph describes one frame's GPU work.
///
/// # Construction
///
/// Passes are added after [`reset`](Self::reset). Each pass declares its
/// resources and accesses during [`Pass::setup`], which runs inside
/// [`add_pass`](Self::add_pass):
///
/// ```ignore
/// let upload = graph.add_pass(upload_pass.clone())?;
/// let lighting = graph.add_pass(lighting_pass.clone())?;
/// graph.add_dependency(lighting, upload);
/// ```
///
/// # Execution
///
/// ```ignore
/// graph.build()?;
/// graph.execute()?;
/// let done = graph.completion_signal();
/// ```
///
/// # Thread Safety
///
/// A graph is driven by one thread at a time and has no internal locking.
pub struct RenderGraph {
    backend: BackendContext,
    config: GraphicsConfig,
    resources: ResourceTable,
    passes: Vec<PassNode>,
    /// Explicit (dependent, dependency) edges.
    edges: Vec<(PassHandle, PassHandle)>,
    order: Vec<usize>,
    state: GraphState,
    frame: u64,
    slot: usize,
    /// GPU objects of earlier frames, per ring slot.
    retired: Vec<Retired>,
    completion: Option<SubmitPoint>,
    queue_tails: [Option<SubmitPoint>; QueueType::COUNT],
}

impl RenderGraph {
    /// Create an empty graph.
    ///
    /// # Panics
    ///
    /// Panics if `config.frames_in_flight` is 0.
    pub fn new(backend: BackendContext, config: GraphicsConfig) -> Self {
        assert!(
            config.frames_in_flight > 0,
            "frames_in_flight must be at least 1"
        );
        let retired = (0..config.frames_in_flight)
            .map(|_| Retired::default())
            .collect();
        Self {
            backend,
            config,
            resources: ResourceTable::new(),
            passes: Vec::new(),
            edges: Vec::new(),
            order: Vec::new(),
            state: GraphState::Reset,
            frame: 0,
            slot: 0,
            retired,
            completion: None,
            queue_tails: Default::default(),
        }
    }

    /// Start a new frame on ring slot `slot`.
    ///
    /// Clears passes and resources. Handles from the previous frame become
    /// stale. Objects retired the last time `slot` was used are released, so
    /// the caller must have waited for that slot's GPU work first.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= frames_in_flight`.
    pub fn reset(&mut self, frame: u64, slot: usize) {
        assert!(
            slot < self.retired.len(),
            "ring slot {slot} out of range ({} frames in flight)",
            self.retired.len()
        );

        let mut parked = self.resources.clear();
        self.passes.clear();
        self.edges.clear();
        self.order.clear();
        self.completion = None;
        self.queue_tails = Default::default();

        self.retired[slot].release(&self.backend);
        if !parked.is_empty() {
            self.retired[self.slot].append(&mut parked);
        }

        self.frame = frame;
        self.slot = slot;
        self.state = GraphState::Reset;
        log::trace!("RenderGraph reset for frame {frame} (slot {slot})");
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut GraphicsConfig {
        &mut self.config
    }

    pub fn backend(&self) -> &BackendContext {
        &self.backend
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    fn ensure_declaring(&self, operation: &str) -> GraphicsResult<()> {
        match self.state {
            GraphState::Reset | GraphState::Declared => Ok(()),
            state => Err(GraphicsError::invalid_state(
                Facility::Graph,
                format!("{operation} is not allowed in state {state:?}; call reset() first"),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Allocate a texture for this frame.
    pub fn create_transient_texture(
        &mut self,
        name: &str,
        desc: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.ensure_declaring("create_transient_texture")?;
        self.resources.create_transient(
            &self.backend,
            name,
            &ResourceDesc::Texture(desc.clone()),
            initial_state,
        )
    }

    /// Allocate a buffer for this frame.
    pub fn create_transient_buffer(
        &mut self,
        name: &str,
        desc: &BufferDescriptor,
        initial_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.ensure_declaring("create_transient_buffer")?;
        self.resources.create_transient(
            &self.backend,
            name,
            &ResourceDesc::Buffer(desc.clone()),
            initial_state,
        )
    }

    /// Register a caller-owned texture in its current state.
    pub fn import_texture(
        &mut self,
        name: &str,
        gpu: GpuResourceId,
        current_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.ensure_declaring("import_texture")?;
        self.resources
            .import(name, ResourceKind::Texture, gpu, current_state)
    }

    /// Register a caller-owned buffer in its current state.
    pub fn import_buffer(
        &mut self,
        name: &str,
        gpu: GpuResourceId,
        current_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.ensure_declaring("import_buffer")?;
        self.resources
            .import(name, ResourceKind::Buffer, gpu, current_state)
    }

    /// Resolve a resource registered this frame by name.
    pub fn lookup(&self, name: &str) -> Option<ResourceHandle> {
        self.resources.lookup(name)
    }

    /// Look up a resource entry.
    pub fn get_resource(&self, handle: ResourceHandle) -> GraphicsResult<&GraphResource> {
        self.resources.get(handle)
    }

    /// Check that `handle` belongs to this frame and names a resource of `kind`.
    pub fn validate_handle(&self, handle: ResourceHandle, kind: ResourceKind) -> GraphicsResult<()> {
        self.resources.validate(handle, Some(kind)).map(|_| ())
    }

    /// Allocate a view for a resource; freed when its ring slot is reused.
    pub fn create_view(&mut self, handle: ResourceHandle, kind: ViewKind) -> GraphicsResult<ViewSlot> {
        self.resources.create_view(&self.backend, handle, kind)
    }

    /// Attach a caller-owned view to an imported resource.
    pub fn attach_view(&mut self, handle: ResourceHandle, slot: ViewSlot) -> GraphicsResult<()> {
        self.resources.attach_view(handle, slot)
    }

    /// Descriptor handles of the first view of `kind`.
    pub fn view_handle(
        &self,
        handle: ResourceHandle,
        kind: ViewKind,
    ) -> GraphicsResult<(CpuDescriptor, Option<GpuDescriptor>)> {
        self.resources.view_handle(&self.backend, handle, kind)
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    /// Add a pass and run its setup.
    ///
    /// Returns a `PassHandle` for referencing this pass.
    pub fn add_pass(&mut self, pass: Arc<dyn Pass>) -> GraphicsResult<PassHandle> {
        self.ensure_declaring("add_pass")?;

        let mut accesses = Vec::new();
        {
            let mut builder = PassBuilder::new(
                pass.name(),
                &mut self.resources,
                &mut accesses,
                &self.backend,
                &self.config,
            );
            pass.setup(&mut builder)?;
        }

        let handle = PassHandle::new(self.passes.len());
        log::trace!(
            "Added pass '{}' ({:?}, {} accesses)",
            pass.name(),
            pass.pass_type(),
            accesses.len()
        );
        self.passes.push(PassNode {
            pass_type: pass.pass_type(),
            async_queue: pass.async_queue(),
            pass,
            accesses,
            dependencies: Vec::new(),
        });
        self.state = GraphState::Declared;
        Ok(handle)
    }

    /// Add a dependency between passes.
    ///
    /// The `dependent` pass will execute after the `dependency` pass, on top of
    /// the ordering derived from resource accesses.
    ///
    /// # Panics
    ///
    /// Panics if either handle is out of range, if they are equal, or if the
    /// graph has already been built.
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        assert!(
            matches!(self.state, GraphState::Reset | GraphState::Declared),
            "add_dependency after build"
        );
        assert!(
            dependent.index() < self.passes.len(),
            "dependent pass handle out of range"
        );
        assert!(
            dependency.index() < self.passes.len(),
            "dependency pass handle out of range"
        );
        assert!(dependent != dependency, "a pass cannot depend on itself");
        self.edges.push((dependent, dependency));
    }

    /// Name of a pass.
    pub fn pass_name(&self, pass: PassHandle) -> Option<&str> {
        self.passes.get(pass.index()).map(|node| node.pass.name())
    }

    /// Dependencies computed by [`build`](Self::build).
    pub fn dependencies(&self, pass: PassHandle) -> Vec<PassHandle> {
        self.passes
            .get(pass.index())
            .map(|node| {
                node.dependencies
                    .iter()
                    .map(|&i| PassHandle::new(i))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Execution order computed by [`build`](Self::build).
    pub fn execution_order(&self) -> Vec<PassHandle> {
        self.order.iter().map(|&i| PassHandle::new(i)).collect()
    }

    /// Compute dependencies and execution order.
    ///
    /// Fails with `InvalidState` on a transient read before write or a
    /// dependency cycle.
    pub fn build(&mut self) -> GraphicsResult<()> {
        self.ensure_declaring("build")?;
        profile_scope!("RenderGraph::build");

        let dependencies =
            dependency::build_dependencies(&self.passes, &self.resources, &self.edges)?;
        for (node, deps) in self.passes.iter_mut().zip(dependencies.iter()) {
            node.dependencies.clone_from(deps);
        }
        self.state = GraphState::DependencyBuilt;

        self.order = dependency::topological_sort(&dependencies)?;
        self.state = GraphState::OrderBuilt;

        log::trace!(
            "RenderGraph built for frame {}: {} passes, {} resources",
            self.frame,
            self.passes.len(),
            self.resources.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Signal of the last graphics-queue submission of this frame.
    pub fn completion_signal(&self) -> Option<&SubmitPoint> {
        self.completion.as_ref()
    }

    /// Last submission of this frame on every queue that was used.
    pub fn queue_tails(&self) -> impl Iterator<Item = &SubmitPoint> {
        self.queue_tails.iter().flatten()
    }

    /// Release every retired object immediately. The caller must ensure the
    /// GPU is idle.
    pub fn release_retired(&mut self) {
        for retired in &mut self.retired {
            retired.release(&self.backend);
        }
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        let mut parked = self.resources.clear();
        parked.release(&self.backend);
        self.release_retired();
    }
}

impl std::fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraph")
            .field("state", &self.state)
            .field("frame", &self.frame)
            .field("slot", &self.slot)
            .field("passes", &self.passes)
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(RenderGraph: Send);

#[cfg(test)]
mod tests;
