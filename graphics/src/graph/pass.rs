//! Pass trait, setup builder and execution context.
//!
//! A pass is one unit of GPU work. During [`Pass::setup`] it declares the
//! resources it creates, imports, reads and writes through a [`PassBuilder`];
//! the graph derives ordering and barriers from those declarations. During
//! [`Pass::execute`] it records commands through a [`PassContext`].

use std::sync::Arc;

use crate::backend::{
    BackendContext, CommandContext, CpuDescriptor, GpuDescriptor, GpuResourceId, QueueType,
    ResourceDesc, ViewKind, ViewSlot,
};
use crate::config::GraphicsConfig;
use crate::error::GraphicsResult;
use crate::types::{BufferDescriptor, ResourceState, TextureDescriptor};

use super::resource::{
    AccessMode, GraphResource, ResourceAccess, ResourceHandle, ResourceKind, ResourceTable,
};

/// Type of GPU work a pass performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Rasterization; always runs on the graphics queue.
    Render,
    /// Compute dispatches.
    Compute,
    /// Buffer and texture copies.
    Copy,
}

/// A unit of GPU work with declared resource accesses.
///
/// Passes are shared with the graph as `Arc<dyn Pass>`; a pass registered once
/// can be added to every frame's graph.
///
/// # Example
///
/// ```ignore
/// struct Blur;
///
/// impl Pass for Blur {
///     fn name(&self) -> &str { "blur" }
///     fn pass_type(&self) -> PassType { PassType::Compute }
///     fn async_queue(&self) -> bool { true }
///
///     fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
///         let hdr = builder.lookup("hdr").ok_or_else(|| missing("hdr"))?;
///         builder.read_texture(hdr, ResourceState::NON_PIXEL_SHADER_RESOURCE);
///         Ok(())
///     }
///
///     fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
///         ctx.commands().dispatch(8, 8, 1);
///         Ok(())
///     }
/// }
/// ```
pub trait Pass: Send + Sync {
    /// Debug name of the pass.
    fn name(&self) -> &str;

    /// Type of work the pass performs.
    fn pass_type(&self) -> PassType;

    /// Opt in to the dedicated compute/copy queue when the configuration
    /// enables it. Ignored for render passes.
    fn async_queue(&self) -> bool {
        false
    }

    /// Declare resources and accesses.
    fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()>;

    /// Record commands.
    fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()>;
}

/// Handle to a pass in the render graph.
///
/// `PassHandle` is `Copy` and cheap to pass around. It is only valid within
/// the frame of the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Registration index of the pass.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pass registered in the current frame.
pub(crate) struct PassNode {
    pub pass: Arc<dyn Pass>,
    pub pass_type: PassType,
    pub async_queue: bool,
    pub accesses: Vec<ResourceAccess>,
    pub dependencies: Vec<usize>,
}

impl std::fmt::Debug for PassNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassNode")
            .field("name", &self.pass.name())
            .field("pass_type", &self.pass_type)
            .field("async_queue", &self.async_queue)
            .field("accesses", &self.accesses.len())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Setup-time view of the graph given to [`Pass::setup`].
pub struct PassBuilder<'a> {
    pass_name: &'a str,
    resources: &'a mut ResourceTable,
    accesses: &'a mut Vec<ResourceAccess>,
    backend: &'a BackendContext,
    config: &'a GraphicsConfig,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(
        pass_name: &'a str,
        resources: &'a mut ResourceTable,
        accesses: &'a mut Vec<ResourceAccess>,
        backend: &'a BackendContext,
        config: &'a GraphicsConfig,
    ) -> Self {
        Self {
            pass_name,
            resources,
            accesses,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &GraphicsConfig {
        self.config
    }

    /// Resolve a resource registered this frame by name.
    pub fn lookup(&self, name: &str) -> Option<ResourceHandle> {
        self.resources.lookup(name)
    }

    /// Look up a resource entry.
    pub fn resource(&self, handle: ResourceHandle) -> GraphicsResult<&GraphResource> {
        self.resources.get(handle)
    }

    /// Allocate a texture for this frame.
    pub fn create_transient_texture(
        &mut self,
        name: &str,
        desc: &TextureDescriptor,
        initial_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.resources.create_transient(
            self.backend,
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
        self.resources.create_transient(
            self.backend,
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
        self.resources
            .import(name, ResourceKind::Buffer, gpu, current_state)
    }

    /// Allocate a view for a resource; freed when the graph resets.
    pub fn create_view(&mut self, handle: ResourceHandle, kind: ViewKind) -> GraphicsResult<ViewSlot> {
        self.resources.create_view(self.backend, handle, kind)
    }

    /// Declare a texture read.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid or `state` is a write state.
    pub fn read_texture(&mut self, handle: ResourceHandle, state: ResourceState) {
        self.declare(handle, ResourceKind::Texture, state, AccessMode::Read, None);
    }

    /// Declare a buffer read.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid or `state` is a write state.
    pub fn read_buffer(&mut self, handle: ResourceHandle, state: ResourceState) {
        self.declare(handle, ResourceKind::Buffer, state, AccessMode::Read, None);
    }

    /// Declare a texture write.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid.
    pub fn write_texture(&mut self, handle: ResourceHandle, state: ResourceState) {
        self.declare(handle, ResourceKind::Texture, state, AccessMode::Write, None);
    }

    /// Declare a texture write followed by a transition to `final_state`.
    pub fn write_texture_with_final(
        &mut self,
        handle: ResourceHandle,
        state: ResourceState,
        final_state: ResourceState,
    ) {
        self.declare(
            handle,
            ResourceKind::Texture,
            state,
            AccessMode::Write,
            Some(final_state),
        );
    }

    /// Declare a buffer write.
    ///
    /// # Panics
    ///
    /// Panics if the handle is invalid.
    pub fn write_buffer(&mut self, handle: ResourceHandle, state: ResourceState) {
        self.declare(handle, ResourceKind::Buffer, state, AccessMode::Write, None);
    }

    /// Declare a buffer write followed by a transition to `final_state`.
    pub fn write_buffer_with_final(
        &mut self,
        handle: ResourceHandle,
        state: ResourceState,
        final_state: ResourceState,
    ) {
        self.declare(
            handle,
            ResourceKind::Buffer,
            state,
            AccessMode::Write,
            Some(final_state),
        );
    }

    fn declare(
        &mut self,
        handle: ResourceHandle,
        kind: ResourceKind,
        state: ResourceState,
        mode: AccessMode,
        final_state: Option<ResourceState>,
    ) {
        if let Err(err) = self.resources.validate(handle, Some(kind)) {
            panic!("pass '{}' declared an invalid access: {err}", self.pass_name);
        }
        assert!(
            mode == AccessMode::Write || !state.is_write(),
            "pass '{}' reads with write state {state:?}",
            self.pass_name
        );
        self.accesses.push(ResourceAccess {
            handle,
            state,
            mode,
            final_state: final_state.filter(|&f| f != state),
        });
    }
}

/// Execution-time context given to [`Pass::execute`].
pub struct PassContext<'a> {
    pub(crate) frame: u64,
    pub(crate) slot: usize,
    pub(crate) queue: QueueType,
    pub(crate) commands: &'a mut dyn CommandContext,
    pub(crate) resources: &'a ResourceTable,
    pub(crate) backend: &'a BackendContext,
    pub(crate) config: &'a GraphicsConfig,
}

impl PassContext<'_> {
    pub fn config(&self) -> &GraphicsConfig {
        self.config
    }

    /// Frame number being recorded.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Ring slot of the frame.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Queue the pass was scheduled on.
    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    /// Open command context for this pass.
    pub fn commands(&mut self) -> &mut dyn CommandContext {
        &mut *self.commands
    }

    pub fn lookup(&self, name: &str) -> Option<ResourceHandle> {
        self.resources.lookup(name)
    }

    pub fn resource(&self, handle: ResourceHandle) -> GraphicsResult<&GraphResource> {
        self.resources.get(handle)
    }

    /// Backend resource behind a handle.
    pub fn gpu_resource(&self, handle: ResourceHandle) -> GraphicsResult<GpuResourceId> {
        self.resources.get(handle).map(GraphResource::gpu)
    }

    /// Descriptor handles of the first view of `kind`.
    pub fn view_handle(
        &self,
        handle: ResourceHandle,
        kind: ViewKind,
    ) -> GraphicsResult<(CpuDescriptor, Option<GpuDescriptor>)> {
        self.resources.view_handle(self.backend, handle, kind)
    }
}
