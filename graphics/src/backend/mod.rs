//! GPU backend capabilities.
//!
//! The scheduler never talks to a GPU API directly. It consumes a small set
//! of capability traits, bundled in a [`BackendContext`]:
//!
//! | Capability | Trait | Used by |
//! |------------|-------|---------|
//! | Committed resources | [`Device`] | transient resources, staging buffers |
//! | Command recording | [`CommandPool`] / [`CommandContext`] | one context per executed pass |
//! | Hardware queues | [`QueuePool`] / [`QueueContext`] | submission, cross-queue waits |
//! | View tables | [`ViewAllocator`] | render target / shader resource views |
//! | Presentation | [`Presenter`] | back buffers, present, resize |
//!
//! Pools are shared between call sites and synchronize internally at
//! acquire and release. Acquired contexts must be returned exactly once.
//!
//! # Available Backends
//!
//! - [`dummy`]: no-op backend that records every call, for tests and tools

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;

use std::sync::Arc;

use crate::error::GraphicsResult;
use crate::graph::{Barrier, ResourceKind};
use crate::scheduler::{Fence, SubmitPoint};
use crate::types::{BufferDescriptor, ClearColor, ResourceState, TextureDescriptor};

/// Hardware queue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    /// Universal queue: rendering, compute and copies.
    Graphics,
    /// Asynchronous compute queue.
    Compute,
    /// Asynchronous copy queue.
    Copy,
}

impl QueueType {
    /// All queue types, in index order.
    pub const ALL: [QueueType; 3] = [Self::Graphics, Self::Compute, Self::Copy];

    /// Number of queue types.
    pub const COUNT: usize = 3;

    /// Dense index for per-queue tables.
    pub fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Copy => 2,
        }
    }
}

/// Opaque identifier of a GPU resource owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuResourceId(u64);

impl GpuResourceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Description of a committed resource to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDesc {
    Texture(TextureDescriptor),
    Buffer(BufferDescriptor),
}

impl ResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Texture(_) => ResourceKind::Texture,
            Self::Buffer(_) => ResourceKind::Buffer,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Texture(desc) => desc.label.as_deref(),
            Self::Buffer(desc) => desc.label.as_deref(),
        }
    }
}

/// Kind of view-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Shader resource view (shader visible).
    ShaderResource,
    /// Unordered access view (shader visible).
    UnorderedAccess,
    /// Render target view (CPU only).
    RenderTarget,
    /// Depth stencil view (CPU only).
    DepthStencil,
}

impl ViewKind {
    /// Returns true if views of this kind live in a shader-visible table.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, Self::ShaderResource | Self::UnorderedAccess)
    }
}

/// A slot in a view table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewSlot {
    pub kind: ViewKind,
    pub index: u32,
}

/// CPU descriptor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptor(pub u64);

/// GPU (shader-visible) descriptor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuDescriptor(pub u64);

/// Presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PresentMode {
    /// Wait for vertical blank.
    #[default]
    Vsync,
    /// Present immediately, tearing allowed.
    Immediate,
}

/// Device capability: creation of committed GPU resources.
pub trait Device: Send + Sync {
    /// Allocate a resource in `initial_state`.
    fn create_committed(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> GraphicsResult<GpuResourceId>;

    /// Release a resource created by [`create_committed`](Self::create_committed).
    fn destroy(&self, resource: GpuResourceId);

    /// Write bytes into a CPU-visible (upload) buffer.
    fn write_buffer(&self, resource: GpuResourceId, offset: u64, data: &[u8])
    -> GraphicsResult<()>;
}

/// A command-recording context borrowed from a [`CommandPool`].
pub trait CommandContext: Send {
    /// Queue type this context records for.
    fn queue_type(&self) -> QueueType;

    /// Open the context for recording.
    fn reset(&mut self) -> GraphicsResult<()>;

    /// Record a batch of barriers.
    fn resource_barriers(&mut self, barriers: &[Barrier]);

    /// Clear a render target view.
    fn clear_render_target(&mut self, target: GpuResourceId, view: CpuDescriptor, color: ClearColor);

    /// Copy `size` bytes between buffers.
    fn copy_buffer(&mut self, src: GpuResourceId, dst: GpuResourceId, size: u64);

    /// Dispatch compute work groups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    /// Draw non-indexed primitives.
    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    /// Close the context; it can then be submitted.
    fn close(&mut self) -> GraphicsResult<()>;

    /// Returns true between [`reset`](Self::reset) and [`close`](Self::close).
    fn is_open(&self) -> bool;

    /// Backend-native handle, for debugging and interop.
    fn native_handle(&self) -> u64;
}

/// Pool of command contexts per queue type.
pub trait CommandPool: Send + Sync {
    /// Borrow a context. Fails with `InvalidState` when the pool is exhausted.
    fn acquire(&self, queue: QueueType) -> GraphicsResult<Box<dyn CommandContext>>;

    /// Return a context borrowed with [`acquire`](Self::acquire).
    fn release(&self, context: Box<dyn CommandContext>);
}

/// A hardware queue borrowed from a [`QueuePool`].
pub trait QueueContext: Send {
    /// Queue type of this context.
    fn queue_type(&self) -> QueueType;

    /// The queue's timeline fence.
    fn fence(&self) -> Fence;

    /// Make subsequent submissions on this queue wait on the GPU until
    /// `point` completes.
    fn wait(&mut self, point: &SubmitPoint);

    /// Submit closed commands. Returns the fence value signalled when the
    /// GPU finishes them.
    fn submit(&mut self, commands: &dyn CommandContext) -> GraphicsResult<u64>;
}

/// Pool of queue contexts per queue type.
pub trait QueuePool: Send + Sync {
    /// Borrow a queue. Fails with `InvalidState` when the pool is exhausted.
    fn acquire(&self, queue: QueueType) -> GraphicsResult<Box<dyn QueueContext>>;

    /// Return a queue borrowed with [`acquire`](Self::acquire).
    fn release(&self, context: Box<dyn QueueContext>);
}

/// View table allocator.
pub trait ViewAllocator: Send + Sync {
    /// Allocate a slot of the given kind.
    fn allocate(&self, kind: ViewKind) -> GraphicsResult<ViewSlot>;

    /// Free a slot.
    fn free(&self, slot: ViewSlot);

    /// Write a view of `resource` into `slot`.
    fn create_view(&self, slot: ViewSlot, resource: GpuResourceId);

    /// CPU handle of a slot.
    fn cpu_handle(&self, slot: ViewSlot) -> CpuDescriptor;

    /// GPU handle of a slot, `None` for CPU-only kinds.
    fn gpu_handle(&self, slot: ViewSlot) -> Option<GpuDescriptor>;
}

/// Presentation surface with a ring of back buffers.
pub trait Presenter: Send + Sync {
    /// Number of back buffers.
    fn back_buffer_count(&self) -> usize;

    /// Back buffer at `index`, `None` if out of range.
    fn back_buffer(&self, index: usize) -> Option<GpuResourceId>;

    /// Present back buffer `index`.
    fn present(&self, index: usize, mode: PresentMode) -> GraphicsResult<()>;

    /// Recreate back buffers at a new size. The caller must ensure no GPU
    /// work references the old back buffers.
    fn resize(&self, width: u32, height: u32) -> GraphicsResult<()>;
}

/// Bundle of the capabilities the scheduler consumes.
#[derive(Clone)]
pub struct BackendContext {
    pub device: Arc<dyn Device>,
    pub commands: Arc<dyn CommandPool>,
    pub queues: Arc<dyn QueuePool>,
    pub views: Arc<dyn ViewAllocator>,
    pub presenter: Arc<dyn Presenter>,
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_indices_are_dense() {
        for (i, queue) in QueueType::ALL.iter().enumerate() {
            assert_eq!(queue.index(), i);
        }
        assert_eq!(QueueType::ALL.len(), QueueType::COUNT);
    }

    #[test]
    fn test_view_visibility() {
        assert!(ViewKind::ShaderResource.is_shader_visible());
        assert!(ViewKind::UnorderedAccess.is_shader_visible());
        assert!(!ViewKind::RenderTarget.is_shader_visible());
        assert!(!ViewKind::DepthStencil.is_shader_visible());
    }
}
