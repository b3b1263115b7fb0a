//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations but implements every
//! capability the scheduler consumes. It records each call in an event log,
//! tracks outstanding pool leases and live resources, and can either complete
//! submissions immediately or leave fences unsignalled until the test calls
//! [`DummyBackend::complete_all`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::graph::{Barrier, ResourceKind};
use crate::scheduler::{Fence, SubmitPoint};
use crate::types::{ClearColor, ResourceState, TextureDescriptor, TextureFormat, TextureUsage};

use super::{
    BackendContext, CommandContext, CommandPool, CpuDescriptor, Device, GpuDescriptor,
    GpuResourceId, PresentMode, Presenter, QueueContext, QueuePool, QueueType, ResourceDesc,
    ViewAllocator, ViewKind, ViewSlot,
};

/// A call observed by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    ResourceCreated {
        id: GpuResourceId,
        kind: ResourceKind,
        label: Option<String>,
        state: ResourceState,
    },
    ResourceDestroyed {
        id: GpuResourceId,
    },
    BufferWritten {
        id: GpuResourceId,
        offset: u64,
        bytes: usize,
    },
    ViewAllocated {
        slot: ViewSlot,
    },
    ViewCreated {
        slot: ViewSlot,
        resource: GpuResourceId,
    },
    ViewFreed {
        slot: ViewSlot,
    },
    Barriers {
        queue: QueueType,
        barriers: Vec<Barrier>,
    },
    ClearRenderTarget {
        queue: QueueType,
        target: GpuResourceId,
        color: ClearColor,
    },
    CopyBuffer {
        queue: QueueType,
        src: GpuResourceId,
        dst: GpuResourceId,
        size: u64,
    },
    Dispatch {
        queue: QueueType,
        groups: [u32; 3],
    },
    Draw {
        queue: QueueType,
        vertex_count: u32,
        instance_count: u32,
    },
    QueueWait {
        queue: QueueType,
        on: QueueType,
        value: u64,
    },
    Submit {
        queue: QueueType,
        commands: u64,
        value: u64,
    },
    Present {
        index: usize,
        mode: PresentMode,
    },
    Resize {
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Default)]
struct DummyQueue {
    fence: Fence,
    submitted: Mutex<u64>,
}

#[derive(Debug, Default)]
struct ViewTable {
    next: u32,
    free: Vec<u32>,
    live: HashMap<ViewSlot, Option<GpuResourceId>>,
}

#[derive(Debug)]
struct Shared {
    next_resource: AtomicU64,
    resources: Mutex<HashMap<GpuResourceId, ResourceDesc>>,
    events: Mutex<Vec<BackendEvent>>,
    queues: [DummyQueue; QueueType::COUNT],
    free_commands: Mutex<[Vec<u64>; QueueType::COUNT]>,
    next_command: AtomicU64,
    command_leases: AtomicUsize,
    queue_leases: AtomicUsize,
    commands_exhausted: Mutex<[bool; QueueType::COUNT]>,
    queues_exhausted: Mutex<[bool; QueueType::COUNT]>,
    auto_complete: AtomicBool,
    views: Mutex<ViewTable>,
    back_buffers: Mutex<Vec<GpuResourceId>>,
}

impl Shared {
    fn record(&self, event: BackendEvent) {
        self.events.lock().push(event);
    }

    fn create(&self, desc: &ResourceDesc, state: ResourceState) -> GraphicsResult<GpuResourceId> {
        match desc {
            ResourceDesc::Buffer(buffer) if buffer.size == 0 => {
                return Err(GraphicsError::invalid_arg(
                    Facility::Resource,
                    format!("buffer {:?} has zero size", buffer.label),
                ));
            }
            ResourceDesc::Texture(texture) if texture.size.is_empty() => {
                return Err(GraphicsError::invalid_arg(
                    Facility::Resource,
                    format!("texture {:?} has an empty extent", texture.label),
                ));
            }
            _ => {}
        }

        let id = GpuResourceId::new(self.next_resource.fetch_add(1, Ordering::Relaxed) + 1);
        self.resources.lock().insert(id, desc.clone());
        log::trace!(
            "DummyBackend: creating {:?} {:?} as {:?}",
            desc.kind(),
            desc.label(),
            id
        );
        self.record(BackendEvent::ResourceCreated {
            id,
            kind: desc.kind(),
            label: desc.label().map(str::to_owned),
            state,
        });
        Ok(id)
    }

    fn destroy(&self, id: GpuResourceId) {
        if self.resources.lock().remove(&id).is_none() {
            log::warn!("DummyBackend: destroying unknown resource {id:?}");
            return;
        }
        log::trace!("DummyBackend: destroying {id:?}");
        self.record(BackendEvent::ResourceDestroyed { id });
    }

    /// Create `count` back buffers. Nothing is left behind on failure.
    fn create_back_buffers(
        &self,
        count: usize,
        width: u32,
        height: u32,
    ) -> GraphicsResult<Vec<GpuResourceId>> {
        let mut buffers = Vec::with_capacity(count);
        for i in 0..count {
            let desc = TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::Bgra8Unorm,
                TextureUsage::RENDER_TARGET | TextureUsage::COPY_DST,
            )
            .with_label(format!("backbuffer{i}"));
            match self.create(&ResourceDesc::Texture(desc), ResourceState::PRESENT) {
                Ok(id) => buffers.push(id),
                Err(err) => {
                    for id in buffers {
                        self.destroy(id);
                    }
                    return Err(err);
                }
            }
        }
        Ok(buffers)
    }
}

/// Dummy GPU backend.
///
/// Cloning the backend creates another handle to the same state.
///
/// # Example
///
/// ```ignore
/// let backend = DummyBackend::new();
/// let mut graph = RenderGraph::new(backend.context(), GraphicsConfig::default());
/// // ... record and execute ...
/// assert_eq!(backend.outstanding_leases(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct DummyBackend {
    shared: Arc<Shared>,
}

impl DummyBackend {
    /// Default number of back buffers.
    pub const DEFAULT_BACK_BUFFERS: usize = 3;

    /// Create a backend with three 1280x720 back buffers.
    pub fn new() -> Self {
        Self::with_back_buffers(Self::DEFAULT_BACK_BUFFERS, 1280, 720)
    }

    /// Create a backend with `count` back buffers of the given size.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0 or the size is empty.
    pub fn with_back_buffers(count: usize, width: u32, height: u32) -> Self {
        assert!(count > 0, "at least one back buffer is required");
        let shared = Arc::new(Shared {
            next_resource: AtomicU64::new(0),
            resources: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            queues: Default::default(),
            free_commands: Mutex::new(Default::default()),
            next_command: AtomicU64::new(0),
            command_leases: AtomicUsize::new(0),
            queue_leases: AtomicUsize::new(0),
            commands_exhausted: Mutex::new([false; QueueType::COUNT]),
            queues_exhausted: Mutex::new([false; QueueType::COUNT]),
            auto_complete: AtomicBool::new(true),
            views: Mutex::new(ViewTable::default()),
            back_buffers: Mutex::new(Vec::new()),
        });
        match shared.create_back_buffers(count, width, height) {
            Ok(buffers) => *shared.back_buffers.lock() = buffers,
            Err(err) => panic!("invalid back buffer size {width}x{height}: {err}"),
        }
        shared.events.lock().clear();
        Self { shared }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Bundle this backend's capabilities.
    pub fn context(&self) -> BackendContext {
        BackendContext {
            device: Arc::new(self.clone()),
            commands: Arc::new(self.clone()),
            queues: Arc::new(self.clone()),
            views: Arc::new(self.clone()),
            presenter: Arc::new(self.clone()),
        }
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.shared.events.lock().clone()
    }

    /// Drain the event log.
    pub fn take_events(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut *self.shared.events.lock())
    }

    /// Complete submissions as soon as they are made (default `true`).
    pub fn set_auto_complete(&self, enabled: bool) {
        self.shared.auto_complete.store(enabled, Ordering::Relaxed);
    }

    /// Signal every queue fence up to its last submitted value.
    pub fn complete_all(&self) {
        for queue in &self.shared.queues {
            queue.fence.signal(*queue.submitted.lock());
        }
    }

    /// Last value submitted on `queue`.
    pub fn submitted_value(&self, queue: QueueType) -> u64 {
        *self.shared.queues[queue.index()].submitted.lock()
    }

    /// Timeline fence of `queue`.
    pub fn queue_fence(&self, queue: QueueType) -> Fence {
        self.shared.queues[queue.index()].fence.clone()
    }

    /// Command and queue contexts currently borrowed.
    pub fn outstanding_leases(&self) -> usize {
        self.shared.command_leases.load(Ordering::Acquire)
            + self.shared.queue_leases.load(Ordering::Acquire)
    }

    /// Number of resources created and not yet destroyed (back buffers included).
    pub fn live_resources(&self) -> usize {
        self.shared.resources.lock().len()
    }

    /// Returns true if `id` has been created and not destroyed.
    pub fn is_live(&self, id: GpuResourceId) -> bool {
        self.shared.resources.lock().contains_key(&id)
    }

    /// Number of allocated view slots.
    pub fn live_views(&self) -> usize {
        self.shared.views.lock().live.len()
    }

    /// Make command context acquisition for `queue` fail.
    pub fn set_command_pool_exhausted(&self, queue: QueueType, exhausted: bool) {
        self.shared.commands_exhausted.lock()[queue.index()] = exhausted;
    }

    /// Make queue acquisition for `queue` fail.
    pub fn set_queue_pool_exhausted(&self, queue: QueueType, exhausted: bool) {
        self.shared.queues_exhausted.lock()[queue.index()] = exhausted;
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyBackend {
    fn create_committed(
        &self,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> GraphicsResult<GpuResourceId> {
        self.shared.create(desc, initial_state)
    }

    fn destroy(&self, resource: GpuResourceId) {
        self.shared.destroy(resource);
    }

    fn write_buffer(
        &self,
        resource: GpuResourceId,
        offset: u64,
        data: &[u8],
    ) -> GraphicsResult<()> {
        let resources = self.shared.resources.lock();
        let Some(ResourceDesc::Buffer(desc)) = resources.get(&resource) else {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!("{resource:?} is not a live buffer"),
            ));
        };
        if offset + data.len() as u64 > desc.size {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!(
                    "write of {} bytes at {offset} overflows buffer of {} bytes",
                    data.len(),
                    desc.size
                ),
            ));
        }
        drop(resources);

        self.shared.record(BackendEvent::BufferWritten {
            id: resource,
            offset,
            bytes: data.len(),
        });
        Ok(())
    }
}

/// Command context of the dummy backend.
#[derive(Debug)]
struct DummyCommandContext {
    shared: Arc<Shared>,
    queue: QueueType,
    handle: u64,
    open: bool,
}

impl DummyCommandContext {
    fn record(&self, event: BackendEvent) {
        debug_assert!(self.open, "recording into a closed command context");
        self.shared.record(event);
    }
}

impl CommandContext for DummyCommandContext {
    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn reset(&mut self) -> GraphicsResult<()> {
        if self.open {
            return Err(GraphicsError::invalid_state(
                Facility::Backend,
                "command context is already open",
            ));
        }
        self.open = true;
        Ok(())
    }

    fn resource_barriers(&mut self, barriers: &[Barrier]) {
        log::trace!(
            "DummyBackend: {} barrier(s) on {:?}",
            barriers.len(),
            self.queue
        );
        self.record(BackendEvent::Barriers {
            queue: self.queue,
            barriers: barriers.to_vec(),
        });
    }

    fn clear_render_target(&mut self, target: GpuResourceId, _view: CpuDescriptor, color: ClearColor) {
        self.record(BackendEvent::ClearRenderTarget {
            queue: self.queue,
            target,
            color,
        });
    }

    fn copy_buffer(&mut self, src: GpuResourceId, dst: GpuResourceId, size: u64) {
        self.record(BackendEvent::CopyBuffer {
            queue: self.queue,
            src,
            dst,
            size,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.record(BackendEvent::Dispatch {
            queue: self.queue,
            groups: [x, y, z],
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.record(BackendEvent::Draw {
            queue: self.queue,
            vertex_count,
            instance_count,
        });
    }

    fn close(&mut self) -> GraphicsResult<()> {
        if !self.open {
            return Err(GraphicsError::invalid_state(
                Facility::Backend,
                "closing a command context that is not open",
            ));
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn native_handle(&self) -> u64 {
        self.handle
    }
}

impl CommandPool for DummyBackend {
    fn acquire(&self, queue: QueueType) -> GraphicsResult<Box<dyn CommandContext>> {
        if self.shared.commands_exhausted.lock()[queue.index()] {
            return Err(GraphicsError::invalid_state(
                Facility::Backend,
                format!("command pool for {queue:?} is exhausted"),
            ));
        }
        let handle = self.shared.free_commands.lock()[queue.index()]
            .pop()
            .unwrap_or_else(|| self.shared.next_command.fetch_add(1, Ordering::Relaxed) + 1);
        self.shared.command_leases.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(DummyCommandContext {
            shared: self.shared.clone(),
            queue,
            handle,
            open: false,
        }))
    }

    fn release(&self, context: Box<dyn CommandContext>) {
        if context.is_open() {
            log::warn!(
                "DummyBackend: command context {} returned while open",
                context.native_handle()
            );
        }
        self.shared.free_commands.lock()[context.queue_type().index()]
            .push(context.native_handle());
        let previous = self.shared.command_leases.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "command context returned twice");
    }
}

/// Queue context of the dummy backend.
#[derive(Debug)]
struct DummyQueueContext {
    shared: Arc<Shared>,
    queue: QueueType,
}

impl QueueContext for DummyQueueContext {
    fn queue_type(&self) -> QueueType {
        self.queue
    }

    fn fence(&self) -> Fence {
        self.shared.queues[self.queue.index()].fence.clone()
    }

    fn wait(&mut self, point: &SubmitPoint) {
        log::trace!(
            "DummyBackend: {:?} waits for {:?} value {}",
            self.queue,
            point.queue,
            point.value
        );
        self.shared.record(BackendEvent::QueueWait {
            queue: self.queue,
            on: point.queue,
            value: point.value,
        });
    }

    fn submit(&mut self, commands: &dyn CommandContext) -> GraphicsResult<u64> {
        if commands.is_open() {
            return Err(GraphicsError::invalid_state(
                Facility::Backend,
                "submitting a command context that is still open",
            ));
        }
        if commands.queue_type() != self.queue {
            return Err(GraphicsError::invalid_arg(
                Facility::Backend,
                format!(
                    "{:?} commands submitted to the {:?} queue",
                    commands.queue_type(),
                    self.queue
                ),
            ));
        }

        let queue = &self.shared.queues[self.queue.index()];
        let value = {
            let mut submitted = queue.submitted.lock();
            *submitted += 1;
            *submitted
        };
        self.shared.record(BackendEvent::Submit {
            queue: self.queue,
            commands: commands.native_handle(),
            value,
        });
        if self.shared.auto_complete.load(Ordering::Relaxed) {
            queue.fence.signal(value);
        }
        Ok(value)
    }
}

impl QueuePool for DummyBackend {
    fn acquire(&self, queue: QueueType) -> GraphicsResult<Box<dyn QueueContext>> {
        if self.shared.queues_exhausted.lock()[queue.index()] {
            return Err(GraphicsError::invalid_state(
                Facility::Backend,
                format!("queue pool for {queue:?} is exhausted"),
            ));
        }
        self.shared.queue_leases.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(DummyQueueContext {
            shared: self.shared.clone(),
            queue,
        }))
    }

    fn release(&self, context: Box<dyn QueueContext>) {
        drop(context);
        let previous = self.shared.queue_leases.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "queue context returned twice");
    }
}

impl ViewAllocator for DummyBackend {
    fn allocate(&self, kind: ViewKind) -> GraphicsResult<ViewSlot> {
        let mut views = self.shared.views.lock();
        let index = match views.free.pop() {
            Some(index) => index,
            None => {
                let index = views.next;
                views.next += 1;
                index
            }
        };
        let slot = ViewSlot { kind, index };
        views.live.insert(slot, None);
        drop(views);

        self.shared.record(BackendEvent::ViewAllocated { slot });
        Ok(slot)
    }

    fn free(&self, slot: ViewSlot) {
        let mut views = self.shared.views.lock();
        if views.live.remove(&slot).is_none() {
            log::warn!("DummyBackend: freeing unknown view slot {slot:?}");
            return;
        }
        views.free.push(slot.index);
        drop(views);

        self.shared.record(BackendEvent::ViewFreed { slot });
    }

    fn create_view(&self, slot: ViewSlot, resource: GpuResourceId) {
        if let Some(entry) = self.shared.views.lock().live.get_mut(&slot) {
            *entry = Some(resource);
        }
        self.shared.record(BackendEvent::ViewCreated { slot, resource });
    }

    fn cpu_handle(&self, slot: ViewSlot) -> CpuDescriptor {
        CpuDescriptor(((slot.kind as u64) << 32) | slot.index as u64)
    }

    fn gpu_handle(&self, slot: ViewSlot) -> Option<GpuDescriptor> {
        slot.kind
            .is_shader_visible()
            .then(|| GpuDescriptor((1 << 48) | ((slot.kind as u64) << 32) | slot.index as u64))
    }
}

impl Presenter for DummyBackend {
    fn back_buffer_count(&self) -> usize {
        self.shared.back_buffers.lock().len()
    }

    fn back_buffer(&self, index: usize) -> Option<GpuResourceId> {
        self.shared.back_buffers.lock().get(index).copied()
    }

    fn present(&self, index: usize, mode: PresentMode) -> GraphicsResult<()> {
        let count = self.back_buffer_count();
        if index >= count {
            return Err(GraphicsError::invalid_arg(
                Facility::Backend,
                format!("back buffer index {index} out of range ({count} buffers)"),
            ));
        }
        log::trace!("DummyBackend: present back buffer {index} ({mode:?})");
        self.shared.record(BackendEvent::Present { index, mode });
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) -> GraphicsResult<()> {
        let count = self.back_buffer_count();
        let buffers = self.shared.create_back_buffers(count, width, height)?;
        let old = std::mem::replace(&mut *self.shared.back_buffers.lock(), buffers);
        for id in old {
            self.shared.destroy(id);
        }
        self.shared.record(BackendEvent::Resize { width, height });
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
