//! Resource table for the render graph.
//!
//! Resources are stored in a per-frame table and referenced by
//! [`ResourceHandle`]s: a table index plus the generation of the frame that
//! created it. Every [`reset`](ResourceTable::clear) bumps the generation, so
//! handles kept from an earlier frame fail validation instead of aliasing
//! whatever now occupies their slot.

use std::collections::HashMap;

use crate::backend::{
    BackendContext, CpuDescriptor, GpuDescriptor, GpuResourceId, ResourceDesc, ViewKind, ViewSlot,
};
use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::types::ResourceState;

/// Handle to a resource in the render graph.
///
/// Handles use a generation counter to detect stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    /// Index into the resource table.
    index: u32,
    /// Generation of the frame that created the handle.
    generation: u32,
}

impl ResourceHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Get the index of this resource.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Get the generation of this handle.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Kind of GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
}

/// Who owns a resource's GPU memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceLifetime {
    /// Created by the graph for one frame and released afterwards.
    Transient,
    /// Owned by the caller; the graph never frees it.
    Imported,
}

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

/// A resource access declared by a pass during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceAccess {
    pub handle: ResourceHandle,
    /// State the resource must be in while the pass runs.
    pub state: ResourceState,
    pub mode: AccessMode,
    /// State to transition to after the pass, if different from `state`.
    pub final_state: Option<ResourceState>,
}

#[derive(Debug, Clone, Copy)]
struct ResourceView {
    slot: ViewSlot,
    /// Allocated by the graph (freed on reset) or supplied by the caller.
    owned: bool,
}

/// A resource registered in the graph for the current frame.
#[derive(Debug)]
pub struct GraphResource {
    name: String,
    kind: ResourceKind,
    lifetime: ResourceLifetime,
    generation: u32,
    gpu: GpuResourceId,
    initial_state: ResourceState,
    current_state: ResourceState,
    views: Vec<ResourceView>,
}

impl GraphResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn lifetime(&self) -> ResourceLifetime {
        self.lifetime
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Backend resource backing this entry.
    pub fn gpu(&self) -> GpuResourceId {
        self.gpu
    }

    /// State at the start of the frame.
    pub fn initial_state(&self) -> ResourceState {
        self.initial_state
    }

    /// Tracked state; after execution, the state the frame left it in.
    pub fn current_state(&self) -> ResourceState {
        self.current_state
    }

    /// Returns true if the graph owns the GPU memory.
    pub fn is_transient(&self) -> bool {
        self.lifetime == ResourceLifetime::Transient
    }

    pub(crate) fn set_current_state(&mut self, state: ResourceState) {
        self.current_state = state;
    }
}

/// GPU objects released by a frame, waiting until their ring slot is reused.
#[derive(Debug, Default)]
pub(crate) struct Retired {
    pub resources: Vec<GpuResourceId>,
    pub views: Vec<ViewSlot>,
}

impl Retired {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.views.is_empty()
    }

    pub fn append(&mut self, other: &mut Retired) {
        self.resources.append(&mut other.resources);
        self.views.append(&mut other.views);
    }

    pub fn release(&mut self, backend: &BackendContext) {
        for slot in self.views.drain(..) {
            backend.views.free(slot);
        }
        for resource in self.resources.drain(..) {
            backend.device.destroy(resource);
        }
    }
}

/// Per-frame table of graph resources.
#[derive(Debug, Default)]
pub(crate) struct ResourceTable {
    entries: Vec<GraphResource>,
    names: HashMap<String, u32>,
    generation: u32,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Empty the table and start a new generation. Returns the GPU objects
    /// owned by the dropped entries.
    pub fn clear(&mut self) -> Retired {
        let mut retired = Retired::default();
        for entry in self.entries.drain(..) {
            retired
                .views
                .extend(entry.views.iter().filter(|v| v.owned).map(|v| v.slot));
            if entry.lifetime == ResourceLifetime::Transient {
                retired.resources.push(entry.gpu);
            }
        }
        self.names.clear();
        self.generation = self.generation.wrapping_add(1);
        retired
    }

    fn insert(
        &mut self,
        name: &str,
        kind: ResourceKind,
        lifetime: ResourceLifetime,
        gpu: GpuResourceId,
        state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        if self.names.contains_key(name) {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!("resource '{name}' is already registered this frame"),
            ));
        }
        let index = self.entries.len() as u32;
        self.entries.push(GraphResource {
            name: name.to_owned(),
            kind,
            lifetime,
            generation: self.generation,
            gpu,
            initial_state: state,
            current_state: state,
            views: Vec::new(),
        });
        self.names.insert(name.to_owned(), index);
        Ok(ResourceHandle::new(index, self.generation))
    }

    /// Allocate a GPU resource now and register it as transient.
    pub fn create_transient(
        &mut self,
        backend: &BackendContext,
        name: &str,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        if self.names.contains_key(name) {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!("resource '{name}' is already registered this frame"),
            ));
        }
        let gpu = backend.device.create_committed(desc, initial_state)?;
        log::trace!("Created transient {:?} '{name}' as {gpu:?}", desc.kind());
        self.insert(
            name,
            desc.kind(),
            ResourceLifetime::Transient,
            gpu,
            initial_state,
        )
    }

    /// Register a caller-owned resource in its current state.
    pub fn import(
        &mut self,
        name: &str,
        kind: ResourceKind,
        gpu: GpuResourceId,
        current_state: ResourceState,
    ) -> GraphicsResult<ResourceHandle> {
        self.insert(name, kind, ResourceLifetime::Imported, gpu, current_state)
    }

    pub fn lookup(&self, name: &str) -> Option<ResourceHandle> {
        self.names
            .get(name)
            .map(|&index| ResourceHandle::new(index, self.generation))
    }

    /// Check index range, generation and (optionally) kind.
    pub fn validate(
        &self,
        handle: ResourceHandle,
        kind: Option<ResourceKind>,
    ) -> GraphicsResult<&GraphResource> {
        if handle.generation != self.generation {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!(
                    "stale handle {}: generation {} != {}",
                    handle.index, handle.generation, self.generation
                ),
            ));
        }
        let Some(entry) = self.entries.get(handle.index as usize) else {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!(
                    "resource index {} out of range ({} resources)",
                    handle.index,
                    self.entries.len()
                ),
            ));
        };
        if let Some(kind) = kind
            && entry.kind != kind
        {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!("'{}' is a {:?}, not a {kind:?}", entry.name, entry.kind),
            ));
        }
        Ok(entry)
    }

    pub fn get(&self, handle: ResourceHandle) -> GraphicsResult<&GraphResource> {
        self.validate(handle, None)
    }

    /// Entry by raw index. Only for indices taken from validated accesses.
    pub fn entry(&self, index: u32) -> &GraphResource {
        &self.entries[index as usize]
    }

    pub fn entry_mut(&mut self, index: u32) -> &mut GraphResource {
        &mut self.entries[index as usize]
    }

    /// Reset every tracked state to the frame-initial state.
    pub fn reset_tracked_states(&mut self) {
        for entry in &mut self.entries {
            entry.current_state = entry.initial_state;
        }
    }

    /// Allocate a view slot of `kind` for a resource.
    pub fn create_view(
        &mut self,
        backend: &BackendContext,
        handle: ResourceHandle,
        kind: ViewKind,
    ) -> GraphicsResult<ViewSlot> {
        let gpu = self.validate(handle, None)?.gpu;
        let slot = backend.views.allocate(kind)?;
        backend.views.create_view(slot, gpu);
        self.entries[handle.index as usize]
            .views
            .push(ResourceView { slot, owned: true });
        Ok(slot)
    }

    /// Attach a caller-owned view slot to an imported resource.
    pub fn attach_view(&mut self, handle: ResourceHandle, slot: ViewSlot) -> GraphicsResult<()> {
        let entry = self.validate(handle, None)?;
        if entry.lifetime != ResourceLifetime::Imported {
            return Err(GraphicsError::invalid_arg(
                Facility::Resource,
                format!("'{}' is transient; its views belong to the graph", entry.name),
            ));
        }
        self.entries[handle.index as usize]
            .views
            .push(ResourceView { slot, owned: false });
        Ok(())
    }

    /// CPU and GPU descriptor handles of the first view of `kind`.
    pub fn view_handle(
        &self,
        backend: &BackendContext,
        handle: ResourceHandle,
        kind: ViewKind,
    ) -> GraphicsResult<(CpuDescriptor, Option<GpuDescriptor>)> {
        let entry = self.validate(handle, None)?;
        let Some(view) = entry.views.iter().find(|v| v.slot.kind == kind) else {
            return Err(GraphicsError::invalid_state(
                Facility::Resource,
                format!("'{}' has no {kind:?} view", entry.name),
            ));
        };
        Ok((
            backend.views.cpu_handle(view.slot),
            backend.views.gpu_handle(view.slot),
        ))
    }
}
