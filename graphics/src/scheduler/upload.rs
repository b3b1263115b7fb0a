//! CPU → GPU buffer uploads through per-slot staging buffers.

use crate::backend::{BackendContext, GpuResourceId, ResourceDesc};
use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::graph::RenderGraph;
use crate::passes::CopyBufferPass;
use crate::types::{BufferDescriptor, ResourceState};

use super::FrameResourceProvider;

#[derive(Debug)]
struct PendingUpload {
    destination: GpuResourceId,
    bytes: Vec<u8>,
}

/// Copies staged data into a caller-owned buffer on the next frame.
///
/// Each ring slot owns one staging buffer, so the CPU only writes staging
/// memory whose previous copy the renderer has already waited for. The
/// destination must be in `COMMON` when the frame starts and is returned to
/// `COMMON` afterwards. Staging again before the next frame replaces the
/// pending data.
///
/// Graph resources are named after the provider's label (`"<label> staging"`,
/// `"<label> destination"`), so several providers need distinct labels.
pub struct UploadProvider {
    backend: BackendContext,
    label: String,
    staging: Vec<GpuResourceId>,
    capacity: u64,
    async_copy: bool,
    pending: Option<PendingUpload>,
}

impl UploadProvider {
    /// Allocate `frames_in_flight` staging buffers of `capacity` bytes.
    pub fn new(backend: BackendContext, frames_in_flight: usize, capacity: u64) -> GraphicsResult<Self> {
        if frames_in_flight == 0 || capacity == 0 {
            return Err(GraphicsError::invalid_arg(
                Facility::Orchestrator,
                format!("upload provider needs slots and capacity ({frames_in_flight} x {capacity} bytes)"),
            ));
        }

        let mut staging = Vec::with_capacity(frames_in_flight);
        for slot in 0..frames_in_flight {
            let desc = BufferDescriptor::staging(capacity).with_label(format!("upload staging {slot}"));
            match backend
                .device
                .create_committed(&ResourceDesc::Buffer(desc), ResourceState::GENERIC_READ)
            {
                Ok(id) => staging.push(id),
                Err(err) => {
                    for id in staging {
                        backend.device.destroy(id);
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self {
            backend,
            label: "upload".to_owned(),
            staging,
            capacity,
            async_copy: false,
            pending: None,
        })
    }

    /// Set the label that names this provider and its graph resources.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Run the copy on the copy queue when the config allows it.
    pub fn with_async_copy(mut self, enabled: bool) -> Self {
        self.async_copy = enabled;
        self
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Queue `data` for upload into `destination` on the next frame.
    pub fn stage<T: bytemuck::Pod>(&mut self, destination: GpuResourceId, data: &[T]) -> GraphicsResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() || bytes.len() as u64 > self.capacity {
            return Err(GraphicsError::invalid_arg(
                Facility::Orchestrator,
                format!(
                    "upload of {} bytes does not fit staging capacity of {} bytes",
                    bytes.len(),
                    self.capacity
                ),
            ));
        }
        if self.pending.is_some() {
            log::debug!("Replacing pending upload with {} bytes", bytes.len());
        }
        self.pending = Some(PendingUpload {
            destination,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

impl FrameResourceProvider for UploadProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn contribute(&mut self, graph: &mut RenderGraph) -> GraphicsResult<()> {
        let Some(upload) = self.pending.take() else {
            return Ok(());
        };

        let staging = self.staging[graph.slot() % self.staging.len()];
        self.backend.device.write_buffer(staging, 0, &upload.bytes)?;

        let staging_name = format!("{} staging", self.label);
        let destination_name = format!("{} destination", self.label);
        graph.import_buffer(&staging_name, staging, ResourceState::GENERIC_READ)?;
        graph.import_buffer(&destination_name, upload.destination, ResourceState::COMMON)?;
        let size = upload.bytes.len() as u64;
        graph.add_pass(std::sync::Arc::new(
            CopyBufferPass::new(staging_name, destination_name, size).with_async_queue(self.async_copy),
        ))?;
        log::trace!("Frame {}: uploading {size} bytes", graph.frame());
        Ok(())
    }
}

impl Drop for UploadProvider {
    fn drop(&mut self) {
        for id in self.staging.drain(..) {
            self.backend.device.destroy(id);
        }
    }
}

impl std::fmt::Debug for UploadProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProvider")
            .field("label", &self.label)
            .field("slots", &self.staging.len())
            .field("capacity", &self.capacity)
            .field("pending", &self.pending.as_ref().map(|p| p.bytes.len()))
            .finish()
    }
}
