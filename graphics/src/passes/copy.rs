use crate::error::GraphicsResult;
use crate::graph::{Pass, PassBuilder, PassContext, PassType};
use crate::types::ResourceState;

use super::missing_resource;

/// Copies `size` bytes from one named buffer into another.
///
/// The source is read in `COPY_SOURCE`; the destination is written in
/// `COPY_DEST` and returned to `COMMON` afterwards.
#[derive(Debug, Clone)]
pub struct CopyBufferPass {
    name: String,
    source: String,
    destination: String,
    size: u64,
    async_queue: bool,
}

impl CopyBufferPass {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, size: u64) -> Self {
        let source = source.into();
        let destination = destination.into();
        Self {
            name: format!("copy {source} -> {destination}"),
            source,
            destination,
            size,
            async_queue: false,
        }
    }

    /// Run on the copy queue when `GraphicsConfig::async_copy` is set.
    pub fn with_async_queue(mut self, enabled: bool) -> Self {
        self.async_queue = enabled;
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Pass for CopyBufferPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass_type(&self) -> PassType {
        PassType::Copy
    }

    fn async_queue(&self) -> bool {
        self.async_queue
    }

    fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
        let source = builder
            .lookup(&self.source)
            .ok_or_else(|| missing_resource(&self.name, &self.source))?;
        let destination = builder
            .lookup(&self.destination)
            .ok_or_else(|| missing_resource(&self.name, &self.destination))?;
        builder.read_buffer(source, ResourceState::COPY_SOURCE);
        builder.write_buffer_with_final(destination, ResourceState::COPY_DEST, ResourceState::COMMON);
        Ok(())
    }

    fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
        let source = ctx
            .lookup(&self.source)
            .ok_or_else(|| missing_resource(&self.name, &self.source))?;
        let destination = ctx
            .lookup(&self.destination)
            .ok_or_else(|| missing_resource(&self.name, &self.destination))?;
        let src = ctx.gpu_resource(source)?;
        let dst = ctx.gpu_resource(destination)?;
        ctx.commands().copy_buffer(src, dst, self.size);
        Ok(())
    }
}
