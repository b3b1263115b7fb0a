use crate::backend::ViewKind;
use crate::error::GraphicsResult;
use crate::graph::{Pass, PassBuilder, PassContext, PassType};
use crate::scheduler::BACK_BUFFER;
use crate::types::ResourceState;

use super::missing_resource;

/// Clears a render target to `GraphicsConfig::clear_color` and transitions
/// it to `PRESENT`.
#[derive(Debug, Clone)]
pub struct ClearPass {
    name: String,
    target: String,
}

impl ClearPass {
    /// Clear the resource registered as `target`.
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            name: format!("clear {target}"),
            target,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for ClearPass {
    /// Clears the back buffer.
    fn default() -> Self {
        Self::new(BACK_BUFFER)
    }
}

impl Pass for ClearPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn pass_type(&self) -> PassType {
        PassType::Render
    }

    fn setup(&self, builder: &mut PassBuilder<'_>) -> GraphicsResult<()> {
        let target = builder
            .lookup(&self.target)
            .ok_or_else(|| missing_resource(&self.name, &self.target))?;
        builder.write_texture_with_final(target, ResourceState::RENDER_TARGET, ResourceState::PRESENT);
        builder.create_view(target, ViewKind::RenderTarget)?;
        Ok(())
    }

    fn execute(&self, ctx: &mut PassContext<'_>) -> GraphicsResult<()> {
        let target = ctx
            .lookup(&self.target)
            .ok_or_else(|| missing_resource(&self.name, &self.target))?;
        let gpu = ctx.gpu_resource(target)?;
        let (view, _) = ctx.view_handle(target, ViewKind::RenderTarget)?;
        let color = ctx.config().clear_color;
        ctx.commands().clear_render_target(gpu, view, color);
        Ok(())
    }
}
