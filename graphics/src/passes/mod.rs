//! Built-in passes.
//!
//! - [`ClearPass`]: clears the back buffer and leaves it ready to present.
//!   The orchestrator adds it when no pass is registered.
//! - [`CopyBufferPass`]: copies one buffer into another; used by
//!   [`UploadProvider`](crate::scheduler::UploadProvider).

mod clear;
mod copy;

pub use clear::ClearPass;
pub use copy::CopyBufferPass;

use crate::error::{Facility, GraphicsError};

pub(crate) fn missing_resource(pass: &str, resource: &str) -> GraphicsError {
    GraphicsError::invalid_arg(
        Facility::Graph,
        format!("pass '{pass}' needs resource '{resource}', which is not registered this frame"),
    )
}
