//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`ember_core::profiling`]. With the
//! `profiling` feature enabled they forward to Tracy; otherwise they compile
//! to nothing.
//!
//! ```toml
//! [dependencies]
//! ember-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! The scheduler instruments itself:
//!
//! | Site | Macro |
//! |------|-------|
//! | `RenderGraph::build` | `profile_scope!` |
//! | every pass in `RenderGraph::execute` | `profile_scope_dynamic!` with the pass name |
//! | `FrameRenderer::render` | `profile_scope!` |
//! | worker callbacks | `profile_scope!` |
//! | every present | `frame_mark!` |
//!
//! Pass CPU record times are additionally logged at `trace` level in debug
//! builds.

pub use ember_core::profiling::*;
