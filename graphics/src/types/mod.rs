//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, hardware resource states
//! and descriptor structs used throughout the scheduler.

mod buffer;
mod common;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use common::{ClearColor, Extent3d};
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
