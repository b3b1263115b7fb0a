//! Hardware resource states.
//!
//! A resource is in exactly one state at a time from the GPU's point of view.
//! Read-only states may be combined (a buffer can be a vertex buffer and a
//! shader resource at once); write states are exclusive.

use bitflags::bitflags;

bitflags! {
    /// Hardware state of a GPU resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceState: u32 {
        /// Default state, usable for simultaneous access and presentation engines.
        const COMMON = 1 << 0;
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 1;
        const INDEX_BUFFER = 1 << 2;
        const RENDER_TARGET = 1 << 3;
        const UNORDERED_ACCESS = 1 << 4;
        const DEPTH_WRITE = 1 << 5;
        const DEPTH_READ = 1 << 6;
        const NON_PIXEL_SHADER_RESOURCE = 1 << 7;
        const PIXEL_SHADER_RESOURCE = 1 << 8;
        const INDIRECT_ARGUMENT = 1 << 9;
        const COPY_DEST = 1 << 10;
        const COPY_SOURCE = 1 << 11;
        /// Ready to be handed to the presentation engine.
        const PRESENT = 1 << 12;

        /// Every read state an upload heap resource must stay in.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
        const ALL_SHADER_RESOURCE = Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits();
    }
}

impl ResourceState {
    /// States that imply a GPU write.
    pub const WRITE_MASK: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::COPY_DEST);

    /// Returns true if this state allows the GPU to write the resource.
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITE_MASK)
    }

    /// Returns true if this state only allows reads.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && !self.is_write()
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::COMMON
    }
}
