//! Typed handles into engine-owned resource tables.

use bytemuck::{Pod, Zeroable};

/// Handle to an uploaded mesh (vertex buffer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct MeshHandle(pub u32);

impl MeshHandle {
    /// Index into the mesh table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a material, i.e. a graphics pipeline and its layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct MaterialHandle(pub u32);

impl MaterialHandle {
    /// Index into the pipeline table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
