//! Push constant layouts.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-draw data for the mesh pipelines: the full clip-space transform.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub transform: [[f32; 4]; 4],
}

impl MeshPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// `view_projection * model`, column-major.
    pub fn new(view_projection: &Mat4, model: &Mat4) -> Self {
        Self {
            transform: (*view_projection * *model).to_cols_array_2d(),
        }
    }

    /// The range every mesh pipeline layout declares.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: Self::SIZE,
        }
    }
}
