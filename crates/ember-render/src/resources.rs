//! Engine-owned pipeline and mesh tables.

use ember_core::{MaterialHandle, MeshHandle};
use ember_gpu::{GpuAllocator, GpuError, GraphicsPipeline, Result};

use crate::mesh::GpuMesh;

/// Pipelines and meshes addressed by handle. Draw batches only reference
/// entries here; the tables outlive every batch.
#[derive(Default)]
pub struct RenderResources {
    pipelines: Vec<GraphicsPipeline>,
    meshes: Vec<GpuMesh>,
}

impl RenderResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a pipeline and hand back its material handle.
    pub fn add_pipeline(&mut self, pipeline: GraphicsPipeline) -> MaterialHandle {
        self.pipelines.push(pipeline);
        MaterialHandle(self.pipelines.len() as u32 - 1)
    }

    /// Take ownership of an uploaded mesh and hand back its handle.
    pub fn add_mesh(&mut self, mesh: GpuMesh) -> MeshHandle {
        self.meshes.push(mesh);
        MeshHandle(self.meshes.len() as u32 - 1)
    }

    pub fn pipeline(&self, handle: MaterialHandle) -> Result<&GraphicsPipeline> {
        self.pipelines
            .get(handle.index())
            .ok_or_else(|| GpuError::ResourceNotFound(format!("{handle:?}")))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Result<&GpuMesh> {
        self.meshes
            .get(handle.index())
            .ok_or_else(|| GpuError::ResourceNotFound(format!("{handle:?}")))
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Destroy every pipeline and free every mesh. Handles handed out earlier
    /// become dangling.
    ///
    /// # Safety
    /// Nothing referencing these resources may still be pending on the GPU.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        for pipeline in self.pipelines.drain(..) {
            unsafe { pipeline.destroy(device) };
        }
        for mut mesh in self.meshes.drain(..) {
            mesh.destroy(allocator)?;
        }
        Ok(())
    }
}
