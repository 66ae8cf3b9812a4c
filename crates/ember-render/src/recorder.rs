//! Recording a draw batch into a command buffer.
//!
//! [`record_batch`] owns the bind-minimizing policy. It talks to the command
//! buffer only through [`CommandRecorder`], so the policy can be exercised
//! without a device.

use ash::vk;
use ember_core::{MaterialHandle, MeshHandle};
use ember_gpu::Result;
use glam::Mat4;

use crate::drawable::DrawBatch;
use crate::push::MeshPushConstants;
use crate::resources::RenderResources;

/// Commands issued for each drawable inside an open render pass.
pub trait CommandRecorder {
    fn bind_pipeline(&mut self, material: MaterialHandle) -> Result<()>;
    fn bind_vertex_buffer(&mut self, mesh: MeshHandle) -> Result<()>;
    /// Upload the per-draw transform through `material`'s pipeline layout.
    fn push_transform(&mut self, material: MaterialHandle, transform: &Mat4) -> Result<()>;
    fn draw(&mut self, mesh: MeshHandle) -> Result<()>;
}

/// Bind and draw counts for one recorded batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BindStats {
    pub pipeline_binds: u32,
    pub vertex_buffer_binds: u32,
    pub draws: u32,
}

/// Record every drawable in `batch`, re-binding the pipeline or vertex buffer
/// only when it differs from the previous entry. The transform is recomputed
/// from `view_projection` for every entry.
pub fn record_batch<R: CommandRecorder + ?Sized>(
    recorder: &mut R,
    batch: &DrawBatch,
    view_projection: &Mat4,
) -> Result<BindStats> {
    let mut stats = BindStats::default();
    let mut bound_material: Option<MaterialHandle> = None;
    let mut bound_mesh: Option<MeshHandle> = None;

    for drawable in batch {
        if bound_material != Some(drawable.material) {
            recorder.bind_pipeline(drawable.material)?;
            bound_material = Some(drawable.material);
            stats.pipeline_binds += 1;
        }

        if bound_mesh != Some(drawable.mesh) {
            recorder.bind_vertex_buffer(drawable.mesh)?;
            bound_mesh = Some(drawable.mesh);
            stats.vertex_buffer_binds += 1;
        }

        recorder.push_transform(drawable.material, &(*view_projection * drawable.model))?;
        recorder.draw(drawable.mesh)?;
        stats.draws += 1;
    }

    Ok(stats)
}

/// Records into a Vulkan command buffer, resolving handles through the
/// engine's resource tables.
pub struct VulkanRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    resources: &'a RenderResources,
}

impl<'a> VulkanRecorder<'a> {
    /// # Safety
    /// `cmd` must be recording inside a render pass compatible with every
    /// pipeline in `resources`, for as long as the recorder is used.
    pub unsafe fn new(
        device: &'a ash::Device,
        cmd: vk::CommandBuffer,
        resources: &'a RenderResources,
    ) -> Self {
        Self {
            device,
            cmd,
            resources,
        }
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn bind_pipeline(&mut self, material: MaterialHandle) -> Result<()> {
        let pipeline = self.resources.pipeline(material)?;
        unsafe {
            self.device.cmd_bind_pipeline(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, mesh: MeshHandle) -> Result<()> {
        let mesh = self.resources.mesh(mesh)?;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[mesh.buffer.buffer], &[0]);
        }
        Ok(())
    }

    fn push_transform(&mut self, material: MaterialHandle, transform: &Mat4) -> Result<()> {
        let pipeline = self.resources.pipeline(material)?;
        let constants = MeshPushConstants {
            transform: transform.to_cols_array_2d(),
        };
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&constants),
            );
        }
        Ok(())
    }

    fn draw(&mut self, mesh: MeshHandle) -> Result<()> {
        let mesh = self.resources.mesh(mesh)?;
        unsafe {
            self.device.cmd_draw(self.cmd, mesh.vertex_count, 1, 0, 0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::Drawable;
    use ember_gpu::GpuError;
    use glam::Vec3;

    #[derive(Debug, PartialEq)]
    enum Command {
        BindPipeline(u32),
        BindVertexBuffer(u32),
        Push(Mat4),
        Draw(u32),
    }

    #[derive(Default)]
    struct LogRecorder {
        commands: Vec<Command>,
        fail_on_draw: bool,
    }

    impl CommandRecorder for LogRecorder {
        fn bind_pipeline(&mut self, material: MaterialHandle) -> Result<()> {
            self.commands.push(Command::BindPipeline(material.0));
            Ok(())
        }

        fn bind_vertex_buffer(&mut self, mesh: MeshHandle) -> Result<()> {
            self.commands.push(Command::BindVertexBuffer(mesh.0));
            Ok(())
        }

        fn push_transform(&mut self, _material: MaterialHandle, transform: &Mat4) -> Result<()> {
            self.commands.push(Command::Push(*transform));
            Ok(())
        }

        fn draw(&mut self, mesh: MeshHandle) -> Result<()> {
            if self.fail_on_draw {
                return Err(GpuError::ResourceNotFound(format!("{mesh:?}")));
            }
            self.commands.push(Command::Draw(mesh.0));
            Ok(())
        }
    }

    fn drawable(mesh: u32, material: u32, x: f32) -> Drawable {
        Drawable::new(
            MeshHandle(mesh),
            MaterialHandle(material),
            Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
        )
    }

    #[test]
    fn shared_pipeline_and_mesh_bind_once() {
        let batch: DrawBatch = (0..3).map(|i| drawable(0, 0, i as f32)).collect();
        let mut recorder = LogRecorder::default();

        let stats = record_batch(&mut recorder, &batch, &Mat4::IDENTITY).unwrap();

        assert_eq!(
            stats,
            BindStats {
                pipeline_binds: 1,
                vertex_buffer_binds: 1,
                draws: 3,
            }
        );
    }

    #[test]
    fn distinct_pipelines_same_mesh() {
        let batch: DrawBatch = [drawable(0, 0, 0.0), drawable(0, 1, 1.0)].into_iter().collect();
        let mut recorder = LogRecorder::default();

        let stats = record_batch(&mut recorder, &batch, &Mat4::IDENTITY).unwrap();

        assert_eq!(stats.pipeline_binds, 2);
        assert_eq!(stats.vertex_buffer_binds, 1);
        assert_eq!(stats.draws, 2);
    }

    #[test]
    fn rebinds_when_a_handle_comes_back() {
        // A, B, A: the third entry differs from its predecessor
        let batch: DrawBatch = [drawable(0, 0, 0.0), drawable(1, 1, 0.0), drawable(0, 0, 0.0)]
            .into_iter()
            .collect();
        let mut recorder = LogRecorder::default();

        let stats = record_batch(&mut recorder, &batch, &Mat4::IDENTITY).unwrap();

        assert_eq!(stats.pipeline_binds, 3);
        assert_eq!(stats.vertex_buffer_binds, 3);
    }

    #[test]
    fn binds_precede_push_and_draw() {
        let batch: DrawBatch = [drawable(4, 2, 1.0)].into_iter().collect();
        let mut recorder = LogRecorder::default();

        record_batch(&mut recorder, &batch, &Mat4::IDENTITY).unwrap();

        assert_eq!(
            recorder.commands,
            vec![
                Command::BindPipeline(2),
                Command::BindVertexBuffer(4),
                Command::Push(Mat4::from_translation(Vec3::X)),
                Command::Draw(4),
            ]
        );
    }

    #[test]
    fn transform_follows_view_projection() {
        let batch: DrawBatch = [drawable(0, 0, 1.0)].into_iter().collect();
        let mut recorder = LogRecorder::default();
        let vp = Mat4::from_scale(Vec3::splat(3.0));

        record_batch(&mut recorder, &batch, &vp).unwrap();

        let pushed = recorder
            .commands
            .iter()
            .find_map(|c| match c {
                Command::Push(m) => Some(*m),
                _ => None,
            })
            .unwrap();
        assert_eq!(pushed, vp * Mat4::from_translation(Vec3::X));
    }

    #[test]
    fn empty_batch_records_nothing() {
        let mut recorder = LogRecorder::default();
        let stats = record_batch(&mut recorder, &DrawBatch::new(), &Mat4::IDENTITY).unwrap();

        assert_eq!(stats, BindStats::default());
        assert!(recorder.commands.is_empty());
    }

    #[test]
    fn recorder_errors_propagate() {
        let batch: DrawBatch = [drawable(0, 0, 0.0)].into_iter().collect();
        let mut recorder = LogRecorder {
            fail_on_draw: true,
            ..Default::default()
        };

        let err = record_batch(&mut recorder, &batch, &Mat4::IDENTITY).unwrap_err();
        assert!(matches!(err, GpuError::ResourceNotFound(_)));
    }
}
