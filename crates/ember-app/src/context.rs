//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use ember_core::{MaterialHandle, MeshHandle};
use ember_gpu::{
    GpuContext, GraphicsPipeline, GraphicsPipelineConfig, RenderPass, SurfaceContext, Swapchain,
};
use ember_render::{GpuMesh, MeshData, RenderResources};
use tracing::{error, info};
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Owns the window-facing GPU state and the engine resource tables. Frame
/// slots are not here; the frame loop owns them.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device and queues.
    pub gpu: GpuContext,
    /// Surface context for windowed rendering.
    pub surface: SurfaceContext,
    /// The swapchain, with its depth buffer.
    pub swapchain: Swapchain,
    /// Render pass with one framebuffer per swapchain image.
    pub render_pass: RenderPass,
    /// Pipelines and meshes addressed by handle.
    pub resources: RenderResources,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    /// Create the surface, swapchain and render pass for `window`.
    ///
    /// # Safety
    /// The window must have valid handles and outlive the context.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        // SAFETY: Caller guarantees window has valid handles
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: GPU context is valid
        let mut swapchain = match unsafe { surface.create_swapchain(&gpu, width, height, vsync) } {
            Ok(swapchain) => swapchain,
            Err(e) => {
                unsafe { surface.destroy() };
                return Err(e.into());
            }
        };

        info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count(),
            swapchain.present_mode
        );

        // SAFETY: The swapchain was created on this device
        let render_pass = match unsafe { RenderPass::new(gpu.device(), &swapchain) } {
            Ok(render_pass) => render_pass,
            Err(e) => {
                unsafe {
                    if let Err(e) = surface.destroy_swapchain(&gpu, &mut swapchain) {
                        error!("Failed to destroy swapchain: {e}");
                    }
                    surface.destroy();
                }
                return Err(e.into());
            }
        };

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            render_pass,
            resources: RenderResources::new(),
            last_frame_time: Instant::now(),
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    /// Build a graphics pipeline against the context's render pass and register
    /// it as a material.
    pub fn create_pipeline(
        &mut self,
        config: &GraphicsPipelineConfig,
    ) -> anyhow::Result<MaterialHandle> {
        // SAFETY: The render pass belongs to this device
        let pipeline = unsafe {
            GraphicsPipeline::new(self.gpu.device(), config, self.render_pass.render_pass)?
        };
        let handle = self.resources.add_pipeline(pipeline);
        info!("Created pipeline {handle:?}");
        Ok(handle)
    }

    /// Upload `mesh` into a vertex buffer and register it.
    pub fn upload_mesh(&mut self, mesh: &MeshData, name: &str) -> anyhow::Result<MeshHandle> {
        let gpu_mesh = {
            let mut allocator = self.gpu.allocator().lock();
            GpuMesh::upload(&mut allocator, mesh, name)?
        };
        let handle = self.resources.add_mesh(gpu_mesh);
        info!(
            "Uploaded mesh '{name}' as {handle:?} ({} vertices)",
            mesh.vertex_count()
        );
        Ok(handle)
    }

    /// Destroy resources, render pass, swapchain and surface.
    ///
    /// # Safety
    /// The GPU must be idle and no frame slot may reference these resources.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();

        // SAFETY: Caller guarantees GPU is idle and resources are not in use
        unsafe {
            {
                let mut allocator = self.gpu.allocator().lock();
                if let Err(e) = self.resources.destroy(device, &mut allocator) {
                    error!("Failed to destroy render resources: {e}");
                }
            }

            self.render_pass.destroy(device);

            if let Err(e) = self.surface.destroy_swapchain(&self.gpu, &mut self.swapchain) {
                error!("Failed to destroy swapchain: {e}");
            }
            self.surface.destroy();
        }
    }
}
