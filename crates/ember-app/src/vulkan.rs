//! [`FrameBackend`] over a real device, surface and swapchain.

use std::time::Duration;

use ember_gpu::{
    AcquireOutcome, FrameSlot, GpuContext, PresentOutcome, RenderPass, Result, SurfaceContext,
    Swapchain,
};
use ember_render::{RenderResources, VulkanRecorder};

use crate::backend::{FrameBackend, RecordCommands};
use crate::context::AppContext;

/// Borrows everything one tick touches from the [`AppContext`].
pub struct VulkanBackend<'a> {
    gpu: &'a GpuContext,
    surface: &'a SurfaceContext,
    swapchain: &'a Swapchain,
    render_pass: &'a RenderPass,
    resources: &'a RenderResources,
}

impl<'a> VulkanBackend<'a> {
    /// # Safety
    /// The context's swapchain, render pass and resources must be live and
    /// built for each other, and must outlive every slot this backend creates.
    pub unsafe fn new(ctx: &'a AppContext) -> Self {
        Self {
            gpu: &ctx.gpu,
            surface: &ctx.surface,
            swapchain: &ctx.swapchain,
            render_pass: &ctx.render_pass,
            resources: &ctx.resources,
        }
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }
}

impl FrameBackend for VulkanBackend<'_> {
    type Slot = FrameSlot;

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn create_slot(&mut self) -> Result<FrameSlot> {
        // SAFETY: The device outlives the backend
        unsafe { FrameSlot::new(self.device(), self.gpu.graphics_queue_family()) }
    }

    fn wait_for_slot(&mut self, slot: &FrameSlot, timeout: Duration) -> Result<()> {
        // SAFETY: Slot handles come from this device
        unsafe { slot.wait(self.device(), timeout) }
    }

    fn reset_commands(&mut self, slot: &FrameSlot) -> Result<()> {
        // SAFETY: The caller has waited on the slot's fence, so the buffer is idle
        unsafe { slot.reset_commands(self.device()) }
    }

    fn acquire_image(&mut self, slot: &FrameSlot, timeout: Duration) -> Result<AcquireOutcome> {
        // SAFETY: The semaphore is unsignaled; the slot's previous acquire was consumed
        // by its previous submission, which the fence wait has observed
        unsafe {
            self.swapchain.acquire_next_image(
                &self.surface.swapchain_loader,
                slot.image_available(),
                timeout,
            )
        }
    }

    fn reset_fence(&mut self, slot: &FrameSlot) -> Result<()> {
        // SAFETY: The fence is signaled and nothing pending references it
        unsafe { slot.reset(self.device()) }
    }

    fn record(
        &mut self,
        slot: &FrameSlot,
        image_index: u32,
        commands: &mut RecordCommands<'_>,
    ) -> Result<()> {
        let device = self.device();
        let render_pass = self.render_pass;
        let resources = self.resources;

        // SAFETY: The buffer was reset this tick and is not pending
        unsafe {
            slot.record(device, |cmd| {
                render_pass.begin(device, cmd, image_index)?;

                let mut recorder = VulkanRecorder::new(device, cmd, resources);
                let result = commands(&mut recorder);

                render_pass.end(device, cmd);
                result
            })
        }
    }

    fn submit(&mut self, slot: &FrameSlot, image_index: u32) -> Result<()> {
        let render_finished = self.swapchain.render_finished(image_index)?;

        // SAFETY: The buffer is fully recorded and the fence was reset this tick.
        // The image's previous present consumed render_finished before the
        // image could be acquired again.
        unsafe { slot.submit(self.device(), self.gpu.graphics_queue(), render_finished) }
    }

    fn present(&mut self, _slot: &FrameSlot, image_index: u32) -> Result<PresentOutcome> {
        // SAFETY: The submission just made signals the image's render_finished
        unsafe {
            self.swapchain.present(
                &self.surface.swapchain_loader,
                self.gpu.graphics_queue(),
                image_index,
            )
        }
    }

    fn destroy_slot(&mut self, slot: FrameSlot) {
        // SAFETY: The pool waits on every fence before destroying
        unsafe { slot.destroy(self.device()) }
    }
}
