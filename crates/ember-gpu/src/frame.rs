//! Resources owned by one frame in flight.

use std::time::Duration;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};

/// A command pool with its single primary buffer, the semaphore that orders
/// acquire before drawing, and the fence the CPU waits on before reusing any
/// of it.
///
/// Handles are owned: a slot is neither `Clone` nor `Copy`, and
/// [`FrameSlot::destroy`] consumes it.
#[derive(Debug)]
pub struct FrameSlot {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSlot {
    /// Create the resources for one slot. The fence starts signaled so the
    /// first wait returns at once.
    ///
    /// Anything already created is destroyed again when a later step fails.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let mut slot = Self::empty();
        // SAFETY: Forwarded from the caller
        match unsafe { slot.create_parts(device, queue_family) } {
            Ok(()) => {
                debug_assert!(slot.is_complete());
                Ok(slot)
            }
            Err(e) => {
                // SAFETY: Nothing in a half-built slot was ever submitted
                unsafe { slot.destroy(device) };
                Err(e)
            }
        }
    }

    fn empty() -> Self {
        Self {
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            image_available: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        }
    }

    unsafe fn create_parts(&mut self, device: &ash::Device, queue_family: u32) -> Result<()> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        // SAFETY: The device is valid
        self.command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: The pool was just created on this device
        self.command_buffer = unsafe { device.allocate_command_buffers(&buffer_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Other("Driver returned no command buffer".to_string()))?;

        // SAFETY: The device is valid
        unsafe {
            self.image_available = create_semaphore(device)?;
            self.in_flight = create_fence(device, true)?;
        }
        Ok(())
    }

    /// Whether every handle was created.
    pub fn is_complete(&self) -> bool {
        self.command_pool != vk::CommandPool::null()
            && self.command_buffer != vk::CommandBuffer::null()
            && self.image_available != vk::Semaphore::null()
            && self.in_flight != vk::Fence::null()
    }

    /// Signaled once the image acquired for this slot can be drawn to.
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Wait until the GPU has finished the last submission from this slot.
    ///
    /// # Safety
    /// The device must be the one the slot was created on.
    pub unsafe fn wait(&self, device: &ash::Device, timeout: Duration) -> Result<()> {
        unsafe { wait_for_fence(device, self.in_flight, timeout) }
    }

    /// Unsignal the fence ahead of the submission that signals it.
    ///
    /// # Safety
    /// The fence must have been observed signaled.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { reset_fence(device, self.in_flight) }
    }

    /// Return the command buffer to the initial state.
    ///
    /// # Safety
    /// The slot's fence must have been observed signaled.
    pub unsafe fn reset_commands(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    /// Record a one-time-submit buffer through `commands`.
    ///
    /// The buffer is ended whether or not `commands` succeeds, and its error
    /// wins over one from ending.
    ///
    /// # Safety
    /// The buffer must have been reset since its last submission.
    pub unsafe fn record<F>(&self, device: &ash::Device, commands: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(self.command_buffer, &begin_info)? };

        let recorded = commands(self.command_buffer);
        let ended = unsafe { device.end_command_buffer(self.command_buffer) };

        recorded.and(ended.map_err(GpuError::from))
    }

    /// Submit the recorded buffer to `queue`.
    ///
    /// The GPU waits on image-available at colour attachment output, then
    /// signals `render_finished` and this slot's fence.
    ///
    /// # Safety
    /// The buffer must be fully recorded and the fence reset.
    pub unsafe fn submit(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        render_finished: vk::Semaphore,
    ) -> Result<()> {
        let command_buffers = [self.command_buffer];
        let wait_semaphores = [self.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.queue_submit(queue, &[submit_info], self.in_flight)? };
        Ok(())
    }

    /// Destroy everything the slot owns. Freeing the pool frees its buffer.
    /// Null handles are skipped by the driver, so a half-built slot is fine.
    ///
    /// # Safety
    /// The slot's fence must have been observed signaled.
    pub unsafe fn destroy(self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight, None);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}
