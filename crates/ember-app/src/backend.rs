//! The seam between the frame protocol and the GPU.

use std::time::Duration;

use ember_gpu::{AcquireOutcome, PresentOutcome, Result};
use ember_render::CommandRecorder;

/// Draw commands recorded inside the render pass of one tick.
pub type RecordCommands<'a> = dyn FnMut(&mut dyn CommandRecorder) -> Result<()> + 'a;

/// Operations the frame loop drives every tick, over backend-owned slots.
///
/// Implementations check every call synchronously. Any error other than
/// [`ember_gpu::GpuError::Timeout`] is fatal to the loop.
pub trait FrameBackend {
    /// Per-slot resources: command buffer, image-available semaphore and a
    /// fence.
    type Slot;

    /// Number of presentable images. Independent of the slot count.
    fn image_count(&self) -> usize;

    /// Create one slot. Its fence starts signaled.
    fn create_slot(&mut self) -> Result<Self::Slot>;

    /// Block until the slot's fence is signaled, failing with a timeout error
    /// once `timeout` passes.
    fn wait_for_slot(&mut self, slot: &Self::Slot, timeout: Duration) -> Result<()>;

    /// Return the slot's command buffer to the empty state.
    fn reset_commands(&mut self, slot: &Self::Slot) -> Result<()>;

    /// Ask for the next image, signaling the slot's image-available semaphore
    /// once it is ready.
    fn acquire_image(&mut self, slot: &Self::Slot, timeout: Duration) -> Result<AcquireOutcome>;

    /// Unsignal the slot's fence ahead of the submission that signals it.
    fn reset_fence(&mut self, slot: &Self::Slot) -> Result<()>;

    /// Begin the command buffer and the render pass on `image_index`, run
    /// `commands`, then end both. The pass and buffer are ended even when
    /// `commands` fails; its error is returned afterwards.
    fn record(
        &mut self,
        slot: &Self::Slot,
        image_index: u32,
        commands: &mut RecordCommands<'_>,
    ) -> Result<()>;

    /// Submit the slot's buffer. The GPU waits on image-available at colour
    /// attachment output and signals the fence plus the render-finished
    /// semaphore of `image_index`.
    ///
    /// Render-finished belongs to the image, not the slot: the fence only
    /// covers the submission, so a slot's next tick may begin while the
    /// present that waits on it is still queued. An image is not handed out
    /// again until that present has consumed its semaphore.
    fn submit(&mut self, slot: &Self::Slot, image_index: u32) -> Result<()>;

    /// Present `image_index` once its render-finished semaphore is signaled.
    fn present(&mut self, slot: &Self::Slot, image_index: u32) -> Result<PresentOutcome>;

    /// Destroy a slot. Its fence must have been observed signaled.
    fn destroy_slot(&mut self, slot: Self::Slot);
}
