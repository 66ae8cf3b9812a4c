//! The per-tick frame protocol.
//!
//! Every tick runs, in order: wait on the slot's fence, reset its command
//! buffer, acquire an image, reset the fence, record, submit, present and
//! advance the frame counter. The fence wait is what keeps the CPU from
//! touching a slot the GPU is still executing; with one slot this makes CPU
//! and GPU strictly serial, with `k` slots the CPU runs up to `k - 1` ticks
//! ahead.

use ember_gpu::{AcquireOutcome, PresentOutcome, Result};
use ember_render::{record_batch, BindStats, CommandRecorder, DrawBatch};
use glam::Mat4;
use tracing::{debug, trace_span, warn};

use crate::backend::FrameBackend;
use crate::config::FrameLoopConfig;
use crate::slots::FrameSlotPool;

/// Step at which a tick found the swapchain out of date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStage {
    Acquire,
    Present,
}

/// What a completed tick produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Counter value the tick ran with.
    pub frame_number: u64,
    pub slot: usize,
    pub image_index: u32,
    /// Acquire or present reported a swapchain that no longer matches the
    /// surface exactly.
    pub suboptimal: bool,
    pub binds: BindStats,
}

/// Result of one tick that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Presented(FrameReport),
    /// The swapchain must be rebuilt before drawing again.
    ///
    /// At [`FrameStage::Acquire`] nothing was submitted, the slot's fence is
    /// still signaled and the counter did not advance. At
    /// [`FrameStage::Present`] the work was submitted and the counter advanced.
    SwapchainOutOfDate(FrameStage),
}

/// Why [`FrameLoop::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    QuitRequested,
    SwapchainOutOfDate(FrameStage),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks that reached presentation.
    pub frames: u64,
    pub stop: StopReason,
}

/// Drives the frame protocol over a pool of slots.
pub struct FrameLoop<S> {
    pool: FrameSlotPool<S>,
    config: FrameLoopConfig,
    frame_number: u64,
}

impl<S> FrameLoop<S> {
    /// Create the slot pool and start the counter at zero.
    pub fn new<B>(backend: &mut B, config: FrameLoopConfig) -> Result<Self>
    where
        B: FrameBackend<Slot = S>,
    {
        let pool = FrameSlotPool::create(backend, config.frames_in_flight)?;
        tracing::info!(
            "Frame loop ready: {} slots over {} images",
            pool.len(),
            backend.image_count()
        );
        Ok(Self {
            pool,
            config,
            frame_number: 0,
        })
    }

    /// Completed ticks so far; also the number of the next tick.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn slot_count(&self) -> usize {
        self.pool.len()
    }

    pub fn config(&self) -> &FrameLoopConfig {
        &self.config
    }

    /// Run one tick, drawing `batch` with `view_projection`.
    ///
    /// Errors are fatal: a fence wait or acquire that timed out (after the
    /// configured retries) or any other failed GPU call.
    pub fn tick<B>(
        &mut self,
        backend: &mut B,
        batch: &DrawBatch,
        view_projection: &Mat4,
    ) -> Result<TickOutcome>
    where
        B: FrameBackend<Slot = S>,
    {
        let frame_number = self.frame_number;
        let slot_index = self.pool.index_for(frame_number)?;
        let slot = self.pool.slot_for(frame_number)?;

        let _span = trace_span!("frame", frame_number, slot = slot_index).entered();

        backend.wait_for_slot(slot, self.config.fence_timeout)?;
        backend.reset_commands(slot)?;

        let (image_index, acquire_suboptimal) = match self.acquire(backend, slot)? {
            AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                warn!("Swapchain out of date at acquire (frame {frame_number})");
                return Ok(TickOutcome::SwapchainOutOfDate(FrameStage::Acquire));
            }
        };

        // Only reset once an image is in hand, so an early return above leaves
        // the fence signaled for the next wait
        backend.reset_fence(slot)?;

        let mut binds = BindStats::default();
        backend.record(slot, image_index, &mut |recorder: &mut dyn CommandRecorder| {
            binds = record_batch(recorder, batch, view_projection)?;
            Ok(())
        })?;

        backend.submit(slot, image_index)?;
        let presented = backend.present(slot, image_index)?;

        self.frame_number += 1;

        let suboptimal = match presented {
            PresentOutcome::Presented => acquire_suboptimal,
            PresentOutcome::Suboptimal => true,
            PresentOutcome::OutOfDate => {
                warn!("Swapchain out of date at present (frame {frame_number})");
                return Ok(TickOutcome::SwapchainOutOfDate(FrameStage::Present));
            }
        };
        if suboptimal {
            debug!("Swapchain suboptimal (frame {frame_number})");
        }

        Ok(TickOutcome::Presented(FrameReport {
            frame_number,
            slot: slot_index,
            image_index,
            suboptimal,
            binds,
        }))
    }

    /// Tick until `quit_requested` returns true or the swapchain goes out of
    /// date. The predicate is polled once before every tick, never during one.
    pub fn run<B, Q, V>(
        &mut self,
        backend: &mut B,
        batch: &DrawBatch,
        mut quit_requested: Q,
        mut view_projection_for: V,
    ) -> Result<RunSummary>
    where
        B: FrameBackend<Slot = S>,
        Q: FnMut() -> bool,
        V: FnMut(u64) -> Mat4,
    {
        let mut frames = 0;
        loop {
            if quit_requested() {
                return Ok(RunSummary {
                    frames,
                    stop: StopReason::QuitRequested,
                });
            }

            let view_projection = view_projection_for(self.frame_number);
            match self.tick(backend, batch, &view_projection)? {
                TickOutcome::Presented(_) => frames += 1,
                TickOutcome::SwapchainOutOfDate(stage) => {
                    return Ok(RunSummary {
                        frames,
                        stop: StopReason::SwapchainOutOfDate(stage),
                    });
                }
            }
        }
    }

    /// Wait for every slot to go idle and destroy the pool. Ticking afterwards
    /// fails with an invalid-state error.
    pub fn shutdown<B>(&mut self, backend: &mut B) -> Result<()>
    where
        B: FrameBackend<Slot = S>,
    {
        self.pool.destroy(backend, self.config.fence_timeout)?;
        debug!("Frame loop shut down after {} frames", self.frame_number);
        Ok(())
    }

    fn acquire<B>(&self, backend: &mut B, slot: &S) -> Result<AcquireOutcome>
    where
        B: FrameBackend<Slot = S>,
    {
        let mut attempt = 0;
        loop {
            match backend.acquire_image(slot, self.config.acquire_timeout) {
                Err(e) if e.is_timeout() && attempt < self.config.acquire_retries => {
                    attempt += 1;
                    warn!(
                        "{e}; retrying ({attempt}/{})",
                        self.config.acquire_retries
                    );
                    std::thread::sleep(self.config.acquire_retry_backoff);
                }
                result => return result,
            }
        }
    }
}
