//! Fixed-size pool of frame slots.

use std::time::Duration;

use ember_gpu::{GpuError, Result};

use crate::backend::FrameBackend;

/// Owns every slot the frame loop cycles through. Slot `i` serves the ticks
/// whose number is congruent to `i` modulo the pool size.
#[derive(Debug)]
pub struct FrameSlotPool<S> {
    slots: Vec<S>,
}

impl<S> FrameSlotPool<S> {
    /// Create `count` slots.
    ///
    /// `count` must lie in `1..=image_count`. More slots than images would let
    /// two in-flight submissions target the same image.
    pub fn create<B>(backend: &mut B, count: usize) -> Result<Self>
    where
        B: FrameBackend<Slot = S>,
    {
        let image_count = backend.image_count();
        if count == 0 {
            return Err(GpuError::InvalidState(
                "frame slot pool needs at least one slot".to_string(),
            ));
        }
        if count > image_count {
            return Err(GpuError::InvalidState(format!(
                "{count} frame slots exceed the {image_count} swapchain images"
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.create_slot() {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    // Fresh slots were never submitted, so they are idle
                    for slot in slots {
                        backend.destroy_slot(slot);
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!("Created {count} frame slots for {image_count} images");
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot index serving `tick`.
    pub fn index_for(&self, tick: u64) -> Result<usize> {
        if self.slots.is_empty() {
            return Err(GpuError::InvalidState(
                "frame slot pool has been destroyed".to_string(),
            ));
        }
        Ok((tick % self.slots.len() as u64) as usize)
    }

    /// Slot serving `tick`.
    pub fn slot_for(&self, tick: u64) -> Result<&S> {
        let index = self.index_for(tick)?;
        Ok(&self.slots[index])
    }

    /// Wait for every slot's outstanding work, then destroy all of them.
    ///
    /// If any wait fails nothing is destroyed and the error is returned, since
    /// the GPU may still reference the slots.
    pub fn destroy<B>(&mut self, backend: &mut B, timeout: Duration) -> Result<()>
    where
        B: FrameBackend<Slot = S>,
    {
        for slot in &self.slots {
            backend.wait_for_slot(slot, timeout)?;
        }
        for slot in self.slots.drain(..) {
            backend.destroy_slot(slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, MockBackend};

    #[test]
    fn slot_index_wraps_with_tick() {
        let mut backend = MockBackend::new(3);
        let pool = FrameSlotPool::create(&mut backend, 3).unwrap();

        let indices: Vec<usize> = (0..7).map(|t| pool.index_for(t).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(pool.slot_for(4).unwrap().id, 1);
    }

    #[test]
    fn fresh_slots_start_signaled() {
        let mut backend = MockBackend::new(2);
        let _pool = FrameSlotPool::create(&mut backend, 2).unwrap();

        assert!(backend.fence_signaled(0));
        assert!(backend.fence_signaled(1));
    }

    #[test]
    fn rejects_more_slots_than_images() {
        let mut backend = MockBackend::new(2);
        let err = FrameSlotPool::create(&mut backend, 3).unwrap_err();

        assert!(matches!(err, GpuError::InvalidState(_)));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn rejects_zero_slots() {
        let mut backend = MockBackend::new(2);
        let err = FrameSlotPool::create(&mut backend, 0).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
    }

    #[test]
    fn failed_creation_releases_earlier_slots() {
        let mut backend = MockBackend::new(3);
        backend.fail_slot_creation_after(2);

        assert!(FrameSlotPool::create(&mut backend, 3).is_err());
        assert_eq!(
            backend.events(),
            &[
                Event::CreateSlot(0),
                Event::CreateSlot(1),
                Event::DestroySlot(0),
                Event::DestroySlot(1),
            ]
        );
    }

    #[test]
    fn destroy_waits_on_every_slot_first() {
        let mut backend = MockBackend::new(2);
        let mut pool = FrameSlotPool::create(&mut backend, 2).unwrap();
        backend.clear_events();

        pool.destroy(&mut backend, Duration::from_millis(50)).unwrap();

        assert_eq!(
            backend.events(),
            &[
                Event::Wait(0),
                Event::Wait(1),
                Event::DestroySlot(0),
                Event::DestroySlot(1),
            ]
        );
        assert!(pool.is_empty());
        assert!(pool.slot_for(0).is_err());
    }
}
