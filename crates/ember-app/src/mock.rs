//! Scripted [`FrameBackend`] for exercising the frame protocol without a GPU.
//!
//! Fences live behind a mutex and condvar shared with simulated GPU work, so a
//! wait on a fence nobody signals really blocks until its timeout. Every call
//! is logged, and calls that break the protocol are collected as violations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use ember_core::{MaterialHandle, MeshHandle};
use ember_gpu::{AcquireOutcome, GpuError, PresentOutcome, Result};
use ember_render::CommandRecorder;
use glam::Mat4;
use parking_lot::{Condvar, Mutex};

use crate::backend::{FrameBackend, RecordCommands};

#[derive(Debug)]
pub struct MockSlot {
    pub id: usize,
}

/// Scripted result of one acquire call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStep {
    Image,
    Suboptimal,
    OutOfDate,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CreateSlot(usize),
    Wait(usize),
    WaitTimedOut(usize),
    ResetCommands(usize),
    Acquire(usize),
    ResetFence(usize),
    BeginRecord { slot: usize, image: u32 },
    EndRecord(usize),
    Submit { slot: usize, image: u32 },
    Present { slot: usize, image: u32 },
    DestroySlot(usize),
}

type Fences = Arc<(Mutex<Vec<bool>>, Condvar)>;

pub struct MockBackend {
    image_count: usize,
    fences: Fences,
    /// Submitted, and not yet seen complete by a fence wait.
    in_flight: Vec<bool>,
    observed_completions: usize,
    gpu_latency: Option<Duration>,
    hung: bool,
    next_image: u32,
    acquire_script: VecDeque<AcquireStep>,
    present_script: VecDeque<PresentOutcome>,
    submit_error: Option<vk::Result>,
    fail_draws: bool,
    slot_limit: Option<usize>,
    quit_on_record: Option<(usize, Arc<AtomicBool>)>,
    records: usize,
    recording: Option<usize>,
    /// Slot and image of the last recording.
    recorded: Option<(usize, u32)>,
    pushed: Vec<Mat4>,
    events: Vec<Event>,
    violations: Vec<String>,
}

impl MockBackend {
    /// A healthy backend whose GPU finishes each submission instantly.
    pub fn new(image_count: usize) -> Self {
        Self {
            image_count,
            fences: Arc::new((Mutex::new(Vec::new()), Condvar::new())),
            in_flight: Vec::new(),
            observed_completions: 0,
            gpu_latency: None,
            hung: false,
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            submit_error: None,
            fail_draws: false,
            slot_limit: None,
            quit_on_record: None,
            records: 0,
            recording: None,
            recorded: None,
            pushed: Vec::new(),
            events: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// Complete each later submission on a worker thread after `latency`.
    pub fn set_gpu_latency(&mut self, latency: Duration) {
        self.gpu_latency = Some(latency);
    }

    /// Never complete later submissions.
    pub fn hang_gpu(&mut self) {
        self.hung = true;
    }

    /// Results for the next acquires; afterwards images are handed out in turn.
    pub fn script_acquire(&mut self, steps: impl IntoIterator<Item = AcquireStep>) {
        self.acquire_script.extend(steps);
    }

    /// Results for the next presents; afterwards every present succeeds.
    pub fn script_present(&mut self, outcomes: impl IntoIterator<Item = PresentOutcome>) {
        self.present_script.extend(outcomes);
    }

    pub fn fail_submit(&mut self, result: vk::Result) {
        self.submit_error = Some(result);
    }

    /// Make every draw command fail.
    pub fn fail_draws(&mut self) {
        self.fail_draws = true;
    }

    /// Fail slot creation once `count` slots exist.
    pub fn fail_slot_creation_after(&mut self, count: usize) {
        self.slot_limit = Some(count);
    }

    /// Raise `flag` when the `record_index`-th recording (from zero) begins.
    pub fn set_quit_on_record(&mut self, record_index: usize, flag: Arc<AtomicBool>) {
        self.quit_on_record = Some((record_index, flag));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Slot of every successful fence wait, in order.
    pub fn waited_slots(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect()
    }

    /// Fence waits that observed a finished submission.
    pub fn observed_completions(&self) -> usize {
        self.observed_completions
    }

    pub fn fence_signaled(&self, slot: usize) -> bool {
        self.fences.0.lock()[slot]
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Every transform pushed, across all ticks.
    pub fn pushed_transforms(&self) -> Vec<Mat4> {
        self.pushed.clone()
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn complete_submission(&self, slot: usize) {
        if self.hung {
            return;
        }

        let fences = Arc::clone(&self.fences);
        let signal = move || {
            let (lock, condvar) = &*fences;
            lock.lock()[slot] = true;
            condvar.notify_all();
        };

        match self.gpu_latency {
            Some(latency) => {
                thread::spawn(move || {
                    thread::sleep(latency);
                    signal();
                });
            }
            None => signal(),
        }
    }
}

impl FrameBackend for MockBackend {
    type Slot = MockSlot;

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn create_slot(&mut self) -> Result<MockSlot> {
        let id = self.in_flight.len();
        if self.slot_limit.is_some_and(|limit| id >= limit) {
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }

        self.fences.0.lock().push(true);
        self.in_flight.push(false);
        self.events.push(Event::CreateSlot(id));
        Ok(MockSlot { id })
    }

    fn wait_for_slot(&mut self, slot: &MockSlot, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let signaled = {
            let (lock, condvar) = &*self.fences;
            let mut fences = lock.lock();
            while !fences[slot.id] {
                if condvar.wait_until(&mut fences, deadline).timed_out() {
                    break;
                }
            }
            fences[slot.id]
        };

        if !signaled {
            self.events.push(Event::WaitTimedOut(slot.id));
            return Err(GpuError::Timeout {
                operation: "fence wait",
                timeout,
            });
        }

        if self.in_flight[slot.id] {
            self.in_flight[slot.id] = false;
            self.observed_completions += 1;
        }
        self.events.push(Event::Wait(slot.id));
        Ok(())
    }

    fn reset_commands(&mut self, slot: &MockSlot) -> Result<()> {
        if self.in_flight[slot.id] {
            self.violation(format!("slot {} commands reset while in flight", slot.id));
        }
        self.events.push(Event::ResetCommands(slot.id));
        Ok(())
    }

    fn acquire_image(&mut self, slot: &MockSlot, timeout: Duration) -> Result<AcquireOutcome> {
        self.events.push(Event::Acquire(slot.id));

        let suboptimal = match self.acquire_script.pop_front().unwrap_or(AcquireStep::Image) {
            AcquireStep::Image => false,
            AcquireStep::Suboptimal => true,
            AcquireStep::OutOfDate => return Ok(AcquireOutcome::OutOfDate),
            AcquireStep::Timeout => {
                return Err(GpuError::Timeout {
                    operation: "swapchain acquire",
                    timeout,
                })
            }
        };

        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok(AcquireOutcome::Acquired { index, suboptimal })
    }

    fn reset_fence(&mut self, slot: &MockSlot) -> Result<()> {
        let was_signaled = std::mem::replace(&mut self.fences.0.lock()[slot.id], false);
        if !was_signaled {
            self.violation(format!("slot {} fence reset while unsignaled", slot.id));
        }
        self.events.push(Event::ResetFence(slot.id));
        Ok(())
    }

    fn record(
        &mut self,
        slot: &MockSlot,
        image_index: u32,
        commands: &mut RecordCommands<'_>,
    ) -> Result<()> {
        if self.in_flight[slot.id] {
            self.violation(format!("slot {} recorded while in flight", slot.id));
        }
        if let Some(other) = self.recording {
            self.violation(format!("slot {} recorded while slot {other} records", slot.id));
        }

        if let Some((index, flag)) = &self.quit_on_record {
            if *index == self.records {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.records += 1;

        self.recording = Some(slot.id);
        self.recorded = Some((slot.id, image_index));
        self.events.push(Event::BeginRecord {
            slot: slot.id,
            image: image_index,
        });

        let result = commands(&mut MockRecorder {
            pushed: &mut self.pushed,
            fail_draws: self.fail_draws,
        });

        self.events.push(Event::EndRecord(slot.id));
        self.recording = None;
        result
    }

    fn submit(&mut self, slot: &MockSlot, image_index: u32) -> Result<()> {
        if let Some(result) = self.submit_error {
            return Err(result.into());
        }
        if self.fence_signaled(slot.id) {
            self.violation(format!("slot {} submitted with a signaled fence", slot.id));
        }
        if self.recording.is_some() {
            self.violation(format!("slot {} submitted mid-recording", slot.id));
        }

        if self.recorded != Some((slot.id, image_index)) {
            self.violation(format!(
                "slot {} submitted for image {image_index}, recorded {:?}",
                slot.id, self.recorded
            ));
        }

        self.in_flight[slot.id] = true;
        self.events.push(Event::Submit {
            slot: slot.id,
            image: image_index,
        });
        self.complete_submission(slot.id);
        Ok(())
    }

    fn present(&mut self, slot: &MockSlot, image_index: u32) -> Result<PresentOutcome> {
        self.events.push(Event::Present {
            slot: slot.id,
            image: image_index,
        });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn destroy_slot(&mut self, slot: MockSlot) {
        if !self.fence_signaled(slot.id) {
            self.violation(format!("slot {} destroyed with GPU work pending", slot.id));
        }
        if self.recording == Some(slot.id) {
            self.violation(format!("slot {} destroyed mid-recording", slot.id));
        }
        self.events.push(Event::DestroySlot(slot.id));
    }
}

struct MockRecorder<'a> {
    pushed: &'a mut Vec<Mat4>,
    fail_draws: bool,
}

impl CommandRecorder for MockRecorder<'_> {
    fn bind_pipeline(&mut self, _material: MaterialHandle) -> Result<()> {
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, _mesh: MeshHandle) -> Result<()> {
        Ok(())
    }

    fn push_transform(&mut self, _material: MaterialHandle, transform: &Mat4) -> Result<()> {
        self.pushed.push(*transform);
        Ok(())
    }

    fn draw(&mut self, mesh: MeshHandle) -> Result<()> {
        if self.fail_draws {
            return Err(GpuError::ResourceNotFound(format!("{mesh:?}")));
        }
        Ok(())
    }
}
