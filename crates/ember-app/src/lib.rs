//! Frame loop and application framework for the Ember renderer.
//!
//! The core is the per-tick frame protocol in [`FrameLoop`]: a fixed pool of
//! frame slots, each guarded by a fence, driven through the [`FrameBackend`]
//! seam. [`VulkanBackend`] runs it on a real device.
//!
//! Around it sits a trait-based application framework that handles:
//! - Window creation and management
//! - GPU context, surface, swapchain and render pass initialization
//! - Event loop handling and orderly shutdown
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig, AppContext, EmberApp};
//! use ember_render::DrawBatch;
//! use glam::Mat4;
//!
//! struct MyApp {
//!     batch: DrawBatch,
//! }
//!
//! impl EmberApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp { batch: DrawBatch::new() })
//!     }
//!
//!     fn draw_batch(&self) -> &DrawBatch {
//!         &self.batch
//!     }
//!
//!     fn view_projection(&self, _ctx: &AppContext, _frame_number: u64) -> Mat4 {
//!         Mat4::IDENTITY
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod backend;
mod config;
mod context;
mod frame_loop;
#[cfg(test)]
mod mock;
mod runner;
mod slots;
mod vulkan;

pub use app::EmberApp;
pub use backend::{FrameBackend, RecordCommands};
pub use config::{AppConfig, FrameLoopConfig};
pub use context::AppContext;
pub use frame_loop::{FrameLoop, FrameReport, FrameStage, RunSummary, StopReason, TickOutcome};
pub use runner::run_app;
pub use slots::FrameSlotPool;
pub use vulkan::VulkanBackend;

// Re-export commonly used types for convenience
pub use ember_gpu::{GpuContext, GpuContextBuilder};
pub use ember_render::Camera;
pub use winit::event::WindowEvent;
