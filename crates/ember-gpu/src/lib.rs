//! Vulkan abstraction layer for the Ember renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Surface and swapchain handling (with a depth buffer)
//! - Memory allocation via gpu-allocator
//! - Per-slot frame resources with scoped command recording
//! - Fence and semaphore helpers with bounded waits
//! - Render pass, framebuffer and graphics pipeline construction

pub mod context;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
pub use frame::FrameSlot;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use render_pass::RenderPass;
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireOutcome, DepthBuffer, PresentOutcome, Swapchain, SwapchainImage};
