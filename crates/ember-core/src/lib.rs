//! Core types and constants for the Ember renderer.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Typed handles into the engine-owned mesh and material tables
//! - Engine-wide defaults (window extent, frame overlap, GPU timeouts)

pub mod handle;

pub use handle::{MaterialHandle, MeshHandle};

/// Engine-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default window width in pixels
    pub const DEFAULT_WIDTH: u32 = 1280;
    /// Default window height in pixels
    pub const DEFAULT_HEIGHT: u32 = 720;
    /// Default number of frame slots in flight
    pub const FRAME_OVERLAP: usize = 2;
    /// Upper bound for every blocking GPU wait (fence wait, image acquire)
    pub const GPU_TIMEOUT: Duration = Duration::from_secs(1);
}
