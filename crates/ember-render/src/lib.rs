//! Meshes, draw batches and command recording for the Ember renderer.
//!
//! This crate provides:
//! - Vertex layout and procedural mesh data
//! - Engine-owned pipeline and mesh tables addressed by typed handles
//! - Draw batches and the bind-minimizing batch recorder
//! - Camera and view management

pub mod camera;
pub mod drawable;
pub mod mesh;
pub mod push;
pub mod recorder;
pub mod resources;

pub use camera::Camera;
pub use drawable::{DrawBatch, Drawable};
pub use mesh::{GpuMesh, MeshData, Vertex};
pub use push::MeshPushConstants;
pub use recorder::{record_batch, BindStats, CommandRecorder, VulkanRecorder};
pub use resources::RenderResources;
