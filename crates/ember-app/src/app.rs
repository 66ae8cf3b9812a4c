//! `EmberApp` trait definition.

use ember_render::DrawBatch;
use glam::Mat4;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// Trait for Ember applications.
///
/// The framework owns the window, the GPU context, the swapchain and the frame
/// loop. An application builds its pipelines and meshes in [`init`](Self::init)
/// and describes each frame as a [`DrawBatch`] plus a view-projection matrix.
pub trait EmberApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context, swapchain and render pass
    /// exist. Register pipelines and meshes through the context.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state before the tick numbered `frame_number`.
    ///
    /// # Arguments
    /// * `ctx` - Application context with GPU and window access
    /// * `frame_number` - Number of the tick about to run
    /// * `dt` - Delta time in seconds since last frame
    #[allow(unused_variables)]
    fn update(&mut self, ctx: &AppContext, frame_number: u64, dt: f32) {}

    /// Drawables to record this tick.
    fn draw_batch(&self) -> &DrawBatch;

    /// View-projection matrix for the tick numbered `frame_number`.
    fn view_projection(&self, ctx: &AppContext, frame_number: u64) -> Mat4;

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further. Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup before shutdown.
    ///
    /// Called with the GPU idle. Resources registered through the context are
    /// destroyed by the framework afterwards.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
