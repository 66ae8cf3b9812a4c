//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ember_gpu::{FrameSlot, GpuContextBuilder};
use raw_window_handle::HasDisplayHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::EmberApp;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::frame_loop::{FrameLoop, TickOutcome};
use crate::vulkan::VulkanBackend;

/// Run an EmberApp with the given configuration.
///
/// This function initializes logging, creates the window and GPU context,
/// and runs the event loop until the window closes, the swapchain goes out of
/// date, or a fatal GPU error occurs. The last case is returned as an error.
pub fn run_app<A: EmberApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    // Keep an already installed subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    config.validate()?;

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        fatal: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: EmberApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// First unrecoverable error; ends the event loop.
    fatal: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: EmberApp> {
    ctx: AppContext,
    app: A,
    frame_loop: FrameLoop<FrameSlot>,
    target_frame_time: Option<Duration>,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl<A: EmberApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.stop(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame() {
                    Ok(TickOutcome::Presented(_)) => state.ctx.window.request_redraw(),
                    Ok(TickOutcome::SwapchainOutOfDate(stage)) => {
                        warn!("Swapchain out of date at {stage:?}, exiting");
                        self.stop(event_loop);
                    }
                    Err(e) => {
                        error!("Render error: {e:#}");
                        self.fatal = Some(e);
                        self.stop(event_loop);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: EmberApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        // Recreation is unsupported, so the surface must not change size
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .display(window.display_handle()?.as_raw())
            .build()?;

        info!("GPU: {}", gpu.device_name());

        // SAFETY: The window is kept alive by the context
        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        let mut app = match A::init(&mut ctx) {
            Ok(app) => app,
            Err(e) => {
                release_context(&mut ctx);
                return Err(e);
            }
        };

        let created = {
            // SAFETY: The context outlives the frame loop's slots
            let mut backend = unsafe { VulkanBackend::new(&ctx) };
            FrameLoop::new(&mut backend, self.config.frame_loop())
        };
        let frame_loop = match created {
            Ok(frame_loop) => frame_loop,
            Err(e) => {
                app.cleanup(&mut ctx);
                release_context(&mut ctx);
                return Err(e.into());
            }
        };

        info!(
            "Registered {} pipelines and {} meshes",
            ctx.resources.pipeline_count(),
            ctx.resources.mesh_count()
        );

        let target_frame_time = self
            .config
            .target_fps
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)));

        Ok(AppState {
            ctx,
            app,
            frame_loop,
            target_frame_time,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            if let Err(e) = state.cleanup() {
                error!("Cleanup failed: {e:#}");
                if self.fatal.is_none() {
                    self.fatal = Some(e);
                }
            }
        }
        event_loop.exit();
    }
}

/// What the rest of shutdown may touch once the frame loop has let go of its
/// slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Teardown {
    /// Every slot was seen idle; release the context in order.
    Release,
    /// A fence never signaled. Any further device call may block forever, so
    /// the context is leaked instead.
    Abandon,
}

impl Teardown {
    fn after(shutdown: &ember_gpu::Result<()>) -> Self {
        match shutdown {
            Err(e) if e.is_timeout() => Self::Abandon,
            _ => Self::Release,
        }
    }
}

fn release_context(ctx: &mut AppContext) {
    if let Err(e) = ctx.gpu.wait_idle() {
        error!("Failed to wait idle: {e}");
    }
    // SAFETY: The device is idle and no slots exist yet
    unsafe { ctx.cleanup() };
}

impl<A: EmberApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<TickOutcome> {
        let frame_start = Instant::now();
        let frame_number = self.frame_loop.frame_number();

        // Calculate delta time
        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;

        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }

        self.app.update(&self.ctx, frame_number, dt);

        let view_projection = self.app.view_projection(&self.ctx, frame_number);
        // SAFETY: The context outlives the frame loop's slots
        let mut backend = unsafe { VulkanBackend::new(&self.ctx) };
        let outcome = self
            .frame_loop
            .tick(&mut backend, self.app.draw_batch(), &view_projection)?;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(outcome)
    }

    fn cleanup(mut self) -> anyhow::Result<()> {
        let frames = self.frame_loop.frame_number();
        if frames > 0 {
            let avg_fps = self.fps_sum / frames as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {frames}");
        }

        info!("Starting cleanup...");

        // Slots are only destroyed once their fences are observed signaled
        let shutdown = {
            // SAFETY: The context is still alive
            let mut backend = unsafe { VulkanBackend::new(&self.ctx) };
            self.frame_loop.shutdown(&mut backend)
        };

        if Teardown::after(&shutdown) == Teardown::Abandon {
            error!("GPU did not go idle, leaking the device instead of waiting on it");
            // GpuContext::drop would wait idle without a bound
            std::mem::forget(self);
            return shutdown.map_err(Into::into);
        }

        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // Let the app cleanup first
        self.app.cleanup(&mut self.ctx);

        // SAFETY: The device is idle
        unsafe { self.ctx.cleanup() };

        info!("Cleanup complete");
        shutdown.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use ember_gpu::GpuError;
    use ember_render::DrawBatch;
    use glam::Mat4;

    use crate::config::FrameLoopConfig;
    use crate::mock::{Event, MockBackend};

    fn short_timeouts() -> FrameLoopConfig {
        FrameLoopConfig {
            frames_in_flight: 2,
            fence_timeout: Duration::from_millis(30),
            acquire_timeout: Duration::from_millis(30),
            acquire_retries: 0,
            acquire_retry_backoff: Duration::ZERO,
        }
    }

    fn shut_down_after_one_frame(backend: &mut MockBackend) -> ember_gpu::Result<()> {
        let mut frame_loop = FrameLoop::new(backend, short_timeouts()).unwrap();
        frame_loop
            .tick(backend, &DrawBatch::new(), &Mat4::IDENTITY)
            .unwrap();
        frame_loop.shutdown(backend)
    }

    #[test]
    fn hung_gpu_abandons_the_context() {
        let mut backend = MockBackend::new(2);
        backend.hang_gpu();

        let shutdown = shut_down_after_one_frame(&mut backend);

        assert_eq!(Teardown::after(&shutdown), Teardown::Abandon);
        assert!(!backend
            .events()
            .iter()
            .any(|e| matches!(e, Event::DestroySlot(_))));
    }

    #[test]
    fn idle_gpu_releases_the_context() {
        let mut backend = MockBackend::new(2);

        let shutdown = shut_down_after_one_frame(&mut backend);

        assert!(shutdown.is_ok());
        assert_eq!(Teardown::after(&shutdown), Teardown::Release);
    }

    #[test]
    fn lost_device_still_releases() {
        // A lost device fails fast, so waiting on it cannot hang
        let lost = Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(Teardown::after(&lost), Teardown::Release);
    }
}
