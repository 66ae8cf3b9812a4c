//! Startup configuration.

use std::time::Duration;

use ember_core::constants::{DEFAULT_HEIGHT, DEFAULT_WIDTH, FRAME_OVERLAP, GPU_TIMEOUT};

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Number of frame slots in flight.
    pub frames_in_flight: usize,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Bound on each wait for a slot's fence.
    pub fence_timeout: Duration,
    /// Bound on each swapchain image acquire.
    pub acquire_timeout: Duration,
    /// Extra acquire attempts after a timeout before giving up.
    pub acquire_retries: u32,
    /// Pause between acquire attempts.
    pub acquire_retry_backoff: Duration,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frames_in_flight: FRAME_OVERLAP,
            vsync: false,
            validation: cfg!(debug_assertions),
            fence_timeout: GPU_TIMEOUT,
            acquire_timeout: GPU_TIMEOUT,
            acquire_retries: 1,
            acquire_retry_backoff: Duration::from_millis(2),
            target_fps: None,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the number of frame slots in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set both GPU wait bounds.
    pub fn with_timeouts(mut self, fence: Duration, acquire: Duration) -> Self {
        self.fence_timeout = fence;
        self.acquire_timeout = acquire;
        self
    }

    /// Set how often a timed-out acquire is retried, and the pause between tries.
    pub fn with_acquire_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.acquire_retries = retries;
        self.acquire_retry_backoff = backoff;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Reject configurations the runner cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.width > 0 && self.height > 0,
            "window size must be non-zero, got {}x{}",
            self.width,
            self.height
        );
        anyhow::ensure!(
            self.frames_in_flight > 0,
            "at least one frame slot is required"
        );
        anyhow::ensure!(
            self.target_fps != Some(0),
            "target FPS must be positive"
        );
        Ok(())
    }

    /// The part of the configuration the frame loop consumes.
    pub fn frame_loop(&self) -> FrameLoopConfig {
        FrameLoopConfig {
            frames_in_flight: self.frames_in_flight,
            fence_timeout: self.fence_timeout,
            acquire_timeout: self.acquire_timeout,
            acquire_retries: self.acquire_retries,
            acquire_retry_backoff: self.acquire_retry_backoff,
        }
    }
}

/// Frame loop settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLoopConfig {
    pub frames_in_flight: usize,
    pub fence_timeout: Duration,
    pub acquire_timeout: Duration,
    pub acquire_retries: u32,
    pub acquire_retry_backoff: Duration,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        AppConfig::default().frame_loop()
    }
}

impl FrameLoopConfig {
    /// Default settings with `frames_in_flight` slots.
    pub fn with_slots(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_engine_constants() {
        let config = AppConfig::default();
        assert_eq!(config.frames_in_flight, FRAME_OVERLAP);
        assert_eq!(config.fence_timeout, Duration::from_secs(1));
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
        assert_eq!(config.acquire_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_slots() {
        let config = AppConfig::default().with_frames_in_flight(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_window() {
        let config = AppConfig::default().with_size(0, 720);
        assert!(config.validate().is_err());
    }

    #[test]
    fn frame_loop_config_mirrors_app_config() {
        let config = AppConfig::new("test")
            .with_frames_in_flight(3)
            .with_timeouts(Duration::from_millis(10), Duration::from_millis(20))
            .with_acquire_retries(0, Duration::ZERO);

        let frame_loop = config.frame_loop();
        assert_eq!(frame_loop.frames_in_flight, 3);
        assert_eq!(frame_loop.fence_timeout, Duration::from_millis(10));
        assert_eq!(frame_loop.acquire_timeout, Duration::from_millis(20));
        assert_eq!(frame_loop.acquire_retries, 0);
    }
}
