//! Command line options.

use std::path::PathBuf;

use anyhow::{bail, Context};
use ember_app::AppConfig;

/// Where the compiled shaders live unless `--shader-dir` says otherwise.
pub const DEFAULT_SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerArgs {
    pub frames_in_flight: Option<usize>,
    pub target_fps: Option<u32>,
    pub vsync: bool,
    pub no_validation: bool,
    pub shader_dir: PathBuf,
    pub help: bool,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            frames_in_flight: None,
            target_fps: None,
            vsync: false,
            no_validation: false,
            shader_dir: PathBuf::from(DEFAULT_SHADER_DIR),
            help: false,
        }
    }
}

impl ViewerArgs {
    /// Parse the process arguments.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse arguments, program name excluded.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--vsync" => parsed.vsync = true,
                "--no-validation" => parsed.no_validation = true,
                "--frames-in-flight" => {
                    let value = args.next().context("--frames-in-flight needs a value")?;
                    let frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count '{value}'"))?;
                    parsed.frames_in_flight = Some(frames);
                }
                "--target-fps" => {
                    let value = args.next().context("--target-fps needs a value")?;
                    let fps: u32 = value
                        .parse()
                        .with_context(|| format!("invalid frame rate '{value}'"))?;
                    if fps == 0 {
                        bail!("--target-fps must be positive");
                    }
                    parsed.target_fps = Some(fps);
                }
                "--shader-dir" => {
                    let value = args.next().context("--shader-dir needs a value")?;
                    parsed.shader_dir = PathBuf::from(value);
                }
                other => bail!("unknown option '{other}' (see --help)"),
            }
        }

        Ok(parsed)
    }

    /// Apply the flags on top of `config`.
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(frames) = self.frames_in_flight {
            config = config.with_frames_in_flight(frames);
        }
        if let Some(fps) = self.target_fps {
            config = config.with_target_fps(fps);
        }
        if self.vsync {
            config = config.with_vsync(true);
        }
        if self.no_validation {
            config = config.with_validation(false);
        }
        config
    }
}
