//! Ember Demo Viewer
//!
//! Draws a normal-shaded cube above a 50x50 grid of vertex-coloured triangles,
//! seen from a camera orbiting the Y axis by 0.2 degrees per frame.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--frames-in-flight <N>`: Frame slots in flight (default: 2)
//! - `--target-fps <N>`: Sleep between frames to cap the frame rate
//! - `--vsync`: Present with FIFO
//! - `--no-validation`: Disable Vulkan validation layers
//! - `--shader-dir <DIR>`: Directory holding the compiled SPIR-V shaders
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;
mod scene;

use ember_app::{run_app, AppConfig};

use crate::args::{ViewerArgs, DEFAULT_SHADER_DIR};
use crate::scene::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::from_env()?;
    if args.help {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(args.apply(AppConfig::new("Ember Viewer").with_size(WIDTH, HEIGHT)))
}

fn print_help() {
    eprintln!(
        "Ember Demo Viewer

USAGE:
    cargo run -p ember-viewer -- [OPTIONS]

OPTIONS:
    --frames-in-flight <N>  Frame slots in flight, at most the swapchain
                            image count (default: 2)
    --target-fps <N>        Cap the frame rate by sleeping between frames
    --vsync                 Present with FIFO
    --no-validation         Disable Vulkan validation layers
    --shader-dir <DIR>      Directory holding mesh.vert.spv, normal.frag.spv
                            and color.frag.spv
                            Default: {DEFAULT_SHADER_DIR}
    -h, --help              Print this help message

SHADERS:
    Compile the GLSL sources before the first run:
        cd apps/ember-viewer/shaders
        glslc mesh.vert -o mesh.vert.spv
        glslc normal.frag -o normal.frag.spv
        glslc color.frag -o color.frag.spv

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
