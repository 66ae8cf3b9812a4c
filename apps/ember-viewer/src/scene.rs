//! The demo scene: a normal-shaded cube above a grid of colour triangles.

use std::path::Path;

use anyhow::Context;
use ember_app::{AppContext, Camera, EmberApp};
use ember_core::{MaterialHandle, MeshHandle};
use ember_gpu::shader::load_spirv;
use ember_gpu::GraphicsPipelineConfig;
use ember_render::{DrawBatch, Drawable, MeshData, MeshPushConstants, Vertex};
use glam::{Mat4, Vec3};
use tracing::info;

use crate::args::ViewerArgs;

/// Triangles per grid row and column.
pub const GRID_SIZE: usize = 50;
/// Width and depth covered by the grid.
pub const GRID_SPAN: f32 = 25.0;
const TRIANGLE_SCALE: f32 = 0.25;
const CUBE_POSITION: Vec3 = Vec3::new(0.0, 1.5, 0.0);

/// Viewer application state.
pub struct Viewer {
    batch: DrawBatch,
    camera: Camera,
}

impl EmberApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = ViewerArgs::from_env()?;

        let vertex = load_shader(&args.shader_dir, "mesh.vert.spv")?;
        let normal = ctx.create_pipeline(&mesh_pipeline(
            vertex.clone(),
            load_shader(&args.shader_dir, "normal.frag.spv")?,
        ))?;
        let color = ctx.create_pipeline(&mesh_pipeline(
            vertex,
            load_shader(&args.shader_dir, "color.frag.spv")?,
        ))?;

        let triangle = ctx.upload_mesh(&MeshData::triangle(), "triangle")?;
        let cube = ctx.upload_mesh(&MeshData::cube(), "cube")?;

        let batch = build_scene(cube, normal, triangle, color);
        info!("Scene ready: {} drawables", batch.len());

        let mut camera = Camera::default();
        camera.set_viewport(ctx.width(), ctx.height());

        Ok(Self { batch, camera })
    }

    fn draw_batch(&self) -> &DrawBatch {
        &self.batch
    }

    fn view_projection(&self, _ctx: &AppContext, frame_number: u64) -> Mat4 {
        self.camera.orbit_view_projection(frame_number)
    }
}

fn load_shader(dir: &Path, name: &str) -> anyhow::Result<Vec<u32>> {
    load_spirv(dir.join(name)).with_context(|| {
        format!(
            "missing shader {name} in {} (compile shaders/*.vert|*.frag with glslc)",
            dir.display()
        )
    })
}

fn mesh_pipeline(vertex_shader: Vec<u32>, fragment_shader: Vec<u32>) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig {
        vertex_shader,
        fragment_shader,
        vertex_bindings: Vertex::bindings(),
        vertex_attributes: Vertex::attributes(),
        push_constant_ranges: vec![MeshPushConstants::range()],
        ..Default::default()
    }
}

/// The cube first, then the triangle grid row by row, so each material and
/// mesh is bound once per frame.
pub fn build_scene(
    cube: MeshHandle,
    normal: MaterialHandle,
    triangle: MeshHandle,
    color: MaterialHandle,
) -> DrawBatch {
    let mut batch = DrawBatch::new();
    batch.push(Drawable::new(cube, normal, Mat4::from_translation(CUBE_POSITION)));

    let step = GRID_SPAN / GRID_SIZE as f32;
    for i in 0..GRID_SIZE {
        let x = step * i as f32 - GRID_SPAN / 2.0;
        for j in 0..GRID_SIZE {
            let z = step * j as f32 - GRID_SPAN / 2.0;
            let model = Mat4::from_translation(Vec3::new(x, 0.0, z))
                * Mat4::from_scale(Vec3::splat(TRIANGLE_SCALE));
            batch.push(Drawable::new(triangle, color, model));
        }
    }

    batch
}
