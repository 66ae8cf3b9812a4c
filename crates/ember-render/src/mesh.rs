//! Vertex layout, CPU-side mesh data and GPU vertex buffers.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{GpuAllocator, GpuBuffer, GpuError, Result};
use glam::Vec3;

/// Vertex format shared by every mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            color,
        }
    }

    /// Single interleaved binding at slot 0.
    pub fn bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Locations 0, 1 and 2: position, normal, colour.
    pub fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        let field = std::mem::size_of::<[f32; 3]>() as u32;
        (0..3)
            .map(|location| vk::VertexInputAttributeDescription {
                location,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: location * field,
            })
            .collect()
    }
}

/// Non-indexed triangle-list geometry held on the CPU.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// One triangle standing on the XZ plane with red, green and blue corners.
    pub fn triangle() -> Self {
        let normal = [0.0, 0.0, 1.0];
        Self::new(vec![
            Vertex::new([0.5, 0.0, 0.0], normal, [1.0, 0.0, 0.0]),
            Vertex::new([-0.5, 0.0, 0.0], normal, [0.0, 1.0, 0.0]),
            Vertex::new([0.0, 1.0, 0.0], normal, [0.0, 0.0, 1.0]),
        ])
    }

    /// Unit cube centred on the origin with per-face normals.
    pub fn cube() -> Self {
        let faces = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

        let mut vertices = Vec::with_capacity(36);
        for normal in faces {
            // Two axes spanning the face
            let u = if normal.y.abs() > 0.5 { Vec3::X } else { Vec3::Y };
            let v = normal.cross(u);
            let center = normal * 0.5;

            let corners = [
                center - u * 0.5 - v * 0.5,
                center + u * 0.5 - v * 0.5,
                center + u * 0.5 + v * 0.5,
                center - u * 0.5 + v * 0.5,
            ];
            let color = (normal.abs() * 0.5 + Vec3::splat(0.5)).to_array();

            for index in [0, 1, 2, 0, 2, 3] {
                vertices.push(Vertex::new(
                    corners[index].to_array(),
                    normal.to_array(),
                    color,
                ));
            }
        }

        Self::new(vertices)
    }
}

/// Vertex buffer living in host-visible memory, written once at upload.
pub struct GpuMesh {
    pub buffer: GpuBuffer,
    pub vertex_count: u32,
}

impl GpuMesh {
    /// Copy `mesh` into a new vertex buffer.
    pub fn upload(allocator: &mut GpuAllocator, mesh: &MeshData, name: &str) -> Result<Self> {
        if mesh.vertices.is_empty() {
            return Err(GpuError::InvalidState(format!("Mesh {name} has no vertices")));
        }

        let buffer = allocator.upload_vertices(&mesh.vertices, name)?;

        tracing::debug!(
            "Uploaded mesh {name}: {} vertices, {} bytes",
            mesh.vertex_count(),
            buffer.len()
        );

        Ok(Self {
            buffer,
            vertex_count: mesh.vertex_count(),
        })
    }

    /// Free the vertex buffer.
    pub fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_three_packed_vec3s() {
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
        assert_eq!(Vertex::bindings()[0].stride, 36);

        let offsets: Vec<u32> = Vertex::attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn triangle_has_rgb_corners() {
        let triangle = MeshData::triangle();
        assert_eq!(triangle.vertex_count(), 3);
        assert_eq!(triangle.vertices[0].color, [1.0, 0.0, 0.0]);
        assert_eq!(triangle.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn cube_faces_point_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 36);

        for vertex in &cube.vertices {
            let position = Vec3::from_array(vertex.position);
            let normal = Vec3::from_array(vertex.normal);
            // Every vertex sits on the face its normal points out of
            assert!((position.dot(normal) - 0.5).abs() < 1e-6);
            assert!(position.abs().max_element() <= 0.5 + 1e-6);
        }
    }
}
