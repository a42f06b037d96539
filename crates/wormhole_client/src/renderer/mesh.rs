use std::f32::consts::TAU;
use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wormhole_shared::level::{Axis, EligibleFace, FaceFlags, Level};
use wormhole_shared::portal::Portal;

pub const PORTAL_SEGMENTS: u32 = 48;
/// Outer edge of the rim relative to the opening's half extents.
pub const RIM_OUTER_SCALE: f32 = 1.12;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable, PartialEq)]
pub struct LevelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

impl LevelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<LevelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (2 * mem::size_of::<[f32; 3]>()) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Portal geometry lives in a unit space scaled by `portal_model_matrix`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct PortalVertex {
    pub position: [f32; 3],
}

impl PortalVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<PortalVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MeshData<V> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
}

/// Index-buffered mesh resident on the GPU.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload<V: Pod>(device: &wgpu::Device, label: &str, mesh: &MeshData<V>) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.index_count == 0 {
            return;
        }
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

fn face_color(face: &EligibleFace) -> [f32; 3] {
    let base = match face.axis {
        Axis::Y if face.facing_positive => [0.42, 0.40, 0.37],
        Axis::Y => [0.78, 0.78, 0.80],
        Axis::X => [0.70, 0.72, 0.74],
        Axis::Z => [0.64, 0.66, 0.69],
    };
    if face.flags.contains(FaceFlags::NO_PORTAL) {
        return [base[0] * 0.5, base[1] * 0.5, base[2] * 0.5];
    }
    // Tint alternate rooms so the far side of a portal is recognisable.
    let tint = if face.room % 2 == 0 { [1.0, 0.96, 0.92] } else { [0.90, 0.95, 1.0] };
    [base[0] * tint[0], base[1] * tint[1], base[2] * tint[2]]
}

/// Two triangles per drawn face, wound counter-clockwise from inside the room.
pub fn build_level_mesh(level: &Level) -> MeshData<LevelVertex> {
    let mut mesh = MeshData::default();
    for face in level.faces().iter().filter(|face| face.is_drawn()) {
        let base = mesh.vertices.len() as u32;
        let normal = face.normal().to_array();
        let color = face_color(face);
        for corner in face.corners() {
            mesh.vertices.push(LevelVertex {
                position: corner.to_array(),
                normal,
                color,
            });
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

fn ellipse_point(segment: u32, segments: u32, scale: f32) -> [f32; 3] {
    let angle = segment as f32 / segments as f32 * TAU;
    [angle.cos() * scale, angle.sin() * scale, 0.0]
}

/// Filled ellipse fan in the unit square, facing +Z.
pub fn build_opening_mesh(segments: u32) -> MeshData<PortalVertex> {
    let segments = segments.max(3);
    let mut mesh = MeshData {
        vertices: vec![PortalVertex {
            position: [0.0, 0.0, 0.0],
        }],
        indices: Vec::with_capacity(segments as usize * 3),
    };
    for segment in 0..segments {
        mesh.vertices.push(PortalVertex {
            position: ellipse_point(segment, segments, 1.0),
        });
    }
    for segment in 0..segments {
        let current = 1 + segment;
        let next = 1 + (segment + 1) % segments;
        mesh.indices.extend_from_slice(&[0, current, next]);
    }
    mesh
}

/// Band between the opening's edge and `outer`, facing +Z. Leaves the interior uncovered.
pub fn build_ring_mesh(segments: u32, outer: f32) -> MeshData<PortalVertex> {
    let segments = segments.max(3);
    let mut mesh = MeshData {
        vertices: Vec::with_capacity(segments as usize * 2),
        indices: Vec::with_capacity(segments as usize * 6),
    };
    for segment in 0..segments {
        mesh.vertices.push(PortalVertex {
            position: ellipse_point(segment, segments, 1.0),
        });
        mesh.vertices.push(PortalVertex {
            position: ellipse_point(segment, segments, outer),
        });
    }
    for segment in 0..segments {
        let inner = segment * 2;
        let outer_index = inner + 1;
        let next_inner = ((segment + 1) % segments) * 2;
        let next_outer = next_inner + 1;
        mesh.indices.extend_from_slice(&[
            inner,
            outer_index,
            next_outer,
            inner,
            next_outer,
            next_inner,
        ]);
    }
    mesh
}

/// Unit space to world: x along `right`, y along `up`, both scaled to the half extents.
pub fn portal_model_matrix(portal: &Portal) -> Mat4 {
    let right = portal.right * portal.half_extents.x.max(0.001);
    let up = portal.up * portal.half_extents.y.max(0.001);
    Mat4::from_cols(
        right.extend(0.0),
        up.extend(0.0),
        portal.normal.extend(0.0),
        portal.center.extend(1.0),
    )
}
