use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;
use wormhole_shared::compositor::{PortalGeometry, Stage};
use wormhole_shared::portal::{PortalPair, PortalSlot};

use crate::renderer::mesh::{
    build_opening_mesh, build_ring_mesh, portal_model_matrix, GpuMesh, PortalVertex,
    PORTAL_SEGMENTS, RIM_OUTER_SCALE,
};
use crate::renderer::pipeline::{color_writes, depth_stencil_state};

const PORTAL_ORANGE: [f32; 4] = [1.0, 165.0 / 255.0, 0.0, 1.0];
const PORTAL_BLUE: [f32; 4] = [0.0, 130.0 / 255.0, 1.0, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalParamsUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    /// x: 1.0 when linked.
    params: [f32; 4],
}

impl PortalParamsUniform {
    fn hidden(slot: PortalSlot) -> Self {
        Self {
            model: Mat4::ZERO.to_cols_array_2d(),
            color: portal_color(slot),
            params: [0.0; 4],
        }
    }
}

pub fn portal_color(slot: PortalSlot) -> [f32; 4] {
    match slot {
        PortalSlot::Orange => PORTAL_ORANGE,
        PortalSlot::Blue => PORTAL_BLUE,
    }
}

#[derive(Debug)]
struct PortalPipelines {
    mark: wgpu::RenderPipeline,
    prime: wgpu::RenderPipeline,
    overlay: wgpu::RenderPipeline,
}

#[derive(Debug)]
pub struct PortalRenderer {
    pipelines: PortalPipelines,
    params_buffers: [wgpu::Buffer; 2],
    params_bind_groups: [wgpu::BindGroup; 2],
    opening_mesh: GpuMesh,
    ring_mesh: GpuMesh,
}

impl PortalRenderer {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal.wgsl"
                ))
                .into(),
            ),
        });

        let params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Params Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let params_buffers: [wgpu::Buffer; 2] = std::array::from_fn(|index| {
            let slot = PortalSlot::ALL[index];
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match slot {
                    PortalSlot::Orange => "Portal Params Buffer Orange",
                    PortalSlot::Blue => "Portal Params Buffer Blue",
                }),
                contents: bytemuck::bytes_of(&PortalParamsUniform::hidden(slot)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        });

        let params_bind_groups = std::array::from_fn(|index| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(match PortalSlot::ALL[index] {
                    PortalSlot::Orange => "Portal Params Bind Group Orange",
                    PortalSlot::Blue => "Portal Params Bind Group Blue",
                }),
                layout: &params_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffers[index].as_entire_binding(),
                }],
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Portal Pipeline Layout"),
            bind_group_layouts: &[camera_bind_group_layout, &params_bind_group_layout],
            push_constant_ranges: &[],
        });

        let build = |label: &str, stage: Stage, vertex_entry: &str| {
            let state = stage.raster_state(0);
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(vertex_entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[PortalVertex::desc()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: color_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: color_writes(&state),
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(depth_stencil_state(&state, depth_format)),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        let pipelines = PortalPipelines {
            mark: build("Portal Mark Pipeline", Stage::Mark, "vs_main"),
            // Resets depth inside the mask to the far plane before the virtual view is drawn.
            prime: build("Portal Prime Depth Pipeline", Stage::PrimeDepth, "vs_far"),
            overlay: build("Portal Overlay Pipeline", Stage::Overlay, "vs_main"),
        };

        Self {
            pipelines,
            params_buffers,
            params_bind_groups,
            opening_mesh: GpuMesh::upload(
                device,
                "Portal Opening",
                &build_opening_mesh(PORTAL_SEGMENTS),
            ),
            ring_mesh: GpuMesh::upload(
                device,
                "Portal Rim",
                &build_ring_mesh(PORTAL_SEGMENTS, RIM_OUTER_SCALE),
            ),
        }
    }

    /// Uploads placement and link state for both slots. Empty slots collapse to a zero matrix.
    pub fn update(&self, queue: &wgpu::Queue, portals: &PortalPair) {
        for slot in PortalSlot::ALL {
            let uniform = match portals.get(slot) {
                Some(portal) => PortalParamsUniform {
                    model: portal_model_matrix(portal).to_cols_array_2d(),
                    color: portal_color(slot),
                    params: [
                        if portals.is_linked(slot) { 1.0 } else { 0.0 },
                        0.0,
                        0.0,
                        0.0,
                    ],
                },
                None => PortalParamsUniform::hidden(slot),
            };
            queue.write_buffer(
                &self.params_buffers[slot.index()],
                0,
                bytemuck::bytes_of(&uniform),
            );
        }
    }

    fn pipeline(&self, stage: Stage) -> Option<&wgpu::RenderPipeline> {
        match stage {
            Stage::Mark => Some(&self.pipelines.mark),
            Stage::PrimeDepth => Some(&self.pipelines.prime),
            Stage::Overlay => Some(&self.pipelines.overlay),
            Stage::DrawVirtual | Stage::MainScene => None,
        }
    }

    /// Returns false when `stage` has no portal pipeline.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        camera_bind_group: &wgpu::BindGroup,
        slot: PortalSlot,
        geometry: PortalGeometry,
        stage: Stage,
    ) -> bool {
        let Some(pipeline) = self.pipeline(stage) else {
            return false;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, camera_bind_group, &[]);
        pass.set_bind_group(1, &self.params_bind_groups[slot.index()], &[]);
        match geometry {
            PortalGeometry::Opening | PortalGeometry::Marker => self.opening_mesh.draw(pass),
            PortalGeometry::Rim => self.ring_mesh.draw(pass),
        }
        true
    }
}
