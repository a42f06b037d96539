use wormhole_shared::compositor::{CompareOp, RasterState, Stage, StencilWrite};

use crate::renderer::mesh::LevelVertex;

pub fn compare_function(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Always => wgpu::CompareFunction::Always,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::LessEqual => wgpu::CompareFunction::LessEqual,
    }
}

fn stencil_operation(op: StencilWrite) -> wgpu::StencilOperation {
    match op {
        StencilWrite::Keep => wgpu::StencilOperation::Keep,
        StencilWrite::Replace => wgpu::StencilOperation::Replace,
    }
}

/// Stencil state for `state`. The reference itself is dynamic and set per draw.
pub fn stencil_state(state: &RasterState) -> wgpu::StencilState {
    let Some(test) = state.stencil else {
        return wgpu::StencilState::default();
    };
    let face = wgpu::StencilFaceState {
        compare: compare_function(test.compare),
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op: stencil_operation(test.pass_op),
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: 0xff,
        write_mask: match test.pass_op {
            StencilWrite::Replace => 0xff,
            StencilWrite::Keep => 0x00,
        },
    }
}

pub fn depth_stencil_state(
    state: &RasterState,
    depth_format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: depth_format,
        depth_write_enabled: state.depth_write,
        depth_compare: compare_function(state.depth_compare),
        stencil: stencil_state(state),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub fn color_writes(state: &RasterState) -> wgpu::ColorWrites {
    if state.color_write {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::empty()
    }
}

/// Ordinary scene geometry, one pipeline per stage that draws it.
#[derive(Debug)]
pub struct LevelPipeline {
    virtual_pipeline: wgpu::RenderPipeline,
    main_pipeline: wgpu::RenderPipeline,
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
}

impl LevelPipeline {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Level Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/level.wgsl"
                ))
                .into(),
            ),
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Level Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout],
            push_constant_ranges: &[],
        });

        let build = |stage: Stage| {
            let state = stage.raster_state(0);
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(match stage {
                    Stage::DrawVirtual => "Level Pipeline Virtual",
                    _ => "Level Pipeline Main",
                }),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[LevelVertex::desc()],
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
                    cull_mode: Some(wgpu::Face::Back),
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

        Self {
            virtual_pipeline: build(Stage::DrawVirtual),
            main_pipeline: build(Stage::MainScene),
            camera_bind_group_layout,
        }
    }

    pub fn pipeline(&self, stage: Stage) -> Option<&wgpu::RenderPipeline> {
        match stage {
            Stage::DrawVirtual => Some(&self.virtual_pipeline),
            Stage::MainScene => Some(&self.main_pipeline),
            Stage::Mark | Stage::PrimeDepth | Stage::Overlay => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use wormhole_shared::compositor::Stage;

    use super::{color_writes, depth_stencil_state, stencil_state};

    const DEPTH: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

    #[test]
    fn mark_replaces_stencil_without_color_or_depth() {
        let state = Stage::Mark.raster_state(1);
        let depth_stencil = depth_stencil_state(&state, DEPTH);

        assert!(!depth_stencil.depth_write_enabled);
        assert_eq!(depth_stencil.depth_compare, wgpu::CompareFunction::Always);
        assert_eq!(depth_stencil.stencil.front.compare, wgpu::CompareFunction::Always);
        assert_eq!(
            depth_stencil.stencil.front.pass_op,
            wgpu::StencilOperation::Replace
        );
        assert_eq!(depth_stencil.stencil.write_mask, 0xff);
        assert_eq!(depth_stencil.stencil.back, depth_stencil.stencil.front);
        assert_eq!(color_writes(&state), wgpu::ColorWrites::empty());
    }

    #[test]
    fn masked_stages_test_equality_without_writing_stencil() {
        for stage in [Stage::PrimeDepth, Stage::DrawVirtual, Stage::MainScene] {
            let stencil = stencil_state(&stage.raster_state(2));
            assert_eq!(stencil.front.compare, wgpu::CompareFunction::Equal);
            assert_eq!(stencil.front.pass_op, wgpu::StencilOperation::Keep);
            assert_eq!(stencil.write_mask, 0);
        }
        let prime = depth_stencil_state(&Stage::PrimeDepth.raster_state(2), DEPTH);
        assert!(prime.depth_write_enabled);
        assert_eq!(prime.depth_compare, wgpu::CompareFunction::Always);
    }

    #[test]
    fn overlay_disables_stencil_and_keeps_depth_test() {
        let state = Stage::Overlay.raster_state(0);
        let depth_stencil = depth_stencil_state(&state, DEPTH);
        assert!(!depth_stencil.stencil.is_enabled());
        assert_eq!(depth_stencil.depth_compare, wgpu::CompareFunction::LessEqual);
        assert_eq!(color_writes(&state), wgpu::ColorWrites::ALL);
    }
}
