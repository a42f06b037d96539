pub mod mesh;
pub mod pipeline;
pub mod portal_renderer;

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;
use winit::window::Window;
use wormhole_shared::compositor::{
    execute, plan_frame, CompositorStats, FrameContext, PortalDrawBackend, PortalGeometry,
    RasterState, Stage, ViewId,
};
use wormhole_shared::level::Level;
use wormhole_shared::portal::{Portal, PortalSlot};
use wormhole_shared::view::{CameraPose, Projection, ViewPose};

use crate::renderer::mesh::{build_level_mesh, GpuMesh};
use crate::renderer::pipeline::LevelPipeline;
use crate::renderer::portal_renderer::PortalRenderer;

/// Stencil bits are required for the portal masks.
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const FOG_COLOR: [f32; 4] = [0.07, 0.08, 0.10, 1.0];
const FOG_START: f32 = 12.0;
const FOG_END: f32 = 60.0;
const VIEW_COUNT: usize = 1 + PortalSlot::ALL.len();

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    fog_color: [f32; 4],
    fog_params: [f32; 4],
}

impl CameraUniform {
    fn from_pose(pose: &ViewPose) -> Self {
        Self {
            view_proj: pose.view_proj().to_cols_array_2d(),
            camera_pos: pose.position.extend(1.0).to_array(),
            fog_color: FOG_COLOR,
            fog_params: [FOG_START, FOG_END, 0.0, 0.0],
        }
    }
}

fn view_index(view: ViewId) -> usize {
    match view {
        ViewId::Main => 0,
        ViewId::Portal(slot) => 1 + slot.index(),
    }
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Wormhole Depth Stencil Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    level_pipeline: LevelPipeline,
    portal_renderer: PortalRenderer,
    camera_uniform_buffers: [wgpu::Buffer; VIEW_COUNT],
    camera_bind_groups: [wgpu::BindGroup; VIEW_COUNT],
    level_mesh: GpuMesh,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("surface_width", &self.surface_config.width)
            .field("surface_height", &self.surface_config.height)
            .field("level_indices", &self.level_mesh.index_count)
            .finish()
    }
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

impl Renderer {
    pub fn new(window: Arc<Window>, level: &Level) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Wormhole Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;

        surface.configure(&device, &surface_config);

        let level_pipeline = LevelPipeline::new(&device, surface_config.format, DEPTH_FORMAT);
        let portal_renderer = PortalRenderer::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &level_pipeline.camera_bind_group_layout,
        );

        let initial_pose = CameraPose {
            position: level.spawn_point(),
            forward: Vec3::X,
            projection: Projection::default(),
        }
        .view_pose();
        let camera_uniform_buffers: [wgpu::Buffer; VIEW_COUNT] = std::array::from_fn(|index| {
            let label = match index {
                0 => "Camera Uniform Buffer Main",
                1 => "Camera Uniform Buffer Orange",
                _ => "Camera Uniform Buffer Blue",
            };
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&CameraUniform::from_pose(&initial_pose)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        });
        let camera_bind_groups = std::array::from_fn(|index| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Camera Bind Group"),
                layout: &level_pipeline.camera_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_uniform_buffers[index].as_entire_binding(),
                }],
            })
        });

        let level_mesh = GpuMesh::upload(&device, "Level", &build_level_mesh(level));
        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            level_pipeline,
            portal_renderer,
            camera_uniform_buffers,
            camera_bind_groups,
            level_mesh,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn write_view(&self, view: ViewId, pose: &ViewPose) {
        self.queue.write_buffer(
            &self.camera_uniform_buffers[view_index(view)],
            0,
            bytemuck::bytes_of(&CameraUniform::from_pose(pose)),
        );
    }

    /// Plans the frame, uploads every view it needs, then replays it in a single pass.
    pub fn render_frame(
        &mut self,
        ctx: &FrameContext<'_>,
    ) -> Result<CompositorStats, wgpu::SurfaceError> {
        let plan = plan_frame(ctx);
        self.write_view(ViewId::Main, &plan.main);
        for pass in &plan.passes {
            self.write_view(ViewId::Portal(pass.slot), &pass.virtual_pose);
        }
        self.portal_renderer.update(&self.queue, ctx.portals);

        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Wormhole Command Encoder"),
            });

        let stats = {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Wormhole Portal Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(FOG_COLOR[0]),
                            g: f64::from(FOG_COLOR[1]),
                            b: f64::from(FOG_COLOR[2]),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut backend = PassBackend {
                pass: &mut render_pass,
                level_pipeline: &self.level_pipeline,
                portal_renderer: &self.portal_renderer,
                level_mesh: &self.level_mesh,
                camera_bind_groups: &self.camera_bind_groups,
            };
            execute(&plan, ctx.portals, &mut backend)
        };

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(stats)
    }
}

/// Replays compositor calls into one render pass. View uniforms are uploaded
/// before the pass opens, so the pose arguments only select a bind group.
struct PassBackend<'a, 'pass> {
    pass: &'a mut wgpu::RenderPass<'pass>,
    level_pipeline: &'a LevelPipeline,
    portal_renderer: &'a PortalRenderer,
    level_mesh: &'a GpuMesh,
    camera_bind_groups: &'a [wgpu::BindGroup; VIEW_COUNT],
}

impl PortalDrawBackend for PassBackend<'_, '_> {
    fn draw_scene(&mut self, view: ViewId, _pose: &ViewPose, stage: Stage, state: &RasterState) {
        let Some(pipeline) = self.level_pipeline.pipeline(stage) else {
            return;
        };
        self.pass.set_pipeline(pipeline);
        self.pass.set_stencil_reference(state.stencil_reference());
        self.pass
            .set_bind_group(0, &self.camera_bind_groups[view_index(view)], &[]);
        self.level_mesh.draw(self.pass);
    }

    fn draw_portal(
        &mut self,
        portal: &Portal,
        geometry: PortalGeometry,
        _pose: &ViewPose,
        stage: Stage,
        state: &RasterState,
    ) {
        self.pass.set_stencil_reference(state.stencil_reference());
        self.portal_renderer.draw(
            self.pass,
            &self.camera_bind_groups[view_index(ViewId::Main)],
            portal.slot,
            geometry,
            stage,
        );
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use wormhole_shared::compositor::ViewId;
    use wormhole_shared::portal::PortalSlot;
    use wormhole_shared::view::{CameraPose, Projection};

    use super::{view_index, CameraUniform, VIEW_COUNT};

    #[test]
    fn every_view_has_its_own_uniform_slot() {
        let mut indices = vec![view_index(ViewId::Main)];
        indices.extend(PortalSlot::ALL.map(|slot| view_index(ViewId::Portal(slot))));
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices, (0..VIEW_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn camera_uniform_carries_pose() {
        let pose = CameraPose {
            position: Vec3::new(1.0, 2.0, 3.0),
            forward: Vec3::X,
            projection: Projection::default(),
        }
        .view_pose();
        let uniform = CameraUniform::from_pose(&pose);
        assert_eq!(uniform.camera_pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniform.view_proj, pose.view_proj().to_cols_array_2d());
        assert_eq!(std::mem::size_of::<CameraUniform>() % 16, 0);
    }
}
