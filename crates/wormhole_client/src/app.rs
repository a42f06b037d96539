use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};
use wormhole_core::events::{frame_channel, EventSender, FrameEvents};
use wormhole_shared::compositor::{CompositorStats, FrameContext};
use wormhole_shared::level::Level;
use wormhole_shared::portal::{PlacementRequest, PortalPair, PortalSlot};

use crate::camera::Camera;
use crate::input::InputState;
use crate::renderer::Renderer;
use crate::settings::{load_or_create_settings, ClientSettings, SETTINGS_PATH};

const MAX_FRAME_DT: f32 = 0.05;
const STATS_LOG_INTERVAL_SECS: f32 = 5.0;

pub struct WormholeApp {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    settings: ClientSettings,
    settings_path: PathBuf,
    level: Level,
    portals: PortalPair,
    camera: Camera,
    input: InputState,
    placement_sender: EventSender<PlacementRequest>,
    placement_events: FrameEvents<PlacementRequest>,
    cursor_grabbed: bool,
    last_frame: Option<Instant>,
    stats_log_timer_seconds: f32,
    frames_since_log: u32,
    last_frame_stats: CompositorStats,
}

impl Default for WormholeApp {
    fn default() -> Self {
        let settings_path = PathBuf::from(SETTINGS_PATH);
        let settings = load_or_create_settings(&settings_path);
        Self::new(settings, settings_path)
    }
}

impl WormholeApp {
    pub fn new(settings: ClientSettings, settings_path: PathBuf) -> Self {
        let settings = settings.sanitize();
        let level = Level::demo();
        let camera = Camera {
            position: level.spawn_point(),
            fov: settings.fov.to_radians(),
            ..Camera::default()
        };
        let (placement_sender, placement_events) = frame_channel();

        Self {
            window: None,
            renderer: None,
            settings,
            settings_path,
            level,
            portals: PortalPair::default(),
            camera,
            input: InputState::default(),
            placement_sender,
            placement_events,
            cursor_grabbed: false,
            last_frame: None,
            stats_log_timer_seconds: 0.0,
            frames_since_log: 0,
            last_frame_stats: CompositorStats::default(),
        }
    }

    fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    fn set_cursor_grab(&mut self, enabled: bool) {
        let Some(window) = self.window.as_ref() else {
            self.cursor_grabbed = false;
            return;
        };

        let grabbed = if enabled {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
                .is_ok()
        } else {
            let _ = window.set_cursor_grab(CursorGrabMode::None);
            false
        };

        if !enabled {
            self.input.release_all();
        }

        window.set_cursor_visible(!grabbed);
        self.cursor_grabbed = grabbed;
    }

    fn queue_placement(&self, slot: PortalSlot) {
        let request = PlacementRequest {
            slot,
            ray: self.camera.ray(),
            facing: self.camera.horizontal_forward(),
        };
        if let Err(err) = self.placement_sender.queue(request) {
            warn!("Dropping {} placement request: {err}", slot.label());
        }
    }

    /// Turns latched clicks into queued requests.
    fn collect_placement_input(&mut self) {
        if self.input.consume_left_click() {
            self.queue_placement(PortalSlot::Orange);
        }
        if self.input.consume_right_click() {
            self.queue_placement(PortalSlot::Blue);
        }
    }

    /// Frame boundary: every request queued since the last frame is applied before rendering.
    fn apply_pending_placements(&mut self) -> usize {
        let batch = self.placement_events.drain();
        if batch.is_empty() {
            return 0;
        }
        let placed = self
            .portals
            .apply(&self.level, &batch, &self.settings.portal);
        debug!(
            "Frame {}: applied {placed} of {} placement requests",
            batch.frame(),
            batch.len()
        );
        placed
    }

    fn update(&mut self, dt: f32) {
        if self.cursor_grabbed {
            self.camera
                .update_look(&self.input, self.settings.look_sensitivity());
            self.camera.fly(&self.input, self.settings.move_speed, dt);
            self.collect_placement_input();
        }
        self.apply_pending_placements();
        self.input.clear_frame();
    }

    fn log_frame_stats_if_due(&mut self, dt: f32) {
        self.stats_log_timer_seconds += dt;
        self.frames_since_log += 1;
        if self.stats_log_timer_seconds < STATS_LOG_INTERVAL_SECS {
            return;
        }

        let fps = self.frames_since_log as f32 / self.stats_log_timer_seconds;
        let stats = self.last_frame_stats;
        self.stats_log_timer_seconds = 0.0;
        self.frames_since_log = 0;

        if self.settings.show_stats {
            info!(
                "portal stats | fps={fps:.1} | passes={} virtual_draws={} markers={} clip_fallbacks={} stages={}",
                stats.portal_passes,
                stats.virtual_draws,
                stats.markers,
                stats.clip_fallbacks,
                stats.stages_issued,
            );
        } else {
            debug!(
                "portal stats | fps={fps:.1} | passes={} virtual_draws={} markers={} clip_fallbacks={} stages={}",
                stats.portal_passes,
                stats.virtual_draws,
                stats.markers,
                stats.clip_fallbacks,
                stats.stages_issued,
            );
        }
    }

    fn update_and_render(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32())
            .min(MAX_FRAME_DT);
        self.last_frame = Some(now);

        self.update(dt);

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let (width, height) = renderer.surface_size();
        if width > 0 && height > 0 {
            self.camera.aspect = width as f32 / height as f32;
        }

        let pose = self.camera.pose();
        let ctx = FrameContext {
            camera: &pose,
            portals: &self.portals,
            settings: &self.settings.portal,
        };
        match renderer.render_frame(&ctx) {
            Ok(stats) => self.last_frame_stats = stats,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                let size = self
                    .window
                    .as_ref()
                    .map_or((width, height), |window| {
                        let size = window.inner_size();
                        (size.width, size.height)
                    });
                renderer.resize(size.0, size.1);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                error!("Out of GPU memory; shutting down event loop");
                event_loop.exit();
            }
            Err(wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other) => {}
        }

        self.log_frame_stats_if_due(dt);
    }

    fn save_settings(&self) {
        if let Err(err) = self.settings.save(self.settings_path()) {
            warn!(
                "Failed to save settings to {}: {err}",
                self.settings_path().display()
            );
        }
    }
}

impl ApplicationHandler for WormholeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes().with_title("Wormhole");
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                match Renderer::new(window.clone(), &self.level) {
                    Ok(renderer) => {
                        let size = window.inner_size();
                        if size.width > 0 && size.height > 0 {
                            self.camera.aspect = size.width as f32 / size.height as f32;
                        }
                        info!(
                            "Window and renderer initialized; level has {} faces ({} eligible)",
                            self.level.faces().len(),
                            self.level.eligible_faces().count()
                        );
                        self.window = Some(window);
                        self.renderer = Some(renderer);
                        self.last_frame = Some(Instant::now());
                    }
                    Err(err) => {
                        error!("failed to initialize renderer: {err}");
                        event_loop.exit();
                    }
                }
            }
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested; shutting down event loop");
                self.save_settings();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if size.width > 0 && size.height > 0 {
                    self.camera.aspect = size.width as f32 / size.height as f32;
                }
            }
            WindowEvent::Focused(false) => {
                self.set_cursor_grab(false);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                match event.state {
                    ElementState::Pressed => {
                        if code == KeyCode::Escape {
                            self.set_cursor_grab(false);
                            return;
                        }
                        self.input.press_key(code);
                    }
                    ElementState::Released => self.input.release_key(code),
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state != ElementState::Pressed {
                    return;
                }
                if !self.cursor_grabbed {
                    self.set_cursor_grab(true);
                    return;
                }
                match button {
                    MouseButton::Left => self.input.left_click = true,
                    MouseButton::Right => self.input.right_click = true,
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                self.update_and_render(event_loop);
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if !self.cursor_grabbed {
            return;
        }

        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

pub fn run() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
    info!("Wormhole client starting");

    let event_loop = match EventLoop::new() {
        Ok(loop_handle) => loop_handle,
        Err(err) => {
            eprintln!("Failed to create event loop: {err}");
            return;
        }
    };

    let mut app = WormholeApp::default();
    if let Err(err) = event_loop.run_app(&mut app) {
        eprintln!("Event loop exited with error: {err}");
    }
}
