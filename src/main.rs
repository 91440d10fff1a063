//! Book Mockup - interactive 3D book mockup generator
//!
//! Window, input and control panel around a `SceneComposer`. Each frame the
//! scene ticks, draws into the renderer's offscreen surface, and that surface
//! is blitted to the window underneath the egui panel.

mod ui;

use book_mockup::config::hex_to_rgba;
use book_mockup::loader::LoadSlot;
use book_mockup::scene::write_export;
use book_mockup::{
    GpuRenderer, ImageSource, LoadEvent, PendingExport, RenderError, SceneComposer, Settings,
    TextureOutcome,
};
use ui::{render_side_panel, BackgroundChoice, UiAction, UiState};

use egui_wgpu::ScreenDescriptor;
use log::{error, info, warn};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

/// Window color behind transparent scene pixels
const WINDOW_BACKDROP: u32 = 0x1a1a2e;

/// Main application state
struct App {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    renderer: GpuRenderer,
    scene: SceneComposer,
    /// Cursor position while the orbit drag is active
    drag_from: Option<(f32, f32)>,
    mouse_position: (f32, f32),
    pending_export: Option<PendingExport>,
    /// Backdrop choice whose image is still loading
    requested_background: Option<BackgroundChoice>,
    // Egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    ui_state: UiState,
}

impl App {
    async fn new(window: Arc<Window>) -> Result<Self, Box<dyn std::error::Error>> {
        let size = window.inner_size();

        // Create wgpu instance
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Create surface
        let surface = instance.create_surface(window.clone())?;

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        // Create device and queue
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(RenderError::from)?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        // Configure surface
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or("Surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let renderer = GpuRenderer::new(device.clone(), queue.clone(), Some(surface_format));

        let settings = Settings::load();
        let mut scene = SceneComposer::with_settings(settings)?;
        scene.on_resize(size.width, size.height);

        // Initialize egui
        let egui_ctx = egui::Context::default();

        // Set up dark theme for egui
        let mut style = egui::Style::default();
        style.visuals = egui::Visuals::dark();
        style.visuals.window_fill = egui::Color32::from_rgba_unmultiplied(26, 26, 46, 242);
        style.visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(26, 26, 46, 242);
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1, false);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            renderer,
            scene,
            drag_from: None,
            mouse_position: (0.0, 0.0),
            pending_export: None,
            requested_background: None,
            egui_ctx,
            egui_state,
            egui_renderer,
            ui_state: UiState::new(),
        })
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
        // Safe before the first real layout; zero sizes are clamped by the scene
        self.scene.on_resize(new_size.width, new_size.height);
    }

    /// Per-frame tick: camera damping, finished loads, finished exports
    fn update(&mut self) {
        for event in self.scene.update() {
            match event {
                LoadEvent::TextureApplied { role, outcome } => {
                    let message = match outcome {
                        TextureOutcome::MaterialOnly => format!("{} artwork applied", role.display_name()),
                        TextureOutcome::Resized { width } => {
                            format!("Cover applied, width set to {width:.2}")
                        }
                        TextureOutcome::ResizeRejected { .. } => {
                            "Cover applied; its proportions are too extreme to resize the book".to_string()
                        }
                    };
                    self.ui_state.set_status(message);
                }
                LoadEvent::BackgroundApplied => {
                    if let Some(choice) = self.requested_background.take() {
                        self.ui_state.background = choice;
                    }
                    self.ui_state.set_status("Background loaded");
                }
                LoadEvent::Failed { slot, error } => {
                    if slot == LoadSlot::Background {
                        self.requested_background = None;
                    }
                    self.ui_state.set_status(format!("Could not load image for {slot:?}: {error}"));
                }
            }
        }
        self.ui_state.loading = self.scene.pending_loads();

        if let Some(result) = self.pending_export.as_ref().and_then(|p| p.try_take()) {
            self.pending_export = None;
            self.ui_state.exporting = false;
            let path = self.scene.settings().export_path();
            match result.and_then(|bytes| write_export(&path, &bytes)) {
                Ok(()) => {
                    info!("Exported {}", path.display());
                    self.ui_state.set_status(format!("Saved {}", path.display()));
                }
                Err(e) => {
                    error!("Export failed: {}", e);
                    self.ui_state.set_status(format!("Export failed: {e}"));
                }
            }
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if let Err(e) = self.scene.render(&mut self.renderer) {
            error!("Scene render failed: {}", e);
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Present Encoder"),
            });

        let backdrop = hex_to_rgba(WINDOW_BACKDROP);
        self.renderer.present_to(
            &mut encoder,
            &view,
            wgpu::Color {
                r: backdrop[0] as f64,
                g: backdrop[1] as f64,
                b: backdrop[2] as f64,
                a: 1.0,
            },
        );

        // Render egui UI
        let egui_input = self.egui_state.take_egui_input(&self.window);
        let egui_ctx = self.egui_ctx.clone();

        let mut ui_actions = Vec::new();
        let egui_output = egui_ctx.run(egui_input, |ctx| {
            ui_actions = render_side_panel(ctx, &mut self.ui_state);
        });

        // Process UI actions after egui rendering
        for action in ui_actions {
            self.process_ui_action(action);
        }

        // Handle egui platform output
        self.egui_state.handle_platform_output(&self.window, egui_output.platform_output);

        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        let tris = self.egui_ctx.tessellate(egui_output.shapes, egui_output.pixels_per_point);
        for (id, image_delta) in &egui_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }
        self.egui_renderer.update_buffers(&self.device, &self.queue, &mut encoder, &tris, &screen_descriptor);

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load, // Keep the presented scene
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            // Need to forget lifetime for egui-wgpu compatibility with wgpu 22
            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer.render(&mut render_pass, &tris, &screen_descriptor);
        }

        // Free textures
        for id in &egui_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    /// Process a UI action
    fn process_ui_action(&mut self, action: UiAction) {
        match action {
            UiAction::SetFormat(format) => match self.scene.set_format(format) {
                Ok(_) => self.ui_state.format = format,
                Err(e) => self.ui_state.set_status(e.to_string()),
            },
            UiAction::SetThickness(thickness) => {
                if let Err(e) = self.scene.set_thickness(thickness) {
                    warn!("Thickness rejected: {}", e);
                    self.ui_state.thickness = self.scene.book().attributes().thickness;
                    self.ui_state.set_status(e.to_string());
                }
            }
            UiAction::PickTexture(role) => {
                let file = rfd::FileDialog::new()
                    .add_filter("Images", &["png", "jpg", "jpeg"])
                    .set_title(format!("Select {} Image", role.display_name()))
                    .pick_file();

                if let Some(path) = file {
                    info!("Selected {} image: {}", role, path.display());
                    self.scene.set_texture(role, ImageSource::Path(path));
                    self.ui_state.set_status(format!("Loading {} image...", role));
                }
            }
            UiAction::SetPose(pose) => {
                self.scene.set_pose(pose);
                self.ui_state.pose = Some(pose);
            }
            UiAction::AddToStack => {
                self.ui_state.stack_len = self.scene.add_to_stack();
            }
            UiAction::ClearStack => {
                self.scene.clear_stack();
                self.ui_state.stack_len = 0;
            }
            UiAction::SetBackground(choice) => match self.scene.set_background(&choice.request()) {
                // Image backdrops only count as selected once they arrive
                Ok(()) if choice.loads_image() => {
                    self.requested_background = Some(choice);
                    self.ui_state.set_status("Loading background...");
                }
                Ok(()) => {
                    self.requested_background = None;
                    self.ui_state.background = choice;
                }
                Err(e) => self.ui_state.set_status(e.to_string()),
            },
            UiAction::Export => match self.scene.capture_frame(&mut self.renderer) {
                Ok(pending) => {
                    self.pending_export = Some(pending);
                    self.ui_state.exporting = true;
                }
                Err(e) => {
                    error!("Capture failed: {}", e);
                    self.ui_state.set_status(format!("Export failed: {e}"));
                }
            },
            UiAction::ResetCamera => self.scene.reset_camera(),
        }
    }

    /// Route a window event to egui first, then to the camera controls
    fn handle_event(&mut self, event: &WindowEvent) {
        // First pass event to egui
        let response = self.egui_state.on_window_event(&self.window, event);

        // A drag that started on the scene keeps orbiting over the panel
        if response.consumed && self.drag_from.is_none() {
            return;
        }

        match event {
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                self.drag_from = match state {
                    ElementState::Pressed => Some(self.mouse_position),
                    ElementState::Released => None,
                };
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse_position = (position.x as f32, position.y as f32);
                if let Some((x, y)) = self.drag_from {
                    self.scene
                        .orbit(self.mouse_position.0 - x, self.mouse_position.1 - y);
                    self.drag_from = Some(self.mouse_position);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => *y,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                };
                self.scene.zoom(scroll);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    if let PhysicalKey::Code(KeyCode::Tab) = event.physical_key {
                        self.ui_state.toggle_panel();
                    }
                }
            }
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        if let Some(pending) = self.pending_export.take() {
            info!("Waiting for export to finish...");
            let path = self.scene.settings().export_path();
            if let Err(e) = pending.wait().and_then(|bytes| write_export(&path, &bytes)) {
                error!("Export failed: {}", e);
            }
        }
        self.scene.dispose();
    }
}

/// Application wrapper for winit 0.30 ApplicationHandler
struct AppWrapper {
    app: Option<App>,
}

impl ApplicationHandler for AppWrapper {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default()
            .with_title("Book Mockup")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(App::new(window)) {
            Ok(app) => {
                self.app = Some(app);
                info!("Application initialized");
            }
            Err(e) => {
                error!("Failed to create app: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(app) = &mut self.app else { return };

        app.handle_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("Exiting...");
                app.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => app.resize(size),
            WindowEvent::RedrawRequested => {
                app.update();
                if let Err(e) = app.render() {
                    match e {
                        wgpu::SurfaceError::Lost => app.resize(app.size),
                        wgpu::SurfaceError::OutOfMemory => event_loop.exit(),
                        _ => error!("Render error: {:?}", e),
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(app) = &self.app {
            app.window.request_redraw();
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    info!("Starting Book Mockup...");
    info!("Controls:");
    info!("  Drag - Orbit the camera");
    info!("  Scroll - Zoom");
    info!("  Tab - Toggle the control panel");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app_wrapper = AppWrapper { app: None };
    event_loop.run_app(&mut app_wrapper)?;
    Ok(())
}
