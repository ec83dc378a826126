// viewer.rs — window surface, egui chrome and the embedded photo sphere

use photosphere::error::LoadResult;
use photosphere::panorama::{DEFAULT_FIELD_OF_VIEW, MAX_FIELD_OF_VIEW, MIN_FIELD_OF_VIEW};
use photosphere::{FrameExchange, Notification, PhotoSphere, RenderContext, RenderError, RenderHost, Source};
use std::path::PathBuf;
use winit::window::{Fullscreen, Window};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
const TEXTURE_SIZES: [u32; 6] = [1024, 2048, 4096, 8192, 16384, 65536];
/// egui reports wheel steps in points; one notch is about 50.
const FOV_PER_SCROLL_POINT: f32 = 2.5 / 50.0;

/// Degrees of azimuth / elevation covered by a drag of `(dx, dy)` pixels
/// over a `width` x `height` view with vertical field of view `fov`.
pub fn drag_angles(dx: f32, dy: f32, width: f32, height: f32, fov: f32) -> (f32, f32) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let v_f = fov.to_radians();
    let aspect = width / height;
    let h_f = 2.0 * ((v_f / 2.0).tan() * aspect).atan();

    let yaw_per_px_deg = (h_f / width).to_degrees();
    let pitch_per_px_deg = (v_f / height).to_degrees();
    (dx * yaw_per_px_deg, dy * pitch_per_px_deg)
}

/// Status bar text for a source assignment; `None` clears it.
pub fn load_status(result: &LoadResult<()>) -> Option<String> {
    result.as_ref().err().map(|err| err.to_string())
}

pub struct Viewer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: winit::dpi::PhysicalSize<u32>,

    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    /// The photo sphere framebuffer as seen by egui.
    panorama_texture: Option<egui::TextureId>,

    item: PhotoSphere,
    exchange: FrameExchange,
    host: RenderHost,

    last_error: Option<String>,
    quit_requested: bool,
}

impl Viewer {
    pub async fn new(window: &Window, item: PhotoSphere) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(RenderError::NoAdapter)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let egui_ctx = egui::Context::default();
        let mut egui_state = egui_winit::State::new(window);
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        let exchange = FrameExchange::new();
        let host = RenderHost::new(exchange.clone(), item.loader().decoder());

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            egui_ctx,
            egui_state,
            egui_renderer,
            panorama_texture: None,
            item,
            exchange,
            host,
            last_error: None,
            quit_requested: false,
        })
    }

    pub fn size(&self) -> winit::dpi::PhysicalSize<u32> {
        self.size
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Returns `true` when egui used the event.
    pub fn on_event(&mut self, event: &winit::event::WindowEvent<'_>) -> bool {
        self.egui_state.on_event(&self.egui_ctx, event).consumed
    }

    pub fn open(&mut self, path: PathBuf) {
        let source = Source::single(path.to_string_lossy().into_owned());
        let result = self.item.set_source(&source);
        self.show_load_result(result);
    }

    /// Puts the outcome of a source assignment on the status bar.
    pub fn show_load_result(&mut self, result: LoadResult<()>) {
        self.last_error = load_status(&result);
    }

    pub fn open_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.open(path);
        }
    }

    pub fn toggle_fullscreen(window: &Window) {
        if window.fullscreen().is_some() {
            window.set_fullscreen(None);
        } else {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        }
    }

    fn pan(&mut self, delta: egui::Vec2, view: egui::Vec2) {
        let fov = self.item.field_of_view() as f32;
        let (yaw, pitch) = drag_angles(delta.x, delta.y, view.x, view.y, fov);
        self.item.set_azimuth(self.item.azimuth() - yaw as f64);
        self.item.set_elevation(self.item.elevation() - pitch as f64);
    }

    fn zoom(&mut self, scroll: f32) {
        let fov = self.item.field_of_view() - (scroll * FOV_PER_SCROLL_POINT) as f64;
        self.item
            .set_field_of_view(fov.clamp(MIN_FIELD_OF_VIEW, MAX_FIELD_OF_VIEW));
    }

    fn reset_view(&mut self) {
        self.item.set_azimuth(0.0);
        self.item.set_elevation(0.0);
        self.item.set_field_of_view(DEFAULT_FIELD_OF_VIEW);
    }

    /// Points egui at the current framebuffer after the renderer replaced it.
    fn sync_panorama_texture(&mut self) {
        let Some(target) = self.host.target() else {
            if let Some(id) = self.panorama_texture.take() {
                self.egui_renderer.free_texture(&id);
            }
            return;
        };
        match self.panorama_texture {
            Some(id) => self.egui_renderer.update_egui_texture_from_wgpu_texture(
                &self.device,
                target.view(),
                wgpu::FilterMode::Linear,
                id,
            ),
            None => {
                self.panorama_texture = Some(self.egui_renderer.register_native_texture(
                    &self.device,
                    target.view(),
                    wgpu::FilterMode::Linear,
                ))
            }
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // UI first: input lands in the item before this frame's snapshot
        let raw_input = self.egui_state.take_egui_input(window);
        let egui_ctx = self.egui_ctx.clone();
        let full_output = egui_ctx.run(raw_input, |ctx| self.ui(ctx, window));
        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);

        self.item.publish(&self.exchange);
        let ctx = RenderContext {
            device: &self.device,
            queue: &self.queue,
        };
        if let Some(report) = self.host.render_frame(ctx) {
            if report.target_replaced() {
                self.sync_panorama_texture();
            }
        }
        for notification in self.item.take_notifications() {
            match notification {
                Notification::MaximumTextureSizeChanged(size) => {
                    log::info!("effective max texture size is now {size}")
                }
                other => log::debug!("{other:?}"),
            }
        }

        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);
        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer encoder"),
            });
        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.1,
                            g: 0.1,
                            b: 0.1,
                            a: 1.0,
                        }),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn ui(&mut self, ctx: &egui::Context, window: &Window) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open image…").clicked() {
                        ui.close_menu();
                        self.open_dialog();
                    }
                    if ui.button("Exit").clicked() {
                        self.quit_requested = true;
                    }
                });

                ui.menu_button("View", |ui| {
                    if ui.button("Reset view").clicked() {
                        self.reset_view();
                        ui.close_menu();
                    }
                    let fullscreen = window.fullscreen().is_some();
                    if ui
                        .button(if fullscreen { "Exit fullscreen" } else { "Fullscreen" })
                        .clicked()
                    {
                        Self::toggle_fullscreen(window);
                        ui.close_menu();
                    }

                    ui.separator();
                    ui.menu_button("Max texture size", |ui| {
                        let mut requested = self.item.requested_maximum_texture_size();
                        for size in TEXTURE_SIZES {
                            if ui
                                .radio_value(&mut requested, size, size.to_string())
                                .clicked()
                            {
                                self.item.set_maximum_texture_size(requested);
                                ui.close_menu();
                            }
                        }
                    });
                });
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(err) = &self.last_error {
                    ui.label(egui::RichText::new(err).color(egui::Color32::LIGHT_RED));
                    ui.label("|");
                }
                ui.label(format!("Azimuth: {:.1}°", self.item.azimuth()));
                ui.label("|");
                ui.label(format!("Elevation: {:.1}°", self.item.elevation()));
                ui.label("|");
                ui.label(format!("FOV: {:.1}°", self.item.field_of_view()));
                ui.label("|");
                ui.label(format!("Max texture: {}", self.item.maximum_texture_size()));
                let (w, h) = self.item.implicit_size();
                if w > 0 && h > 0 {
                    ui.label("|");
                    ui.label(format!("{:?} {w}x{h}", self.item.renderer_kind()));
                }
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (rect, response) =
                    ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());
                let ppp = ctx.pixels_per_point();
                self.item.set_size(
                    (rect.width() * ppp).round() as u32,
                    (rect.height() * ppp).round() as u32,
                );

                if response.dragged() {
                    self.pan(response.drag_delta(), rect.size());
                }
                if response.hovered() {
                    let scroll = ui.input(|i| i.scroll_delta.y);
                    if scroll != 0.0 {
                        self.zoom(scroll);
                    }
                }

                match self.panorama_texture {
                    Some(id) => ui.painter().image(
                        id,
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    ),
                    None => ui.painter().rect_filled(rect, 0.0, egui::Color32::from_gray(25)),
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_source_errors_reach_the_status_bar() {
        let mut item = PhotoSphere::default();
        let result = item.set_source(&Source::single("/nonexistent/pano.jpg"));
        let status = load_status(&result).unwrap();
        assert!(status.contains("/nonexistent/pano.jpg"), "{status}");
        assert_eq!(load_status(&Ok(())), None);
    }

    #[test]
    fn vertical_drag_across_view_covers_fov() {
        let (_, pitch) = drag_angles(0.0, 600.0, 800.0, 600.0, 90.0);
        assert!((pitch - 90.0).abs() < 1e-3);
    }

    #[test]
    fn horizontal_drag_scales_with_aspect() {
        let (yaw_wide, _) = drag_angles(100.0, 0.0, 1600.0, 600.0, 60.0);
        let (yaw_square, _) = drag_angles(100.0, 0.0, 600.0, 600.0, 60.0);
        assert!(yaw_wide > 0.0 && yaw_square > yaw_wide);
        assert_eq!(drag_angles(5.0, 5.0, 0.0, 600.0, 60.0), (0.0, 0.0));
    }
}
