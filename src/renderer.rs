// renderer.rs — offscreen panorama renderer: shared pipeline, framebuffer and
// projection, plus the tag-selected sphere / cube variants

mod cube;
mod sphere;

pub use cube::CubeRenderer;
pub use sphere::SphereRenderer;

use crate::error::RenderError;
use crate::exchange::FrameExchange;
use crate::mesh;
use crate::snapshot::{self, ChangeSet, RenderSnapshot};
use crate::source::Decode;
use crate::texture::{self, PanoramaTexture};
use glam::Mat4;
use std::sync::Arc;
use wgpu::util::DeviceExt;

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
pub const NEAR_PLANE: f32 = 0.001;
pub const FAR_PLANE: f32 = 200.0;

/// Which geometry a source needs. Switching kinds tears the renderer down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    Sphere,
    Cube,
}

/// Device and queue of the render context. Nothing outside the render
/// context ever holds one of these.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
}

/// `Perspective(fov, aspect) * RotateX(-elevation) * RotateY(azimuth)`.
pub fn projection(snapshot: &RenderSnapshot) -> Mat4 {
    Mat4::perspective_rh(
        snapshot.fov.to_radians(),
        snapshot.aspect_ratio(),
        NEAR_PLANE,
        FAR_PLANE,
    ) * Mat4::from_rotation_x((-snapshot.elevation).to_radians())
        * Mat4::from_rotation_y(snapshot.azimuth.to_radians())
}

fn upload_cap(snapshot: &RenderSnapshot, device_max: Option<u32>) -> u32 {
    snapshot.max_texture_size.min(device_max.unwrap_or(u32::MAX))
}

/// `snapshot::diff`, except that the texture cap counts as changed only when
/// the cap the device resolves it to changes. Learning the device limit
/// lowers the requested cap without changing what gets uploaded.
pub fn resolve_changes(
    old: &RenderSnapshot,
    new: &RenderSnapshot,
    device_max: Option<u32>,
) -> ChangeSet {
    let mut changes = snapshot::diff(old, new);
    changes.max_texture_size = upload_cap(old, device_max) != upload_cap(new, device_max);
    changes
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PanoramaUniform {
    matrix: [[f32; 4]; 4],
    color: [f32; 4],
}

/// Offscreen color + depth/stencil attachment sized to the viewport.
pub struct RenderTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            label: Some("panorama framebuffer"),
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            label: Some("panorama depth"),
            view_formats: &[],
        });
        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            width,
            height,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.color
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    fn begin_pass<'a>(
        &'a self,
        encoder: &'a mut wgpu::CommandEncoder,
        label: &'a str,
    ) -> wgpu::RenderPass<'a> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: true,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: true,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: true,
                }),
            }),
        })
    }
}

/// Pipeline, layouts, uniform, sampler and the untextured fallback. Created
/// once per renderer, on the first synchronize.
struct GpuResources {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    placeholder: PanoramaTexture,
}

impl GpuResources {
    fn new(ctx: RenderContext<'_>, label: &str, wrap_u: bool) -> Result<Self, RenderError> {
        let device = ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("panorama uniform layout"),
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("panorama texture layout"),
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("panorama uniform"),
            contents: bytemuck::cast_slice(&[PanoramaUniform {
                matrix: Mat4::IDENTITY.to_cols_array_2d(),
                color: [0.0, 0.0, 0.0, 1.0],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
            label: Some("panorama uniform bind group"),
        });

        let shader = device.create_shader_module(wgpu::include_wgsl!("shader_panorama.wgsl"));
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("panorama pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });
        let vertex_layouts = mesh::vertex_layouts();
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vertex_layouts,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None, // seen from inside
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Pipeline(err.to_string()));
        }

        let sampler = texture::create_sampler(device, wrap_u, label);
        let placeholder = PanoramaTexture::placeholder(device, ctx.queue, &texture_layout, &sampler);

        Ok(Self {
            pipeline,
            texture_layout,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            placeholder,
        })
    }

    fn bind<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
    }

    fn upload(&self, ctx: RenderContext<'_>, prepared: &texture::PreparedTexture, label: &str) -> PanoramaTexture {
        PanoramaTexture::upload(
            ctx.device,
            ctx.queue,
            &self.texture_layout,
            &self.sampler,
            prepared,
            label,
        )
    }
}

enum Lifecycle {
    Uninitialized,
    Ready(Box<GpuResources>),
    Failed,
}

/// State and resources common to both variants: the current snapshot, the
/// framebuffer, the projection and the shared GPU objects.
struct RendererCore {
    label: &'static str,
    wrap_u: bool,
    color: [f32; 4],
    lifecycle: Lifecycle,
    current: RenderSnapshot,
    target: Option<RenderTarget>,
    device_max_texture_size: Option<u32>,
}

impl RendererCore {
    fn new(label: &'static str, wrap_u: bool, color: [f32; 4]) -> Self {
        Self {
            label,
            wrap_u,
            color,
            lifecycle: Lifecycle::Uninitialized,
            current: RenderSnapshot::default(),
            target: None,
            device_max_texture_size: None,
        }
    }

    /// Creates GPU resources on first use. A failure is logged once and the
    /// renderer stays inert.
    fn ensure_ready(&mut self, ctx: RenderContext<'_>) -> bool {
        if let Lifecycle::Uninitialized = self.lifecycle {
            self.device_max_texture_size = Some(ctx.device.limits().max_texture_dimension_2d);
            self.lifecycle = match GpuResources::new(ctx, self.label, self.wrap_u) {
                Ok(resources) => {
                    log::debug!(
                        "{} initialised, device max texture size {:?}",
                        self.label,
                        self.device_max_texture_size
                    );
                    Lifecycle::Ready(Box::new(resources))
                }
                Err(err) => {
                    log::error!("{} unavailable: {err}", self.label);
                    Lifecycle::Failed
                }
            };
        }
        matches!(self.lifecycle, Lifecycle::Ready(_))
    }

    fn resources(&self) -> Option<&GpuResources> {
        match &self.lifecycle {
            Lifecycle::Ready(resources) => Some(resources),
            _ => None,
        }
    }

    /// Replaces the current snapshot and does the work shared by both
    /// variants: framebuffer on viewport change, projection on view change.
    fn synchronize(&mut self, ctx: RenderContext<'_>, snapshot: RenderSnapshot) -> ChangeSet {
        let changes = resolve_changes(&self.current, &snapshot, self.device_max_texture_size);
        self.current = snapshot;
        if changes.is_empty() {
            return changes;
        }
        log::debug!("{} synchronize: {changes:?}", self.label);

        if changes.viewport {
            self.target = self.current.has_viewport().then(|| {
                RenderTarget::new(
                    ctx.device,
                    self.current.viewport_width,
                    self.current.viewport_height,
                )
            });
        }

        if changes.needs_projection() {
            if let Some(resources) = self.resources() {
                let uniform = PanoramaUniform {
                    matrix: projection(&self.current).to_cols_array_2d(),
                    color: self.color,
                };
                ctx.queue
                    .write_buffer(&resources.uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
            }
        }
        changes
    }

    /// Effective cap for uploads: the requested cap, never above the device.
    fn texture_cap(&self) -> u32 {
        upload_cap(&self.current, self.device_max_texture_size)
    }

    fn frame(&self) -> Option<(&GpuResources, &RenderTarget)> {
        Some((self.resources()?, self.target.as_ref()?))
    }
}

/// The active renderer variant.
pub enum PanoramaRenderer {
    Sphere(SphereRenderer),
    Cube(CubeRenderer),
}

impl PanoramaRenderer {
    pub fn new(kind: RendererKind, decoder: Arc<dyn Decode>) -> Self {
        match kind {
            RendererKind::Sphere => PanoramaRenderer::Sphere(SphereRenderer::new(decoder)),
            RendererKind::Cube => PanoramaRenderer::Cube(CubeRenderer::new(decoder)),
        }
    }

    pub fn kind(&self) -> RendererKind {
        match self {
            PanoramaRenderer::Sphere(_) => RendererKind::Sphere,
            PanoramaRenderer::Cube(_) => RendererKind::Cube,
        }
    }

    pub fn synchronize(&mut self, ctx: RenderContext<'_>, snapshot: RenderSnapshot) -> ChangeSet {
        match self {
            PanoramaRenderer::Sphere(r) => r.synchronize(ctx, snapshot),
            PanoramaRenderer::Cube(r) => r.synchronize(ctx, snapshot),
        }
    }

    /// Returns `false` when nothing could be drawn (no viewport, or the
    /// renderer failed to initialise).
    pub fn draw(&self, ctx: RenderContext<'_>) -> bool {
        match self {
            PanoramaRenderer::Sphere(r) => r.draw(ctx),
            PanoramaRenderer::Cube(r) => r.draw(ctx),
        }
    }

    fn core(&self) -> &RendererCore {
        match self {
            PanoramaRenderer::Sphere(r) => &r.core,
            PanoramaRenderer::Cube(r) => &r.core,
        }
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.core().target.as_ref()
    }

    pub fn device_max_texture_size(&self) -> Option<u32> {
        self.core().device_max_texture_size
    }
}

/// Outcome of one synchronize + draw cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub changes: ChangeSet,
    /// The variant was torn down and rebuilt this frame.
    pub recreated: bool,
    pub drawn: bool,
}

impl FrameReport {
    /// The framebuffer texture is a different object than last frame.
    pub fn target_replaced(&self) -> bool {
        self.recreated || self.changes.viewport
    }
}

/// Render-context side of the exchange: owns the active variant and swaps it
/// when the requested kind changes.
pub struct RenderHost {
    exchange: FrameExchange,
    decoder: Arc<dyn Decode>,
    active: Option<PanoramaRenderer>,
}

impl RenderHost {
    pub fn new(exchange: FrameExchange, decoder: Arc<dyn Decode>) -> Self {
        Self {
            exchange,
            decoder,
            active: None,
        }
    }

    /// Takes the latest request, if any, and brings the GPU up to date with
    /// it. Returns `None` when nothing was requested since the last frame.
    pub fn render_frame(&mut self, ctx: RenderContext<'_>) -> Option<FrameReport> {
        let request = self.exchange.take()?;

        let recreated = match &self.active {
            Some(active) if active.kind() == request.kind => false,
            previous => {
                if let Some(previous) = previous {
                    log::info!(
                        "switching renderer {:?} -> {:?}",
                        previous.kind(),
                        request.kind
                    );
                }
                true
            }
        };
        if recreated {
            self.active = None; // release the old variant's GPU resources first
        }
        let renderer = self
            .active
            .get_or_insert_with(|| PanoramaRenderer::new(request.kind, self.decoder.clone()));

        let changes = renderer.synchronize(ctx, request.snapshot);
        if let Some(max) = renderer.device_max_texture_size() {
            self.exchange.limits().set_max_texture_size(max);
        }
        let drawn = renderer.draw(ctx);

        Some(FrameReport {
            changes,
            recreated,
            drawn,
        })
    }

    pub fn active(&self) -> Option<&PanoramaRenderer> {
        self.active.as_ref()
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.active.as_ref()?.target()
    }
}
