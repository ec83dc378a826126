// texture.rs — decode, fit to the texture cap, build mips and upload

use crate::error::DecodeError;
use crate::source::Decode;
use image::imageops::FilterType;
use image::RgbaImage;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const MAX_ANISOTROPY: u16 = 16;

/// Largest size with the same aspect ratio whose sides both fit in `cap`.
pub fn fit_within(width: u32, height: u32, cap: u32) -> (u32, u32) {
    let cap = cap.max(1);
    if width <= cap && height <= cap {
        return (width, height);
    }
    let longest = u64::from(width.max(height));
    let scale = |side: u32| ((u64::from(side) * u64::from(cap)) / longest).max(1) as u32;
    (scale(width), scale(height))
}

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Pixel data ready for upload: level 0 first, halving down to 1x1.
#[derive(Debug, Clone)]
pub struct PreparedTexture {
    pub levels: Vec<RgbaImage>,
}

impl PreparedTexture {
    pub fn width(&self) -> u32 {
        self.levels[0].width()
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height()
    }
}

/// Downscales with a nearest filter when over the cap, then builds the mip
/// chain.
pub fn prepare(image: RgbaImage, cap: u32) -> PreparedTexture {
    let (src_w, src_h) = image.dimensions();
    let (w, h) = fit_within(src_w, src_h, cap);
    let base = if (w, h) != (src_w, src_h) {
        log::info!("texture {src_w}x{src_h} exceeds {cap}, scaled to {w}x{h}");
        image::imageops::resize(&image, w, h, FilterType::Nearest)
    } else {
        image
    };

    let count = mip_level_count(w, h) as usize;
    let mut levels = Vec::with_capacity(count);
    levels.push(base);
    while levels.len() < count {
        let prev = &levels[levels.len() - 1];
        let next_w = (prev.width() / 2).max(1);
        let next_h = (prev.height() / 2).max(1);
        let next = image::imageops::resize(prev, next_w, next_h, FilterType::Triangle);
        levels.push(next);
    }
    PreparedTexture { levels }
}

pub fn decode_and_prepare(
    decoder: &dyn Decode,
    bytes: &[u8],
    cap: u32,
) -> Result<PreparedTexture, DecodeError> {
    let image = decoder.decode(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::Empty {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(prepare(image, cap))
}

/// Trilinear, anisotropic. The sphere wraps horizontally across the seam;
/// cube faces clamp.
pub fn create_sampler(device: &wgpu::Device, wrap_u: bool, label: &str) -> wgpu::Sampler {
    let address_mode_u = if wrap_u {
        wgpu::AddressMode::Repeat
    } else {
        wgpu::AddressMode::ClampToEdge
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        anisotropy_clamp: MAX_ANISOTROPY,
        ..Default::default()
    })
}

/// A texture on the GPU together with the bind group that samples it.
pub struct PanoramaTexture {
    _texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub width: u32,
    pub height: u32,
}

impl PanoramaTexture {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        prepared: &PreparedTexture,
        label: &str,
    ) -> Self {
        let (width, height) = (prepared.width(), prepared.height());
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: prepared.levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label: Some(label),
            view_formats: &[],
        });

        for (level, img) in prepared.levels.iter().enumerate() {
            let (w, h) = img.dimensions();
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                img,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        }

        let bind_group = Self::bind(device, layout, sampler, &texture, label);
        Self {
            _texture: texture,
            bind_group,
            width,
            height,
        }
    }

    /// 1x1 opaque black, bound whenever no image has been uploaded so that
    /// drawing untextured needs no separate pipeline.
    pub fn placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> Self {
        let prepared = PreparedTexture {
            levels: vec![RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]))],
        };
        Self::upload(device, queue, layout, sampler, &prepared, "placeholder texture")
    }

    fn bind(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        texture: &wgpu::Texture,
        label: &str,
    ) -> wgpu::BindGroup {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some(label),
        })
    }
}
