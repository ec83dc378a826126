// sphere.rs — equirectangular image wrapped on a UV sphere

use super::{RenderContext, RendererCore};
use crate::mesh::SphereGeometry;
use crate::snapshot::{ChangeSet, RenderSnapshot};
use crate::source::Decode;
use crate::texture::{self, PanoramaTexture};
use std::sync::Arc;

pub struct SphereRenderer {
    pub(super) core: RendererCore,
    geometry: SphereGeometry,
    texture: Option<PanoramaTexture>,
    decoder: Arc<dyn Decode>,
}

impl SphereRenderer {
    pub fn new(decoder: Arc<dyn Decode>) -> Self {
        Self {
            core: RendererCore::new("sphere renderer", true, [0.0, 0.0, 0.0, 1.0]),
            geometry: SphereGeometry::new(),
            texture: None,
            decoder,
        }
    }

    pub fn synchronize(&mut self, ctx: RenderContext<'_>, snapshot: RenderSnapshot) -> ChangeSet {
        if !self.core.ensure_ready(ctx) {
            return ChangeSet::default();
        }
        self.geometry.init(ctx.device);

        let changes = self.core.synchronize(ctx, snapshot);
        if changes.needs_image_upload() {
            self.upload(ctx);
        }
        changes
    }

    fn upload(&mut self, ctx: RenderContext<'_>) {
        let Some(resources) = self.core.resources() else {
            return;
        };
        let Some(bytes) = &self.core.current.image else {
            self.texture = None;
            return;
        };
        let cap = self.core.texture_cap();
        match texture::decode_and_prepare(self.decoder.as_ref(), bytes.as_slice(), cap) {
            Ok(prepared) => {
                log::info!(
                    "uploading panorama {}x{} ({} mip levels)",
                    prepared.width(),
                    prepared.height(),
                    prepared.levels.len()
                );
                self.texture = Some(resources.upload(ctx, &prepared, "panorama texture"));
            }
            Err(err) => log::warn!("keeping previous panorama texture: {err}"),
        }
    }

    /// Uploaded texture size, if any.
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture.as_ref().map(|t| (t.width, t.height))
    }

    pub fn draw(&self, ctx: RenderContext<'_>) -> bool {
        let Some((resources, target)) = self.core.frame() else {
            return false;
        };
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sphere encoder"),
            });
        {
            let mut pass = target.begin_pass(&mut encoder, "sphere pass");
            resources.bind(&mut pass);
            // untextured until an image has been uploaded
            let texture = self.texture.as_ref().unwrap_or(&resources.placeholder);
            pass.set_bind_group(1, &texture.bind_group, &[]);
            self.geometry.draw(&mut pass);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        true
    }
}
