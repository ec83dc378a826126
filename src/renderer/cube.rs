// cube.rs — six face textures on the inside of a unit cube

use super::{RenderContext, RendererCore};
use crate::face::CubeFace;
use crate::mesh::CubeGeometry;
use crate::snapshot::{ChangeSet, RenderSnapshot};
use crate::source::Decode;
use crate::texture::{self, PanoramaTexture, PreparedTexture};
use std::sync::Arc;

pub struct CubeRenderer {
    pub(super) core: RendererCore,
    geometry: CubeGeometry,
    /// Replaced as a whole; never a mix of old and new faces.
    faces: Option<Vec<PanoramaTexture>>,
    decoder: Arc<dyn Decode>,
}

impl CubeRenderer {
    pub fn new(decoder: Arc<dyn Decode>) -> Self {
        Self {
            core: RendererCore::new("cube renderer", false, [1.0, 1.0, 1.0, 1.0]),
            geometry: CubeGeometry::new(),
            faces: None,
            decoder,
        }
    }

    pub fn synchronize(&mut self, ctx: RenderContext<'_>, snapshot: RenderSnapshot) -> ChangeSet {
        if !self.core.ensure_ready(ctx) {
            return ChangeSet::default();
        }
        self.geometry.init(ctx.device);

        let changes = self.core.synchronize(ctx, snapshot);
        if changes.needs_cube_upload() {
            self.upload(ctx);
        }
        changes
    }

    /// Decodes all six faces first; uploads only if every face decoded.
    fn upload(&mut self, ctx: RenderContext<'_>) {
        let Some(resources) = self.core.resources() else {
            return;
        };
        let Some(table) = &self.core.current.cube_faces else {
            self.faces = None;
            return;
        };
        let cap = self.core.texture_cap();

        let mut prepared: Vec<PreparedTexture> = Vec::with_capacity(CubeFace::COUNT);
        for (face, bytes) in table.iter() {
            match texture::decode_and_prepare(self.decoder.as_ref(), bytes.as_slice(), cap) {
                Ok(p) => prepared.push(p),
                Err(err) => {
                    log::warn!("keeping previous cube faces, {face} failed: {err}");
                    return;
                }
            }
        }

        let faces = CubeFace::ALL
            .into_iter()
            .zip(&prepared)
            .map(|(face, p)| resources.upload(ctx, p, &format!("cube face {face}")))
            .collect();
        log::info!(
            "uploaded cube map, {}x{} per face",
            prepared[0].width(),
            prepared[0].height()
        );
        self.faces = Some(faces);
    }

    pub fn face_size(&self, face: CubeFace) -> Option<(u32, u32)> {
        let t = self.faces.as_ref()?.get(face.index())?;
        Some((t.width, t.height))
    }

    pub fn draw(&self, ctx: RenderContext<'_>) -> bool {
        let Some((resources, target)) = self.core.frame() else {
            return false;
        };
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cube encoder"),
            });
        {
            let mut pass = target.begin_pass(&mut encoder, "cube pass");
            resources.bind(&mut pass);
            self.geometry.bind(&mut pass);
            for face in CubeFace::ALL {
                let texture = self
                    .faces
                    .as_ref()
                    .and_then(|faces| faces.get(face.index()))
                    .unwrap_or(&resources.placeholder);
                pass.set_bind_group(1, &texture.bind_group, &[]);
                self.geometry.draw_face(&mut pass, face);
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
        true
    }
}
