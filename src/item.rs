// item.rs — the PhotoSphere scene item: live properties on the control side

use crate::error::LoadResult;
use crate::exchange::{FrameExchange, FrameRequest};
use crate::panorama::ViewerState;
use crate::renderer::RendererKind;
use crate::snapshot::{CubeFaceBytes, RenderSnapshot, SharedBytes};
use crate::source::{self, CubeMapUrls, Source, SourceLoader};
use std::collections::BTreeMap;

/// Large enough to be clamped by any device.
pub const DEFAULT_MAXIMUM_TEXTURE_SIZE: u32 = 65536;

/// Property change notifications, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    AzimuthChanged(f64),
    ElevationChanged(f64),
    FieldOfViewChanged(f64),
    MaximumTextureSizeChanged(u32),
    SourceChanged,
    ImplicitSizeChanged { width: u32, height: u32 },
}

enum Payload {
    Empty,
    Equirectangular {
        url: String,
        bytes: SharedBytes,
    },
    CubeMap {
        urls: CubeMapUrls,
        faces: CubeFaceBytes,
    },
}

/// Owns the viewer state. Edits go through the setters, which validate,
/// notify and mark a frame as pending; `publish` hands the renderer one
/// consistent snapshot per frame.
pub struct PhotoSphere {
    view: ViewerState,
    requested_max_texture_size: u32,
    device_max_texture_size: Option<u32>,
    width: u32,
    height: u32,
    implicit_size: (u32, u32),
    payload: Payload,
    kind: RendererKind,
    loader: SourceLoader,
    notifications: Vec<Notification>,
    update_pending: bool,
}

impl PhotoSphere {
    pub fn new(loader: SourceLoader) -> Self {
        Self {
            view: ViewerState::new(),
            requested_max_texture_size: DEFAULT_MAXIMUM_TEXTURE_SIZE,
            device_max_texture_size: None,
            width: 0,
            height: 0,
            implicit_size: (0, 0),
            payload: Payload::Empty,
            kind: RendererKind::Cube,
            loader,
            notifications: Vec::new(),
            update_pending: true,
        }
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }

    fn notify(&mut self, notification: Notification) {
        log::trace!("{notification:?}");
        self.notifications.push(notification);
    }

    fn request_update(&mut self) {
        self.update_pending = true;
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn is_update_pending(&self) -> bool {
        self.update_pending
    }

    pub fn azimuth(&self) -> f64 {
        self.view.azimuth()
    }

    pub fn set_azimuth(&mut self, azimuth: f64) {
        if self.view.set_azimuth(azimuth) {
            self.request_update();
            self.notify(Notification::AzimuthChanged(self.view.azimuth()));
        }
    }

    pub fn elevation(&self) -> f64 {
        self.view.elevation()
    }

    pub fn set_elevation(&mut self, elevation: f64) {
        if self.view.set_elevation(elevation) {
            self.request_update();
            self.notify(Notification::ElevationChanged(self.view.elevation()));
        }
    }

    pub fn field_of_view(&self) -> f64 {
        self.view.field_of_view()
    }

    pub fn set_field_of_view(&mut self, fov: f64) {
        if self.view.set_field_of_view(fov) {
            self.request_update();
            self.notify(Notification::FieldOfViewChanged(self.view.field_of_view()));
        }
    }

    /// Effective cap: the requested size, clamped by the device once known.
    pub fn maximum_texture_size(&self) -> u32 {
        match self.device_max_texture_size {
            Some(device) => self.requested_max_texture_size.min(device),
            None => self.requested_max_texture_size,
        }
    }

    pub fn requested_maximum_texture_size(&self) -> u32 {
        self.requested_max_texture_size
    }

    pub fn set_maximum_texture_size(&mut self, size: u32) {
        if size == self.requested_max_texture_size {
            return;
        }
        let before = self.maximum_texture_size();
        self.requested_max_texture_size = size;
        self.effective_size_updated(before);
    }

    /// Records the device limit reported by the render context.
    pub fn set_device_max_texture_size(&mut self, device: Option<u32>) {
        if device.is_none() || device == self.device_max_texture_size {
            return;
        }
        let before = self.maximum_texture_size();
        self.device_max_texture_size = device;
        self.effective_size_updated(before);
    }

    fn effective_size_updated(&mut self, before: u32) {
        let after = self.maximum_texture_size();
        if after != before {
            self.request_update();
            self.notify(Notification::MaximumTextureSizeChanged(after));
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.request_update();
        }
    }

    /// Pixel size of the committed source (a face, for cube maps).
    pub fn implicit_size(&self) -> (u32, u32) {
        self.implicit_size
    }

    fn set_implicit_size(&mut self, width: u32, height: u32) {
        if (width, height) != self.implicit_size {
            self.implicit_size = (width, height);
            self.notify(Notification::ImplicitSizeChanged { width, height });
        }
    }

    pub fn renderer_kind(&self) -> RendererKind {
        self.kind
    }

    pub fn source(&self) -> Option<Source> {
        match &self.payload {
            Payload::Empty => None,
            Payload::Equirectangular { url, .. } => Some(Source::Single(url.clone())),
            Payload::CubeMap { urls, .. } => Some(urls.to_source()),
        }
    }

    /// Fetches and validates `source`. On error the committed source is left
    /// exactly as it was.
    pub fn set_source(&mut self, source: &Source) -> LoadResult<()> {
        let result = match source {
            Source::Single(url) => self.load_from_url(url),
            Source::CubeMap(map) => self.load_from_cube_map(map),
        };
        if let Err(err) = &result {
            log::warn!("failed setting source: {err}");
        }
        result
    }

    fn load_from_url(&mut self, url: &str) -> LoadResult<()> {
        if let Payload::Equirectangular { url: current, .. } = &self.payload {
            if current == url {
                return Ok(());
            }
        }
        let loaded = self.loader.load_single_image(url)?;
        self.payload = Payload::Equirectangular {
            url: loaded.url,
            bytes: loaded.bytes,
        };
        self.commit(RendererKind::Sphere, loaded.width, loaded.height);
        Ok(())
    }

    fn load_from_cube_map(&mut self, map: &BTreeMap<String, serde_json::Value>) -> LoadResult<()> {
        let urls = source::parse_cube_map(map)?;
        if let Payload::CubeMap { urls: current, .. } = &self.payload {
            if *current == urls {
                return Ok(());
            }
        }
        let loaded = self.loader.load_cube_faces(urls)?;
        self.payload = Payload::CubeMap {
            urls: loaded.urls,
            faces: loaded.faces,
        };
        self.commit(RendererKind::Cube, loaded.face_width, loaded.face_height);
        Ok(())
    }

    fn commit(&mut self, kind: RendererKind, width: u32, height: u32) {
        if kind != self.kind {
            log::debug!("renderer kind {:?} -> {kind:?}, renderer will be recreated", self.kind);
            self.kind = kind;
        }
        self.set_implicit_size(width, height);
        self.request_update();
        self.notify(Notification::SourceChanged);
    }

    /// Point-in-time copy of everything the renderer needs.
    pub fn snapshot(&self) -> RenderSnapshot {
        let (image, cube_faces) = match &self.payload {
            Payload::Empty => (None, None),
            Payload::Equirectangular { bytes, .. } => (Some(bytes.clone()), None),
            Payload::CubeMap { faces, .. } => (None, Some(faces.clone())),
        };
        RenderSnapshot {
            azimuth: self.view.azimuth() as f32,
            elevation: self.view.elevation() as f32,
            fov: self.view.field_of_view() as f32,
            viewport_width: self.width,
            viewport_height: self.height,
            image,
            cube_faces,
            max_texture_size: self.maximum_texture_size(),
        }
    }

    /// Frame boundary on the control side: picks up the device limit the
    /// render context reported, then publishes a snapshot if anything changed
    /// since the last one.
    pub fn publish(&mut self, exchange: &FrameExchange) -> bool {
        self.set_device_max_texture_size(exchange.limits().max_texture_size());
        if !self.update_pending {
            return false;
        }
        self.update_pending = false;
        exchange.publish(FrameRequest {
            kind: self.kind,
            snapshot: self.snapshot(),
        });
        true
    }
}

impl Default for PhotoSphere {
    fn default() -> Self {
        Self::new(SourceLoader::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::face::CubeFace;
    use crate::source::testing::*;
    use crate::source::ImageDecoder;
    use std::sync::Arc;

    fn item_with_faces() -> (Arc<MapFetcher>, PhotoSphere) {
        let (fetcher, loader) = loader_with_faces("mem");
        fetcher.insert("mem/a.png", png(16, 8, 1));
        fetcher.insert("mem/b.png", png(32, 16, 2));
        (fetcher, PhotoSphere::new(loader))
    }

    #[test]
    fn setters_notify_only_on_change() {
        let mut item = PhotoSphere::default();
        item.set_azimuth(370.0);
        item.set_azimuth(10.0);
        item.set_elevation(-120.0);
        item.set_elevation(f64::NAN);
        item.set_field_of_view(200.0);
        item.set_field_of_view(60.0);
        assert_eq!(
            item.take_notifications(),
            vec![
                Notification::AzimuthChanged(10.0),
                Notification::ElevationChanged(-90.0),
                Notification::FieldOfViewChanged(60.0),
            ]
        );
        assert!(item.take_notifications().is_empty());
    }

    #[test]
    fn single_image_commits_and_switches_kind() {
        let (_, mut item) = item_with_faces();
        assert_eq!(item.renderer_kind(), RendererKind::Cube);
        item.set_source(&Source::single("mem/a.png")).unwrap();
        assert_eq!(item.renderer_kind(), RendererKind::Sphere);
        assert_eq!(item.source(), Some(Source::single("mem/a.png")));
        assert_eq!(item.implicit_size(), (16, 8));
        assert!(item.snapshot().image.is_some());
        assert!(item.snapshot().cube_faces.is_none());
        assert_eq!(
            item.take_notifications(),
            vec![
                Notification::ImplicitSizeChanged {
                    width: 16,
                    height: 8
                },
                Notification::SourceChanged,
            ]
        );
    }

    #[test]
    fn resetting_same_url_is_free() {
        let (fetcher, mut item) = item_with_faces();
        item.set_source(&Source::single("mem/a.png")).unwrap();
        let calls = fetcher.calls();
        item.take_notifications();
        let exchange = FrameExchange::new();
        item.publish(&exchange);

        item.set_source(&Source::single("mem/a.png")).unwrap();
        assert_eq!(fetcher.calls(), calls);
        assert!(item.take_notifications().is_empty());
        assert!(!item.is_update_pending());
    }

    #[test]
    fn resetting_same_cube_map_is_free() {
        let (fetcher, mut item) = item_with_faces();
        let cube = Source::cube_map(face_urls("mem"));
        item.set_source(&cube).unwrap();
        assert_eq!(fetcher.calls(), 6);
        item.take_notifications();

        item.set_source(&cube).unwrap();
        item.set_source(&item.source().unwrap()).unwrap();
        assert_eq!(fetcher.calls(), 6);
        assert!(item.take_notifications().is_empty());
    }

    #[test]
    fn cube_map_read_back_keeps_only_face_keys() {
        let (fetcher, mut item) = item_with_faces();
        let mut entries = face_urls("mem");
        entries.push(("Thumbnail".to_string(), "mem/a.png".to_string()));
        item.set_source(&Source::cube_map(entries)).unwrap();
        assert_eq!(fetcher.calls(), 6);
        assert_eq!(item.source(), Some(Source::cube_map(face_urls("mem"))));
    }

    #[test]
    fn cube_map_missing_face_leaves_state_untouched() {
        let (fetcher, mut item) = item_with_faces();
        item.set_source(&Source::cube_map(face_urls("mem"))).unwrap();
        let before = item.snapshot();
        item.take_notifications();

        fetcher.insert("mem2/PositiveX.png", png(4, 4, 9));
        let mut partial = face_urls("mem2");
        partial.retain(|(k, _)| k != "NegativeZ");
        let err = item.set_source(&Source::cube_map(partial)).unwrap_err();
        assert!(matches!(err, LoadError::MissingFace { ref missing } if missing == &[CubeFace::NegativeZ]));
        assert_eq!(item.snapshot(), before);
        assert_eq!(item.source(), Some(Source::cube_map(face_urls("mem"))));
        assert!(item.take_notifications().is_empty());
    }

    #[test]
    fn failed_single_image_keeps_previous() {
        let (_, mut item) = item_with_faces();
        item.set_source(&Source::single("mem/a.png")).unwrap();
        let before = item.snapshot();
        assert!(item.set_source(&Source::single("mem/missing.png")).is_err());
        assert!(item.set_source(&Source::single("")).is_err());
        assert_eq!(item.snapshot(), before);
        assert_eq!(item.renderer_kind(), RendererKind::Sphere);
    }

    #[test]
    fn switching_kinds_clears_the_other_payload() {
        let (_, mut item) = item_with_faces();
        item.set_source(&Source::single("mem/a.png")).unwrap();
        item.set_source(&Source::cube_map(face_urls("mem"))).unwrap();
        let snapshot = item.snapshot();
        assert!(snapshot.image.is_none());
        assert!(snapshot.cube_faces.is_some());
        assert_eq!(item.renderer_kind(), RendererKind::Cube);

        item.set_source(&Source::single("mem/b.png")).unwrap();
        let snapshot = item.snapshot();
        assert!(snapshot.image.is_some() && snapshot.cube_faces.is_none());
        assert_eq!(item.implicit_size(), (32, 16));
    }

    #[test]
    fn effective_texture_size_follows_device() {
        let mut item = PhotoSphere::new(SourceLoader::new(
            Arc::new(MapFetcher::default()),
            Arc::new(ImageDecoder),
        ));
        item.set_device_max_texture_size(Some(4096));
        item.take_notifications();

        item.set_maximum_texture_size(8192);
        assert_eq!(item.maximum_texture_size(), 4096);
        assert!(item.take_notifications().is_empty());

        item.set_device_max_texture_size(Some(16384));
        assert_eq!(
            item.take_notifications(),
            vec![Notification::MaximumTextureSizeChanged(8192)]
        );
        assert_eq!(item.maximum_texture_size(), 8192);

        item.set_device_max_texture_size(Some(32768));
        assert!(item.take_notifications().is_empty());

        item.set_maximum_texture_size(2048);
        assert_eq!(
            item.take_notifications(),
            vec![Notification::MaximumTextureSizeChanged(2048)]
        );
    }

    #[test]
    fn device_discovery_notifies_once_through_exchange() {
        let mut item = PhotoSphere::default();
        let exchange = FrameExchange::new();
        assert_eq!(item.maximum_texture_size(), DEFAULT_MAXIMUM_TEXTURE_SIZE);
        assert!(item.publish(&exchange));

        exchange.limits().set_max_texture_size(8192);
        assert!(item.publish(&exchange));
        assert!(!item.publish(&exchange));
        assert_eq!(
            item.take_notifications(),
            vec![Notification::MaximumTextureSizeChanged(8192)]
        );
        assert_eq!(exchange.take().unwrap().snapshot.max_texture_size, 8192);
    }

    #[test]
    fn edits_between_frames_coalesce() {
        let mut item = PhotoSphere::default();
        let exchange = FrameExchange::new();
        item.set_size(640, 480);
        item.publish(&exchange);
        exchange.take();

        item.set_azimuth(10.0);
        item.set_azimuth(20.0);
        item.set_elevation(5.0);
        assert!(item.publish(&exchange));
        assert!(!item.publish(&exchange));
        let request = exchange.take().unwrap();
        assert_eq!(request.snapshot.azimuth, 20.0);
        assert_eq!(request.snapshot.elevation, 5.0);
        assert_eq!(
            (request.snapshot.viewport_width, request.snapshot.viewport_height),
            (640, 480)
        );
        assert!(exchange.take().is_none());
    }
}
