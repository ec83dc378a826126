// snapshot.rs — the per-frame copy of render state and the diff between two copies

use crate::face::CubeFace;
use std::sync::Arc;

/// Encoded image bytes, cheap to clone. Two handles to the same allocation
/// compare equal without touching the bytes.
#[derive(Clone)]
pub struct SharedBytes(Arc<[u8]>);

impl SharedBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn is_shared_with(&self, other: &SharedBytes) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SharedBytes {
    fn eq(&self, other: &Self) -> bool {
        self.is_shared_with(other) || self.0[..] == other.0[..]
    }
}

impl Eq for SharedBytes {}

impl std::fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedBytes({} bytes)", self.0.len())
    }
}

/// Encoded bytes for all six faces, indexed by `CubeFace`. Only ever built
/// complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeFaceBytes([SharedBytes; CubeFace::COUNT]);

impl CubeFaceBytes {
    pub fn new(faces: [SharedBytes; CubeFace::COUNT]) -> Self {
        Self(faces)
    }

    pub fn face(&self, face: CubeFace) -> &SharedBytes {
        &self.0[face.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CubeFace, &SharedBytes)> {
        CubeFace::ALL.into_iter().zip(self.0.iter())
    }
}

/// Everything the renderer may read, copied at the frame boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSnapshot {
    pub azimuth: f32,
    pub elevation: f32,
    pub fov: f32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub image: Option<SharedBytes>,
    pub cube_faces: Option<CubeFaceBytes>,
    pub max_texture_size: u32,
}

impl Default for RenderSnapshot {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            fov: crate::panorama::DEFAULT_FIELD_OF_VIEW as f32,
            viewport_width: 0,
            viewport_height: 0,
            image: None,
            cube_faces: None,
            max_texture_size: u32::MAX,
        }
    }
}

impl RenderSnapshot {
    pub fn aspect_ratio(&self) -> f32 {
        if self.viewport_height == 0 {
            return 1.0;
        }
        self.viewport_width as f32 / self.viewport_height as f32
    }

    pub fn has_viewport(&self) -> bool {
        self.viewport_width > 0 && self.viewport_height > 0
    }
}

/// What differs between two snapshots, and therefore what GPU work is due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Framebuffer must be recreated.
    pub viewport: bool,
    pub image: bool,
    pub cube_faces: bool,
    pub max_texture_size: bool,
    /// Azimuth, elevation or fov: projection only.
    pub view: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        *self == ChangeSet::default()
    }

    pub fn needs_projection(&self) -> bool {
        self.view || self.viewport
    }

    pub fn needs_image_upload(&self) -> bool {
        self.image || self.max_texture_size
    }

    pub fn needs_cube_upload(&self) -> bool {
        self.cube_faces || self.max_texture_size
    }
}

pub fn diff(old: &RenderSnapshot, new: &RenderSnapshot) -> ChangeSet {
    ChangeSet {
        viewport: old.viewport_width != new.viewport_width
            || old.viewport_height != new.viewport_height,
        image: old.image != new.image,
        cube_faces: old.cube_faces != new.cube_faces,
        max_texture_size: old.max_texture_size != new.max_texture_size,
        view: old.azimuth != new.azimuth
            || old.elevation != new.elevation
            || old.fov != new.fov,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faces(tag: u8) -> CubeFaceBytes {
        CubeFaceBytes::new(std::array::from_fn(|i| {
            SharedBytes::new(vec![tag, i as u8])
        }))
    }

    fn snapshot() -> RenderSnapshot {
        RenderSnapshot {
            azimuth: 10.0,
            elevation: -5.0,
            fov: 60.0,
            viewport_width: 800,
            viewport_height: 600,
            image: Some(SharedBytes::new(vec![1, 2, 3])),
            cube_faces: None,
            max_texture_size: 4096,
        }
    }

    #[test]
    fn identical_snapshots_yield_no_work() {
        let a = snapshot();
        let b = a.clone();
        assert!(diff(&a, &b).is_empty());
        assert!(diff(&RenderSnapshot::default(), &RenderSnapshot::default()).is_empty());
    }

    #[test]
    fn angle_changes_only_touch_projection() {
        let a = snapshot();
        let mut b = a.clone();
        b.azimuth = 11.0;
        b.fov = 70.0;
        let changes = diff(&a, &b);
        assert!(changes.view);
        assert!(changes.needs_projection());
        assert!(!changes.needs_image_upload());
        assert!(!changes.needs_cube_upload());
        assert!(!changes.viewport);
    }

    #[test]
    fn viewport_and_texture_cap_flags() {
        let a = snapshot();
        let mut b = a.clone();
        b.viewport_height = 601;
        b.max_texture_size = 2048;
        let changes = diff(&a, &b);
        assert!(changes.viewport && changes.max_texture_size);
        assert!(changes.needs_image_upload() && changes.needs_cube_upload());
        assert!(!changes.image && !changes.view);
    }

    #[test]
    fn shared_bytes_compare_by_identity_then_content() {
        let a = SharedBytes::new(vec![9; 64]);
        let same = a.clone();
        let copy = SharedBytes::new(vec![9; 64]);
        let other = SharedBytes::new(vec![8; 64]);
        assert!(a.is_shared_with(&same));
        assert!(!a.is_shared_with(&copy));
        assert_eq!(a, copy);
        assert_ne!(a, other);
    }

    #[test]
    fn replacing_image_flags_upload() {
        let a = snapshot();
        let mut b = a.clone();
        b.image = Some(SharedBytes::new(vec![4, 5, 6]));
        assert!(diff(&a, &b).image);

        let mut c = a.clone();
        c.image = None;
        c.cube_faces = Some(faces(1));
        let changes = diff(&a, &c);
        assert!(changes.image && changes.cube_faces);

        let mut d = c.clone();
        d.cube_faces = Some(faces(2));
        assert!(diff(&c, &d).cube_faces);
        assert!(!diff(&c, &d).image);
    }

    #[test]
    fn zero_height_viewport_has_unit_aspect() {
        let mut s = snapshot();
        assert!((s.aspect_ratio() - 800.0 / 600.0).abs() < 1e-6);
        s.viewport_height = 0;
        assert_eq!(s.aspect_ratio(), 1.0);
        assert!(!s.has_viewport());
    }
}
