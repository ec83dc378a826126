// Control side end to end: files on disk -> item -> exchange -> diff.

use photosphere::snapshot::diff;
use photosphere::{
    CubeFace, FrameExchange, LoadError, Notification, PhotoSphere, RenderSnapshot, RendererKind,
    Source,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 40, 255]))
        .save(&path)
        .unwrap();
    path
}

fn cube_dir(dir: &Path, size: u32) -> Vec<(String, String)> {
    CubeFace::ALL
        .into_iter()
        .map(|face| {
            let path = write_png(dir, &format!("{}.png", face.key()), size, size);
            (face.key().to_string(), path.display().to_string())
        })
        .collect()
}

#[test]
fn source_switches_flow_through_the_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let pano = write_png(dir.path(), "pano.png", 64, 32);

    let mut item = PhotoSphere::default();
    let exchange = FrameExchange::new();
    item.set_size(320, 200);
    item.set_source(&Source::single(pano.display().to_string()))
        .unwrap();
    assert!(item.publish(&exchange));

    let first = exchange.take().unwrap();
    assert_eq!(first.kind, RendererKind::Sphere);
    let changes = diff(&RenderSnapshot::default(), &first.snapshot);
    assert!(changes.viewport && changes.image && !changes.cube_faces);
    assert!(changes.needs_image_upload());

    item.set_azimuth(45.0);
    item.set_field_of_view(60.0);
    item.publish(&exchange);
    let second = exchange.take().unwrap();
    let changes = diff(&first.snapshot, &second.snapshot);
    assert!(changes.view && !changes.image && !changes.viewport);
    assert!(changes.needs_projection() && !changes.needs_image_upload());

    let faces = cube_dir(dir.path(), 16);
    item.set_source(&Source::cube_map(faces.clone())).unwrap();
    item.publish(&exchange);
    let third = exchange.take().unwrap();
    assert_eq!(third.kind, RendererKind::Cube);
    assert!(third.snapshot.image.is_none());
    assert!(third.snapshot.cube_faces.is_some());
    assert_eq!(item.source(), Some(Source::cube_map(faces)));
    assert_eq!(item.implicit_size(), (16, 16));
}

#[test]
fn rejected_sources_leave_the_next_frame_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut faces = cube_dir(dir.path(), 8);

    let mut item = PhotoSphere::default();
    let exchange = FrameExchange::new();
    item.set_size(100, 100);
    item.set_source(&Source::cube_map(faces.clone())).unwrap();
    item.publish(&exchange);
    let before = exchange.take().unwrap();
    item.take_notifications();

    // unreadable face
    std::fs::write(dir.path().join("broken.png"), b"not an image").unwrap();
    faces[2].1 = dir.path().join("broken.png").display().to_string();
    let err = item.set_source(&Source::cube_map(faces)).unwrap_err();
    assert!(matches!(err, LoadError::Decode { .. }));

    // missing file
    let missing = dir.path().join("nope.png").display().to_string();
    let err = item.set_source(&Source::single(missing)).unwrap_err();
    assert!(matches!(err, LoadError::Fetch { .. }));

    assert!(item.take_notifications().is_empty());
    assert!(!item.publish(&exchange));
    assert_eq!(item.snapshot(), before.snapshot);
    assert_eq!(item.renderer_kind(), RendererKind::Cube);
}

#[test]
fn file_urls_and_remote_schemes() {
    let dir = tempfile::tempdir().unwrap();
    let pano = write_png(dir.path(), "pano.png", 8, 4);

    let mut item = PhotoSphere::default();
    item.set_source(&Source::single(format!("file://{}", pano.display())))
        .unwrap();
    assert_eq!(item.implicit_size(), (8, 4));

    let err = item
        .set_source(&Source::single("https://example.com/pano.jpg"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Fetch { .. }));
    assert!(err.to_string().contains("https"));
}

#[test]
fn device_limit_reaches_the_control_side() {
    let mut item = PhotoSphere::default();
    let exchange = FrameExchange::new();
    item.set_maximum_texture_size(8192);
    item.take_notifications();

    // what a render context does after its first initialisation
    let render_side = exchange.clone();
    thread::spawn(move || render_side.limits().set_max_texture_size(4096))
        .join()
        .unwrap();

    item.publish(&exchange);
    assert_eq!(item.maximum_texture_size(), 4096);
    assert_eq!(
        item.take_notifications(),
        vec![Notification::MaximumTextureSizeChanged(4096)]
    );
    assert_eq!(exchange.take().unwrap().snapshot.max_texture_size, 4096);
}

#[test]
fn render_thread_sees_latest_snapshot_only() {
    let mut item = PhotoSphere::default();
    let exchange = FrameExchange::new();
    item.set_size(10, 10);

    for azimuth in 1..=50 {
        item.set_azimuth(azimuth as f64);
        item.publish(&exchange);
    }

    let render_side = exchange.clone();
    let seen = thread::spawn(move || {
        let request = render_side.wait(Duration::from_secs(5));
        let again = render_side.wait(Duration::from_millis(20));
        (request.map(|r| r.snapshot.azimuth), again.is_none())
    })
    .join()
    .unwrap();
    assert_eq!(seen, (Some(50.0), true));
}
