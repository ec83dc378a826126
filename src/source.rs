// source.rs — source grammar, fetch/decode collaborators and the source loader

use crate::error::{DecodeError, FetchError, LoadError, LoadResult};
use crate::face::CubeFace;
use crate::snapshot::{CubeFaceBytes, SharedBytes};
use image::io::Reader as ImageReader;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

/// Value of the `source` property: one equirectangular image, or a mapping
/// from the six face keys to urls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Single(String),
    CubeMap(BTreeMap<String, serde_json::Value>),
}

impl Source {
    pub fn single(url: impl Into<String>) -> Self {
        Source::Single(url.into())
    }

    pub fn cube_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Source::CubeMap(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), serde_json::Value::String(v.into())))
                .collect(),
        )
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// A parsed source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    File(PathBuf),
    Remote { scheme: String, location: String },
}

impl SourceUrl {
    pub fn parse(raw: &str) -> LoadResult<SourceUrl> {
        let invalid = |reason| LoadError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        if raw.trim().is_empty() {
            return Err(invalid("empty"));
        }
        if raw.chars().any(char::is_control) {
            return Err(invalid("contains control characters"));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(SourceUrl::File(PathBuf::from(raw)));
        };

        let mut chars = scheme.chars();
        let well_formed = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !well_formed {
            return Err(invalid("malformed scheme"));
        }
        if rest.is_empty() {
            return Err(invalid("missing location"));
        }

        if scheme.eq_ignore_ascii_case("file") {
            let path = percent_decode(rest).ok_or_else(|| invalid("malformed percent escape"))?;
            if path.chars().any(char::is_control) {
                return Err(invalid("contains control characters"));
            }
            Ok(SourceUrl::File(PathBuf::from(path)))
        } else {
            Ok(SourceUrl::Remote {
                scheme: scheme.to_ascii_lowercase(),
                location: rest.to_string(),
            })
        }
    }
}

/// Decodes `%XX` escapes. `None` on a truncated or non-hex escape, or when
/// the result is not UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Retrieves the bytes behind a url. Blocking; only ever called from the
/// control context when the source changes.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &SourceUrl) -> Result<Vec<u8>, FetchError>;
}

/// Turns encoded bytes into RGBA pixels.
pub trait Decode: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError>;
}

/// Reads local files; `file://` urls and bare paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl Fetch for FileFetcher {
    fn fetch(&self, url: &SourceUrl) -> Result<Vec<u8>, FetchError> {
        match url {
            SourceUrl::File(path) => {
                log::debug!("reading {}", path.display());
                Ok(std::fs::read(path)?)
            }
            SourceUrl::Remote { scheme, .. } => Err(FetchError::UnsupportedScheme(scheme.clone())),
        }
    }
}

/// `image` crate decoder, format guessed from content, no size limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl Decode for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)
            .and_then(|mut r| {
                r.no_limits();
                r.decode()
            })?;
        let rgba = img.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(DecodeError::Empty {
                width: rgba.width(),
                height: rgba.height(),
            });
        }
        Ok(rgba)
    }
}

/// The six face urls of a validated cube-map source, indexed by `CubeFace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubeMapUrls([String; CubeFace::COUNT]);

impl CubeMapUrls {
    pub fn url(&self, face: CubeFace) -> &str {
        &self.0[face.index()]
    }

    pub fn to_source(&self) -> Source {
        Source::cube_map(CubeFace::ALL.map(|f| (f.key(), self.url(f).to_string())))
    }
}

/// Checks keys, value types and url syntax of a cube-map mapping. Nothing is
/// fetched.
pub fn parse_cube_map(map: &BTreeMap<String, serde_json::Value>) -> LoadResult<CubeMapUrls> {
    let missing: Vec<CubeFace> = CubeFace::ALL
        .into_iter()
        .filter(|f| !map.contains_key(f.key()))
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingFace { missing });
    }

    for key in map.keys().filter(|k| CubeFace::from_key(k).is_none()) {
        log::warn!("ignoring unknown cube map key {key:?}");
    }

    let mut urls: [String; CubeFace::COUNT] = Default::default();
    for face in CubeFace::ALL {
        let Some(serde_json::Value::String(url)) = map.get(face.key()) else {
            return Err(LoadError::InvalidFaceValue { face });
        };
        urls[face.index()] = url.clone();
    }
    for url in &urls {
        SourceUrl::parse(url)?;
    }
    Ok(CubeMapUrls(urls))
}

/// An equirectangular source that fetched and decoded cleanly.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub url: String,
    pub bytes: SharedBytes,
    pub width: u32,
    pub height: u32,
}

/// All six faces of a cube map, fetched and decoded cleanly.
#[derive(Debug, Clone)]
pub struct LoadedCubeMap {
    pub urls: CubeMapUrls,
    pub faces: CubeFaceBytes,
    pub face_width: u32,
    pub face_height: u32,
}

/// Validates sources by fetching and decoding them, but keeps only the
/// encoded bytes; pixels are decoded again at upload time.
#[derive(Clone)]
pub struct SourceLoader {
    fetcher: Arc<dyn Fetch>,
    decoder: Arc<dyn Decode>,
}

impl SourceLoader {
    pub fn new(fetcher: Arc<dyn Fetch>, decoder: Arc<dyn Decode>) -> Self {
        Self { fetcher, decoder }
    }

    pub fn decoder(&self) -> Arc<dyn Decode> {
        self.decoder.clone()
    }

    pub fn load_single_image(&self, url: &str) -> LoadResult<LoadedImage> {
        let parsed = SourceUrl::parse(url)?;
        let (bytes, width, height) = self.fetch_and_validate(url, &parsed)?;
        log::info!("loaded {url} ({width}x{height})");
        Ok(LoadedImage {
            url: url.to_string(),
            bytes,
            width,
            height,
        })
    }

    pub fn load_cube_map(
        &self,
        map: &BTreeMap<String, serde_json::Value>,
    ) -> LoadResult<LoadedCubeMap> {
        let urls = parse_cube_map(map)?;
        self.load_cube_faces(urls)
    }

    /// All or nothing: the first failing face aborts the whole load.
    pub fn load_cube_faces(&self, urls: CubeMapUrls) -> LoadResult<LoadedCubeMap> {
        let mut faces: Vec<SharedBytes> = Vec::with_capacity(CubeFace::COUNT);
        let mut face_size = (0, 0);
        for face in CubeFace::ALL {
            let url = urls.url(face);
            let parsed = SourceUrl::parse(url)?;
            let (bytes, width, height) = self.fetch_and_validate(url, &parsed)?;
            if face_size == (0, 0) {
                face_size = (width, height);
            } else if face_size != (width, height) {
                log::warn!(
                    "cube face {face} is {width}x{height}, expected {}x{}",
                    face_size.0,
                    face_size.1
                );
            }
            faces.push(bytes);
        }
        let faces: [SharedBytes; CubeFace::COUNT] = faces
            .try_into()
            .unwrap_or_else(|_| unreachable!("one entry per face"));
        log::info!("loaded cube map ({}x{} per face)", face_size.0, face_size.1);
        Ok(LoadedCubeMap {
            urls,
            faces: CubeFaceBytes::new(faces),
            face_width: face_size.0,
            face_height: face_size.1,
        })
    }

    fn fetch_and_validate(
        &self,
        url: &str,
        parsed: &SourceUrl,
    ) -> LoadResult<(SharedBytes, u32, u32)> {
        let data = self.fetcher.fetch(parsed).map_err(|source| LoadError::Fetch {
            url: url.to_string(),
            source,
        })?;
        let decode_err = |source| LoadError::Decode {
            url: url.to_string(),
            source,
        };
        let image = self.decoder.decode(&data).map_err(decode_err)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(decode_err(DecodeError::Empty { width, height }));
        }
        Ok((SharedBytes::new(data), width, height))
    }
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new(Arc::new(FileFetcher), Arc::new(ImageDecoder))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn grammar_accepts_string_or_mapping() {
        assert_eq!(
            Source::from_json(r#""file:///tmp/pano.jpg""#).unwrap(),
            Source::single("file:///tmp/pano.jpg")
        );
        let cube = Source::from_json(
            r#"{"PositiveX":"a","PositiveY":"b","PositiveZ":"c",
                "NegativeX":"d","NegativeY":"e","NegativeZ":"f"}"#,
        )
        .unwrap();
        let Source::CubeMap(map) = cube else {
            panic!("expected cube map");
        };
        assert_eq!(map.len(), 6);
        assert!(Source::from_json("42").is_err());
    }

    #[test]
    fn url_parsing() {
        assert_eq!(
            SourceUrl::parse("file:///data/p.jpg").unwrap(),
            SourceUrl::File(PathBuf::from("/data/p.jpg"))
        );
        assert_eq!(
            SourceUrl::parse("pano.png").unwrap(),
            SourceUrl::File(PathBuf::from("pano.png"))
        );
        assert!(matches!(
            SourceUrl::parse("HTTPS://host/p.jpg").unwrap(),
            SourceUrl::Remote { ref scheme, .. } if scheme == "https"
        ));
        assert_eq!(
            SourceUrl::parse("file:///tmp/my%20pano%2Bv2.jpg").unwrap(),
            SourceUrl::File(PathBuf::from("/tmp/my pano+v2.jpg"))
        );
        // plain paths are taken literally
        assert_eq!(
            SourceUrl::parse("100%.png").unwrap(),
            SourceUrl::File(PathBuf::from("100%.png"))
        );
        for bad in [
            "",
            "   ",
            "1http://x",
            "ht tp://x",
            "file://",
            "a\nb",
            "file:///a%2",
            "file:///a%zz.png",
            "file:///a%0Ab",
            "file:///%FF.png",
        ] {
            assert!(
                matches!(SourceUrl::parse(bad), Err(LoadError::InvalidUrl { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn single_image_loads_bytes_unchanged() {
        let fetcher = Arc::new(MapFetcher::default());
        let bytes = png(8, 4, 10);
        fetcher.insert("mem/pano.png", bytes.clone());
        let loader = SourceLoader::new(fetcher.clone(), Arc::new(ImageDecoder));

        let loaded = loader.load_single_image("mem/pano.png").unwrap();
        assert_eq!(loaded.bytes.as_slice(), &bytes[..]);
        assert_eq!((loaded.width, loaded.height), (8, 4));
        assert_eq!(loaded.url, "mem/pano.png");
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn single_image_error_kinds() {
        let fetcher = Arc::new(MapFetcher::default());
        fetcher.insert("mem/garbage.png", b"not an image".to_vec());
        let loader = SourceLoader::new(fetcher.clone(), Arc::new(ImageDecoder));

        assert!(matches!(
            loader.load_single_image(""),
            Err(LoadError::InvalidUrl { .. })
        ));
        assert_eq!(fetcher.calls(), 0);
        assert!(matches!(
            loader.load_single_image("mem/absent.png"),
            Err(LoadError::Fetch { .. })
        ));
        assert!(matches!(
            loader.load_single_image("mem/garbage.png"),
            Err(LoadError::Decode { .. })
        ));
    }

    #[test]
    fn zero_sized_decode_is_rejected() {
        struct EmptyDecoder;
        impl Decode for EmptyDecoder {
            fn decode(&self, _: &[u8]) -> Result<RgbaImage, DecodeError> {
                Ok(RgbaImage::new(0, 0))
            }
        }
        let fetcher = Arc::new(MapFetcher::default());
        fetcher.insert("mem/x", vec![1]);
        let loader = SourceLoader::new(fetcher, Arc::new(EmptyDecoder));
        assert!(matches!(
            loader.load_single_image("mem/x"),
            Err(LoadError::Decode {
                source: DecodeError::Empty { .. },
                ..
            })
        ));
    }

    #[test]
    fn cube_map_loads_all_faces_in_slot_order() {
        let (fetcher, loader) = loader_with_faces("mem");
        let Source::CubeMap(map) = Source::cube_map(face_urls("mem")) else {
            unreachable!()
        };
        let loaded = loader.load_cube_map(&map).unwrap();
        assert_eq!(fetcher.calls(), 6);
        assert_eq!((loaded.face_width, loaded.face_height), (4, 4));
        for (i, face) in CubeFace::ALL.into_iter().enumerate() {
            assert_eq!(loaded.urls.url(face), format!("mem/{}.png", face.key()));
            assert_eq!(loaded.faces.face(face).as_slice(), &png(4, 4, i as u8 * 40)[..]);
        }
    }

    #[test]
    fn cube_map_missing_faces_are_listed_and_nothing_is_fetched() {
        let (fetcher, loader) = loader_with_faces("mem");
        let mut entries = face_urls("mem");
        entries.retain(|(k, _)| k != "NegativeZ" && k != "PositiveY");
        let Source::CubeMap(map) = Source::cube_map(entries) else {
            unreachable!()
        };
        match loader.load_cube_map(&map) {
            Err(LoadError::MissingFace { missing }) => {
                assert_eq!(missing, vec![CubeFace::PositiveY, CubeFace::NegativeZ]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn cube_map_rejects_non_string_values() {
        let Source::CubeMap(mut map) = Source::cube_map(face_urls("mem")) else {
            unreachable!()
        };
        map.insert("NegativeX".into(), serde_json::json!(12));
        assert!(matches!(
            parse_cube_map(&map),
            Err(LoadError::InvalidFaceValue {
                face: CubeFace::NegativeX
            })
        ));
    }

    #[test]
    fn cube_map_fails_whole_when_one_face_fails() {
        let (fetcher, loader) = loader_with_faces("mem");
        fetcher.insert("mem/NegativeY.png", b"broken".to_vec());
        let Source::CubeMap(map) = Source::cube_map(face_urls("mem")) else {
            unreachable!()
        };
        assert!(matches!(
            loader.load_cube_map(&map),
            Err(LoadError::Decode { ref url, .. }) if url == "mem/NegativeY.png"
        ));
    }

    #[test]
    fn file_fetcher_reads_paths_and_rejects_remote() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pano.png");
        std::fs::write(&path, png(2, 1, 0)).unwrap();

        let loader = SourceLoader::default();
        let url = format!("file://{}", path.display());
        let loaded = loader.load_single_image(&url).unwrap();
        assert_eq!((loaded.width, loaded.height), (2, 1));

        let spaced = dir.path().join("my pano.png");
        std::fs::write(&spaced, png(3, 1, 0)).unwrap();
        let url = format!("file://{}/my%20pano.png", dir.path().display());
        let loaded = loader.load_single_image(&url).unwrap();
        assert_eq!((loaded.width, loaded.height), (3, 1));

        assert!(matches!(
            loader.load_single_image("https://example.com/p.png"),
            Err(LoadError::Fetch {
                source: FetchError::UnsupportedScheme(_),
                ..
            })
        ));
    }
}
