// error.rs — error types for source loading and GPU setup

use crate::face::CubeFace;

/// Failure to retrieve the bytes behind a source url.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Failure to turn encoded bytes into pixels.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed image data: {0}")]
    Malformed(String),

    #[error("image has zero dimension ({width}x{height})")]
    Empty { width: u32, height: u32 },
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}

/// Why a `source` assignment was rejected. None of these are fatal: the
/// previously committed source keeps rendering.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: DecodeError,
    },

    #[error("cube map is missing required faces: {}", face_list(.missing))]
    MissingFace { missing: Vec<CubeFace> },

    #[error("cube map entry {} is not a url string", .face.key())]
    InvalidFaceValue { face: CubeFace },
}

fn face_list(faces: &[CubeFace]) -> String {
    faces
        .iter()
        .map(|f| f.key())
        .collect::<Vec<_>>()
        .join(", ")
}

/// GPU-side failures. These surface once, at initialisation.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("no suitable graphics adapter")]
    NoAdapter,

    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface creation failed: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("pipeline validation failed: {0}")]
    Pipeline(String),
}

/// Problems with the host's settings file or command line.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read settings {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("--cube-map is not a JSON object of face urls: {0}")]
    CubeMap(String),
}

pub type LoadResult<T> = Result<T, LoadError>;
