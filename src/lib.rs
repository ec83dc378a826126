// lib.rs — offscreen photo sphere rendering: sphere and cube-map panoramas

pub mod config;
pub mod error;
pub mod exchange;
pub mod face;
pub mod item;
pub mod logging;
pub mod mesh;
pub mod panorama;
pub mod renderer;
pub mod snapshot;
pub mod source;
pub mod texture;

pub use error::{ConfigError, DecodeError, FetchError, LoadError, RenderError};
pub use exchange::{DeviceLimits, FrameExchange, FrameRequest};
pub use face::CubeFace;
pub use item::{Notification, PhotoSphere};
pub use renderer::{FrameReport, PanoramaRenderer, RenderContext, RenderHost, RendererKind};
pub use snapshot::{ChangeSet, RenderSnapshot};
pub use source::{Decode, Fetch, Source, SourceLoader};
