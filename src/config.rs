// config.rs — command line and settings file for the viewer host

use crate::error::{ConfigError, LoadResult};
use crate::item::PhotoSphere;
use crate::source::Source;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Default, Clone)]
#[command(about = "Interactive photo sphere viewer", version)]
pub struct ViewerArgs {
    /// Equirectangular image to show (path or file:// url)
    #[arg(long, env = "PHOTOSPHERE_SOURCE", conflicts_with = "cube_map")]
    pub source: Option<String>,

    /// Cube map as a JSON object with the six face keys
    #[arg(long, env = "PHOTOSPHERE_CUBE_MAP")]
    pub cube_map: Option<String>,

    /// JSON settings file; command line values take precedence
    #[arg(long, env = "PHOTOSPHERE_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Upper bound for uploaded texture dimensions
    #[arg(long, env = "PHOTOSPHERE_MAX_TEXTURE_SIZE")]
    pub max_texture_size: Option<u32>,

    /// Vertical field of view in degrees (3..=150)
    #[arg(long, env = "PHOTOSPHERE_FOV")]
    pub fov: Option<f64>,

    #[arg(long, env = "PHOTOSPHERE_AZIMUTH", allow_negative_numbers = true)]
    pub azimuth: Option<f64>,

    #[arg(long, env = "PHOTOSPHERE_ELEVATION", allow_negative_numbers = true)]
    pub elevation: Option<f64>,

    /// Log filter, env_logger syntax
    #[arg(long, env = "PHOTOSPHERE_LOG")]
    pub log: Option<String>,
}

/// On-disk settings. Every field is optional.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub source: Option<Source>,
    pub max_texture_size: Option<u32>,
    pub field_of_view: Option<f64>,
    pub azimuth: Option<f64>,
    pub elevation: Option<f64>,
    pub log: Option<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Settings file merged with the command line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ViewerConfig {
    pub settings: Settings,
}

impl ViewerConfig {
    pub fn from_args(args: &ViewerArgs) -> Result<Self, ConfigError> {
        let file = match &args.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        Self::merge(file, args)
    }

    fn merge(mut settings: Settings, args: &ViewerArgs) -> Result<Self, ConfigError> {
        if let Some(url) = &args.source {
            settings.source = Some(Source::single(url.clone()));
        }
        if let Some(json) = &args.cube_map {
            match Source::from_json(json) {
                Ok(source @ Source::CubeMap(_)) => settings.source = Some(source),
                Ok(Source::Single(_)) => {
                    return Err(ConfigError::CubeMap("expected an object".into()))
                }
                Err(err) => return Err(ConfigError::CubeMap(err.to_string())),
            }
        }
        settings.max_texture_size = args.max_texture_size.or(settings.max_texture_size);
        settings.field_of_view = args.fov.or(settings.field_of_view);
        settings.azimuth = args.azimuth.or(settings.azimuth);
        settings.elevation = args.elevation.or(settings.elevation);
        settings.log = args.log.clone().or(settings.log);
        Ok(Self { settings })
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.settings.log.as_deref()
    }

    /// Goes through the item's setters, so out-of-range values are clamped
    /// or ignored exactly as interactive edits would be.
    pub fn apply(&self, item: &mut PhotoSphere) -> LoadResult<()> {
        let s = &self.settings;
        if let Some(size) = s.max_texture_size {
            item.set_maximum_texture_size(size);
        }
        if let Some(fov) = s.field_of_view {
            item.set_field_of_view(fov);
        }
        if let Some(azimuth) = s.azimuth {
            item.set_azimuth(azimuth);
        }
        if let Some(elevation) = s.elevation {
            item.set_elevation(elevation);
        }
        match &s.source {
            Some(source) => item.set_source(source),
            None => Ok(()),
        }
    }
}
