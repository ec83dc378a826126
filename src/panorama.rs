// panorama.rs — viewing angles and the rules that constrain them

pub const DEFAULT_FIELD_OF_VIEW: f64 = 90.0;
pub const MIN_FIELD_OF_VIEW: f64 = 3.0;
pub const MAX_FIELD_OF_VIEW: f64 = 150.0; // wider gets hard to look at

/// Where the viewer is looking, in degrees.
///
/// Every setter returns `true` only when the stored value actually changed,
/// which is what callers use to decide whether to notify and redraw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerState {
    azimuth: f64,
    elevation: f64,
    field_of_view: f64,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            field_of_view: DEFAULT_FIELD_OF_VIEW,
        }
    }
}

impl ViewerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    pub fn field_of_view(&self) -> f64 {
        self.field_of_view
    }

    /// Wraps into `[0, 360)`. 0 faces the seam of an equirectangular image.
    pub fn set_azimuth(&mut self, azimuth: f64) -> bool {
        let Some(azimuth) = wrap_azimuth(azimuth) else {
            return false;
        };
        if azimuth == self.azimuth {
            return false;
        }
        self.azimuth = azimuth;
        true
    }

    /// Clamps into `[-90, 90]`.
    pub fn set_elevation(&mut self, elevation: f64) -> bool {
        let Some(elevation) = clamp_elevation(elevation) else {
            return false;
        };
        if elevation == self.elevation {
            return false;
        }
        self.elevation = elevation;
        true
    }

    /// Values outside `[3, 150]` are ignored rather than clamped.
    pub fn set_field_of_view(&mut self, fov: f64) -> bool {
        if !accepts_field_of_view(fov) || fov == self.field_of_view {
            return false;
        }
        self.field_of_view = fov;
        true
    }
}

pub fn wrap_azimuth(azimuth: f64) -> Option<f64> {
    if !azimuth.is_finite() {
        return None;
    }
    let mut wrapped = azimuth % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    // -1e-20 + 360 rounds to exactly 360
    if wrapped >= 360.0 {
        wrapped = 0.0;
    }
    Some(wrapped)
}

pub fn clamp_elevation(elevation: f64) -> Option<f64> {
    elevation
        .is_finite()
        .then(|| elevation.clamp(-90.0, 90.0))
}

pub fn accepts_field_of_view(fov: f64) -> bool {
    fov.is_finite() && (MIN_FIELD_OF_VIEW..=MAX_FIELD_OF_VIEW).contains(&fov)
}
