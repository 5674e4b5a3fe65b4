use core::fmt;

/// Geographic point as written in mission files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat_deg: f64,
    /// Longitude in degrees.
    pub lon_deg: f64,
    /// Altitude in meters.
    pub alt_m: f64,
}

impl GeoPoint {
    pub fn new(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self {
            lat_deg,
            lon_deg,
            alt_m,
        }
    }

    /// True when all three coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat_deg.is_finite() && self.lon_deg.is_finite() && self.alt_m.is_finite()
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.7}, {:.7}, {:.2} m)",
            self.lat_deg, self.lon_deg, self.alt_m
        )
    }
}

/// Position telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in degrees.
    pub lat_deg: f64,
    /// Longitude in degrees.
    pub lon_deg: f64,
    /// Altitude in meters above mean sea level.
    ///
    /// `None` when the link reported a position without a usable altitude.
    pub abs_alt_m: Option<f64>,
}

impl Position {
    pub fn new(lat_deg: f64, lon_deg: f64, abs_alt_m: f64) -> Self {
        Self {
            lat_deg,
            lon_deg,
            abs_alt_m: Some(abs_alt_m),
        }
    }
}

/// Attitude quaternion [w, x, y, z].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
}

/// Body-frame velocity in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyVelocity {
    pub x_m_s: f32,
    pub y_m_s: f32,
    pub z_m_s: f32,
}

/// Odometry telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odometry {
    /// Timestamp in microseconds (simulation time).
    pub time_usec: u64,
    pub q: Quaternion,
    pub velocity_body: BodyVelocity,
}

/// Vehicle readiness flags needed before a mission can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub global_position_ok: bool,
    pub home_position_ok: bool,
}

impl Health {
    /// Whether the vehicle can be armed for a mission.
    pub fn is_ready(&self) -> bool {
        self.global_position_ok && self.home_position_ok
    }
}
