use crate::types::GeoPoint;

/// Where the vehicle is expected to come to rest at the end of a mission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedEndPosition {
    /// Expected resting point.
    pub point: GeoPoint,
    /// Altitude to add to `point.alt_m` before comparing against AMSL telemetry.
    pub base_altitude_m: f64,
}

impl ExpectedEndPosition {
    /// Return-to-launch: the home position is already AMSL referenced.
    pub fn at_home(home: GeoPoint) -> Self {
        Self {
            point: home,
            base_altitude_m: 0.0,
        }
    }

    /// Final waypoint target, whose altitude is relative to home.
    pub fn at_waypoint(target: GeoPoint, home_alt_m: f64) -> Self {
        Self {
            point: target,
            base_altitude_m: home_alt_m,
        }
    }

    /// Expected altitude in the telemetry (AMSL) reference.
    pub fn amsl_altitude_m(&self) -> f64 {
        self.point.alt_m + self.base_altitude_m
    }
}
