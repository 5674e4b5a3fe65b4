//! Trajectory Rows
//!
//! Row layout, rounding and sim-time de-duplication for the trajectory log.
//!
//! Rounding is half-to-even at the stated number of decimals:
//!
//! | column | decimals |
//! |--------|----------|
//! | SimTime | 2 |
//! | Lat, Lon | 7 |
//! | Alt | 3 |
//! | qw, qx, qy, qz | 0 |
//! | Vx, Vy, Vz | 3 |

use serde::Serialize;

use crate::types::{Odometry, Position};

/// Header row of the trajectory log.
pub const TRAJECTORY_HEADER: [&str; 11] = [
    "SimTime", "Lat", "Lon", "Alt", "qw", "qx", "qy", "qz", "Vx", "Vy", "Vz",
];

/// One logged trajectory sample.
///
/// Serializes in [`TRAJECTORY_HEADER`] column order; unknown position fields
/// serialize as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryRow {
    #[serde(rename = "SimTime")]
    pub sim_time_s: f64,
    #[serde(rename = "Lat")]
    pub lat_deg: Option<f64>,
    #[serde(rename = "Lon")]
    pub lon_deg: Option<f64>,
    #[serde(rename = "Alt")]
    pub alt_m: Option<f64>,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    #[serde(rename = "Vx")]
    pub vx_m_s: f64,
    #[serde(rename = "Vy")]
    pub vy_m_s: f64,
    #[serde(rename = "Vz")]
    pub vz_m_s: f64,
}

impl TrajectoryRow {
    /// Build a rounded row from an odometry sample and the latest known position.
    ///
    /// The odometry sample's own pose is not used for lat/lon/alt.
    pub fn compose(sample: &Odometry, position: Option<Position>) -> Self {
        let q = sample.q;
        let v = sample.velocity_body;
        Self {
            sim_time_s: round_to(sim_time_seconds(sample.time_usec), 2),
            lat_deg: position.map(|p| round_to(p.lat_deg, 7)),
            lon_deg: position.map(|p| round_to(p.lon_deg, 7)),
            alt_m: position.and_then(|p| p.abs_alt_m).map(|a| round_to(a, 3)),
            qw: round_to(q.w as f64, 0),
            qx: round_to(q.x as f64, 0),
            qy: round_to(q.y as f64, 0),
            qz: round_to(q.z as f64, 0),
            vx_m_s: round_to(v.x_m_s as f64, 3),
            vy_m_s: round_to(v.y_m_s as f64, 3),
            vz_m_s: round_to(v.z_m_s as f64, 3),
        }
    }
}

/// Convert a microsecond timestamp to seconds.
pub fn sim_time_seconds(time_usec: u64) -> f64 {
    time_usec as f64 / 1e6
}

/// Round half-to-even at `decimals` decimal places.
///
/// Rounds the exact binary value through its decimal expansion, so
/// 197.975 (stored just below the tie) becomes 197.97.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    if decimals == 0 {
        return value.round_ties_even();
    }
    format!("{value:.decimals$}").parse().unwrap_or(value)
}

/// Drops samples that fall in the same whole simulated second as the
/// previously accepted one.
#[derive(Debug, Clone, Default)]
pub struct SimTimeFilter {
    last_second: Option<f64>,
}

impl SimTimeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a sample at `sim_time_s` should be logged.
    pub fn accept(&mut self, sim_time_s: f64) -> bool {
        let second = round_to(sim_time_s, 0);
        if self.last_second == Some(second) {
            return false;
        }
        self.last_second = Some(second);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyVelocity, Quaternion};

    fn odometry(time_usec: u64) -> Odometry {
        Odometry {
            time_usec,
            q: Quaternion {
                w: 0.93,
                x: 0.01,
                y: -0.02,
                z: 0.37,
            },
            velocity_body: BodyVelocity {
                x_m_s: 4.98765,
                y_m_s: -0.1234,
                z_m_s: 0.0004,
            },
        }
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_to(0.5, 0), 0.0);
        assert_eq!(round_to(1.5, 0), 2.0);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(-0.7, 0), -1.0);
        assert_eq!(round_to(12.3456, 2), 12.35);
        assert_eq!(round_to(47.39774191234, 7), 47.3977419);
    }

    #[test]
    fn test_round_uses_exact_binary_value() {
        assert_eq!(round_to(197.975, 2), 197.97);
        assert_eq!(round_to(1.005, 2), 1.0);
        assert_eq!(round_to(2.675, 2), 2.67);
        assert!(round_to(f64::NAN, 3).is_nan());
    }

    #[test]
    fn test_filter_drops_same_second() {
        let mut filter = SimTimeFilter::new();
        assert!(filter.accept(10.1));
        assert!(!filter.accept(10.4));
        assert!(filter.accept(10.6)); // rounds to 11
        assert!(!filter.accept(11.2));
        assert!(filter.accept(12.0));
    }

    #[test]
    fn test_filter_tracks_last_accepted_only() {
        let mut filter = SimTimeFilter::new();
        assert!(filter.accept(1.0));
        for t in [1.1, 1.2, 1.3, 1.4] {
            assert!(!filter.accept(t));
        }
        assert!(filter.accept(2.0));
    }

    #[test]
    fn test_compose_row_rounding() {
        let pos = Position::new(47.397741912, 8.545593876, 488.123456);
        let row = TrajectoryRow::compose(&odometry(12_345_678), Some(pos));
        assert_eq!(row.sim_time_s, 12.35);
        assert_eq!(row.lat_deg, Some(47.3977419));
        assert_eq!(row.lon_deg, Some(8.5455939));
        assert_eq!(row.alt_m, Some(488.123));
        assert_eq!(row.qw, 1.0);
        assert_eq!(row.qx, 0.0);
        assert_eq!(row.qz, 0.0);
        assert_eq!(row.vx_m_s, 4.988);
        assert_eq!(row.vy_m_s, -0.123);
        assert_eq!(row.vz_m_s, 0.0);
    }

    #[test]
    fn test_compose_row_without_position() {
        let row = TrajectoryRow::compose(&odometry(1_000_000), None);
        assert_eq!(row.sim_time_s, 1.0);
        assert!(row.lat_deg.is_none());
        assert!(row.lon_deg.is_none());
        assert!(row.alt_m.is_none());
    }

    #[test]
    fn test_compose_row_without_altitude() {
        let pos = Position {
            lat_deg: 1.0,
            lon_deg: 2.0,
            abs_alt_m: None,
        };
        let row = TrajectoryRow::compose(&odometry(1_000_000), Some(pos));
        assert_eq!(row.lat_deg, Some(1.0));
        assert!(row.alt_m.is_none());
    }
}
