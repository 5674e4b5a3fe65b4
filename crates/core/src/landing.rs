//! Landing Detection
//!
//! Decides when a mission is over from noisy position telemetry. The vehicle
//! must first be seen inside the tolerance box around the expected end
//! position after an initial settle window, and then another settle window
//! must pass. A single pass near the end point is not enough.
//!
//! Once settled the detector never un-settles: drifting away after arrival
//! does not restart the confirmation window.

use crate::mission::ExpectedEndPosition;
use crate::types::Position;

/// Samples that must pass before arrival is checked, and again after arrival.
pub const SETTLE_WINDOW_SAMPLES: u32 = 20;
/// Latitude tolerance in degrees.
pub const LAT_TOLERANCE_DEG: f64 = 0.01;
/// Longitude tolerance in degrees.
pub const LON_TOLERANCE_DEG: f64 = 0.01;
/// Altitude tolerance in meters.
pub const ALT_TOLERANCE_M: f64 = 0.5;

/// Tuning for the landing detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Settle window in accepted samples (rows are ~1 Hz, so ~seconds).
    pub settle_window: u32,
    pub lat_tolerance_deg: f64,
    pub lon_tolerance_deg: f64,
    pub alt_tolerance_m: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            settle_window: SETTLE_WINDOW_SAMPLES,
            lat_tolerance_deg: LAT_TOLERANCE_DEG,
            lon_tolerance_deg: LON_TOLERANCE_DEG,
            alt_tolerance_m: ALT_TOLERANCE_M,
        }
    }
}

/// Result of feeding one sample to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingVerdict {
    /// Position or expected end unknown, nothing evaluated.
    Skipped,
    /// Evaluated, vehicle has not settled yet.
    Approaching,
    /// Vehicle has settled, confirmation window running.
    Settled,
    /// Confirmation window elapsed, mission is over.
    Complete,
}

/// Landing-detection state machine.
#[derive(Debug, Clone)]
pub struct LandingDetector {
    config: DetectionConfig,
    expected: Option<ExpectedEndPosition>,
    sample_count: u32,
    settled: bool,
    settled_at_sample: u32,
}

impl LandingDetector {
    pub fn new(config: DetectionConfig, expected: Option<ExpectedEndPosition>) -> Self {
        Self {
            config,
            expected,
            // Counting starts at one, the first evaluated sample is number 2.
            sample_count: 1,
            settled: false,
            settled_at_sample: 1,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn settled_at_sample(&self) -> u32 {
        self.settled_at_sample
    }

    pub fn expected(&self) -> Option<&ExpectedEndPosition> {
        self.expected.as_ref()
    }

    /// Evaluate one accepted trajectory row's position.
    pub fn observe(&mut self, position: Option<Position>) -> LandingVerdict {
        let (Some(end), Some(pos)) = (self.expected, position) else {
            return LandingVerdict::Skipped;
        };
        let Some(alt) = pos.abs_alt_m else {
            return LandingVerdict::Skipped;
        };

        self.sample_count += 1;

        if !self.settled
            && self.sample_count > self.config.settle_window
            && self.within_tolerance(&end, pos.lat_deg, pos.lon_deg, alt)
        {
            self.settled = true;
            self.settled_at_sample = self.sample_count;
        }

        if !self.settled {
            return LandingVerdict::Approaching;
        }
        if self.sample_count - self.settled_at_sample > self.config.settle_window {
            LandingVerdict::Complete
        } else {
            LandingVerdict::Settled
        }
    }

    fn within_tolerance(&self, end: &ExpectedEndPosition, lat: f64, lon: f64, alt: f64) -> bool {
        (lat - end.point.lat_deg).abs() < self.config.lat_tolerance_deg
            && (lon - end.point.lon_deg).abs() < self.config.lon_tolerance_deg
            && (alt - end.amsl_altitude_m()).abs() < self.config.alt_tolerance_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    fn waypoint_end() -> ExpectedEndPosition {
        ExpectedEndPosition::at_waypoint(GeoPoint::new(11.0, 21.0, 50.0), 100.0)
    }

    fn detector() -> LandingDetector {
        LandingDetector::new(DetectionConfig::default(), Some(waypoint_end()))
    }

    fn at_end() -> Option<Position> {
        Some(Position::new(11.0, 21.0, 150.2))
    }

    fn far_away() -> Option<Position> {
        Some(Position::new(12.0, 22.0, 300.0))
    }

    #[test]
    fn test_default_config_constants() {
        let config = DetectionConfig::default();
        assert_eq!(config.settle_window, 20);
        assert_eq!(config.lat_tolerance_deg, 0.01);
        assert_eq!(config.lon_tolerance_deg, 0.01);
        assert_eq!(config.alt_tolerance_m, 0.5);
    }

    #[test]
    fn test_amsl_offset_within_tolerance() {
        // 150.2 AMSL is 50.2 above the 100 m home: inside 0.5 m of the 50 m target.
        let d = detector();
        assert!(d.within_tolerance(&waypoint_end(), 11.0, 21.0, 150.2));
        assert!(!d.within_tolerance(&waypoint_end(), 11.0, 21.0, 150.6));
        assert!(!d.within_tolerance(&waypoint_end(), 11.0, 21.0, 50.2));
        assert!(!d.within_tolerance(&waypoint_end(), 11.011, 21.0, 150.0));
        assert!(!d.within_tolerance(&waypoint_end(), 11.0, 20.989, 150.0));
    }

    #[test]
    fn test_never_settles_within_first_window() {
        let mut d = detector();
        // Evaluated samples bring the count to 2..=20.
        for _ in 0..19 {
            assert_eq!(d.observe(at_end()), LandingVerdict::Approaching);
        }
        assert_eq!(d.sample_count(), 20);
        assert!(!d.is_settled());

        assert_eq!(d.observe(at_end()), LandingVerdict::Settled);
        assert_eq!(d.sample_count(), 21);
        assert_eq!(d.settled_at_sample(), 21);
    }

    #[test]
    fn test_complete_after_second_window() {
        let mut d = detector();
        let mut verdicts = Vec::new();
        for _ in 0..41 {
            verdicts.push(d.observe(at_end()));
        }
        assert!(verdicts[..40]
            .iter()
            .all(|v| *v != LandingVerdict::Complete));
        assert_eq!(verdicts[40], LandingVerdict::Complete);
        assert_eq!(d.sample_count(), 42);
    }

    #[test]
    fn test_stays_settled_after_drift() {
        let mut d = detector();
        for _ in 0..20 {
            d.observe(at_end());
        }
        assert!(d.is_settled());
        let settled_at = d.settled_at_sample();

        // Drift away for the whole confirmation window: still completes.
        for _ in 0..20 {
            assert_eq!(d.observe(far_away()), LandingVerdict::Settled);
            assert!(d.is_settled());
            assert_eq!(d.settled_at_sample(), settled_at);
        }
        assert_eq!(d.observe(far_away()), LandingVerdict::Complete);
    }

    #[test]
    fn test_brief_pass_before_window_does_not_settle() {
        let mut d = detector();
        for _ in 0..5 {
            d.observe(at_end());
        }
        for _ in 0..100 {
            assert_eq!(d.observe(far_away()), LandingVerdict::Approaching);
        }
        assert!(!d.is_settled());
    }

    #[test]
    fn test_skips_without_altitude_or_position() {
        let mut d = detector();
        let no_alt = Some(Position {
            lat_deg: 11.0,
            lon_deg: 21.0,
            abs_alt_m: None,
        });
        assert_eq!(d.observe(no_alt), LandingVerdict::Skipped);
        assert_eq!(d.observe(None), LandingVerdict::Skipped);
        assert_eq!(d.sample_count(), 1);
    }

    #[test]
    fn test_skips_without_expected_end() {
        let mut d = LandingDetector::new(DetectionConfig::default(), None);
        for _ in 0..100 {
            assert_eq!(d.observe(at_end()), LandingVerdict::Skipped);
        }
    }
}
