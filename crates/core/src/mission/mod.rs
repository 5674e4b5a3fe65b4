//! Mission Plan Model
//!
//! Parses QGroundControl `.plan` documents into an immutable [`MissionPlan`]
//! and derives the [`ExpectedEndPosition`] used for landing detection.
//!
//! # Plan Format
//!
//! - `mission.items`: `[{command, params, frame?, autoContinue?}]`
//! - `mission.plannedHomePosition`: optional `[lat, lon, alt]`
//! - `rallyPoints.points`: optional `[[lat, lon, alt], ...]`
//!
//! Params may contain `null` where QGroundControl stores NaN.

pub mod command;
mod end;
mod error;

use std::path::Path;

use serde::Deserialize;

use crate::types::GeoPoint;
pub use command::{is_return_to_launch, MAV_CMD_NAV_RETURN_TO_LAUNCH};
pub use end::ExpectedEndPosition;
pub use error::MissionParseError;

/// One command of a mission plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionItem {
    /// MAV_CMD identifier.
    pub command: u16,
    /// MAV_FRAME of the item coordinates.
    pub frame: u8,
    /// Command parameters in slot order (NaN where unset).
    pub params: Vec<f64>,
    /// Continue to the next item automatically.
    pub auto_continue: bool,
}

impl MissionItem {
    pub fn new(command: u16, params: Vec<f64>) -> Self {
        Self {
            command,
            frame: command::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            params,
            auto_continue: true,
        }
    }

    /// Parameter value at `index`, NaN when the slot is absent.
    pub fn param(&self, index: usize) -> f64 {
        self.params.get(index).copied().unwrap_or(f64::NAN)
    }

    /// Target lat/lon/alt stored in params 5-7, if the item has them.
    pub fn target(&self) -> Option<GeoPoint> {
        if self.params.len() <= command::PARAM_ALTITUDE {
            return None;
        }
        Some(GeoPoint::new(
            self.params[command::PARAM_LATITUDE],
            self.params[command::PARAM_LONGITUDE],
            self.params[command::PARAM_ALTITUDE],
        ))
    }
}

/// Parsed mission description. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionPlan {
    items: Vec<MissionItem>,
    planned_home: Option<GeoPoint>,
    rally_points: Vec<GeoPoint>,
}

impl MissionPlan {
    /// Build a plan directly from items.
    pub fn new(items: Vec<MissionItem>, planned_home: Option<GeoPoint>) -> Self {
        Self {
            items,
            planned_home,
            rally_points: Vec::new(),
        }
    }

    /// Read and parse a `.plan` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MissionParseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| MissionParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a `.plan` JSON document.
    pub fn from_json(text: &str) -> Result<Self, MissionParseError> {
        let doc: PlanDocument = serde_json::from_str(text)?;

        let planned_home = doc
            .mission
            .planned_home_position
            .map(|values| point_from_slice("plannedHomePosition", &values))
            .transpose()?;

        let items = doc
            .mission
            .items
            .into_iter()
            .map(|raw| MissionItem {
                command: raw.command,
                frame: raw.frame.unwrap_or(command::MAV_FRAME_GLOBAL_RELATIVE_ALT),
                params: raw
                    .params
                    .into_iter()
                    .map(|p| p.unwrap_or(f64::NAN))
                    .collect(),
                auto_continue: raw.auto_continue.unwrap_or(true),
            })
            .collect();

        let rally_points = doc
            .rally_points
            .map(|r| r.points)
            .unwrap_or_default()
            .iter()
            .map(|p| point_from_slice("rally point", p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            items,
            planned_home,
            rally_points,
        })
    }

    pub fn items(&self) -> &[MissionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn planned_home(&self) -> Option<GeoPoint> {
        self.planned_home
    }

    pub fn rally_points(&self) -> &[GeoPoint] {
        &self.rally_points
    }

    /// Whether the final item is a return-to-launch.
    pub fn ends_with_rtl(&self) -> bool {
        self.items
            .last()
            .is_some_and(|item| is_return_to_launch(item.command))
    }

    /// Derive where the vehicle should come to rest.
    ///
    /// Returns `Ok(None)` for a return-to-launch plan without a planned home:
    /// the landing point is only known to the vehicle in that case.
    pub fn expected_end(&self) -> Result<Option<ExpectedEndPosition>, MissionParseError> {
        let last = self.items.last().ok_or(MissionParseError::Empty)?;

        if is_return_to_launch(last.command) {
            return Ok(self.planned_home.map(ExpectedEndPosition::at_home));
        }

        let home = self.planned_home.ok_or(MissionParseError::MissingHome)?;
        let target = last
            .target()
            .ok_or(MissionParseError::MissingTargetParams {
                command: last.command,
                found: last.params.len(),
            })?;
        if !target.is_finite() {
            return Err(MissionParseError::NonFiniteTarget {
                command: last.command,
                target,
            });
        }
        Ok(Some(ExpectedEndPosition::at_waypoint(target, home.alt_m)))
    }
}

/// Load a mission file and derive its expected end position in one step.
pub fn load_mission(
    path: impl AsRef<Path>,
) -> Result<(MissionPlan, Option<ExpectedEndPosition>), MissionParseError> {
    let plan = MissionPlan::load(path)?;
    let end = plan.expected_end()?;
    Ok((plan, end))
}

/// Extract the planned home position from a mission file.
///
/// Used to place the simulated vehicle before the mission starts.
pub fn home_position(path: impl AsRef<Path>) -> Result<GeoPoint, MissionParseError> {
    MissionPlan::load(path)?
        .planned_home()
        .ok_or(MissionParseError::MissingHome)
}

fn point_from_slice(field: &'static str, values: &[f64]) -> Result<GeoPoint, MissionParseError> {
    match values {
        [lat, lon, alt, ..] => Ok(GeoPoint::new(*lat, *lon, *alt)),
        _ => Err(MissionParseError::InvalidPoint {
            field,
            found: values.len(),
        }),
    }
}

// ============================================================================
// QGroundControl document shape
// ============================================================================

#[derive(Debug, Deserialize)]
struct PlanDocument {
    mission: PlanMission,
    #[serde(rename = "rallyPoints", default)]
    rally_points: Option<PlanRallyPoints>,
}

#[derive(Debug, Deserialize)]
struct PlanMission {
    items: Vec<PlanItem>,
    #[serde(rename = "plannedHomePosition", default)]
    planned_home_position: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct PlanItem {
    command: u16,
    #[serde(default)]
    params: Vec<Option<f64>>,
    #[serde(default)]
    frame: Option<u8>,
    #[serde(rename = "autoContinue", default)]
    auto_continue: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PlanRallyPoints {
    #[serde(default)]
    points: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const QGC_PLAN: &str = r#"{
        "fileType": "Plan",
        "groundStation": "QGroundControl",
        "mission": {
            "cruiseSpeed": 15,
            "hoverSpeed": 5,
            "items": [
                {
                    "autoContinue": true,
                    "command": 22,
                    "doJumpId": 1,
                    "frame": 3,
                    "params": [0, 0, 0, null, 47.3977419, 8.5455938, 50],
                    "type": "SimpleItem"
                },
                {
                    "autoContinue": true,
                    "command": 16,
                    "doJumpId": 2,
                    "frame": 3,
                    "params": [0, 0, 0, null, 47.3980, 8.5460, 50],
                    "type": "SimpleItem"
                },
                {
                    "autoContinue": true,
                    "command": 20,
                    "doJumpId": 3,
                    "frame": 2,
                    "params": [0, 0, 0, 0, 0, 0, 0],
                    "type": "SimpleItem"
                }
            ],
            "plannedHomePosition": [47.3977419, 8.5455938, 488.1],
            "vehicleType": 2,
            "version": 2
        },
        "rallyPoints": { "points": [[47.39, 8.54, 20.0]], "version": 2 },
        "version": 1
    }"#;

    fn home(lat: f64, lon: f64, alt: f64) -> Option<GeoPoint> {
        Some(GeoPoint::new(lat, lon, alt))
    }

    #[test]
    fn test_parse_qgc_plan() {
        let plan = MissionPlan::from_json(QGC_PLAN).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.items()[0].command, 22);
        assert!(plan.items()[0].param(3).is_nan());
        assert_eq!(plan.items()[2].frame, 2);
        assert!(plan.ends_with_rtl());
        assert_eq!(plan.planned_home(), home(47.3977419, 8.5455938, 488.1));
        assert_eq!(plan.rally_points().len(), 1);
    }

    #[test]
    fn test_defaults_for_missing_optional_fields() {
        let plan =
            MissionPlan::from_json(r#"{"mission":{"items":[{"command":16,"params":[]}]}}"#)
                .unwrap();
        let item = &plan.items()[0];
        assert_eq!(item.frame, command::MAV_FRAME_GLOBAL_RELATIVE_ALT);
        assert!(item.auto_continue);
        assert!(plan.planned_home().is_none());
        assert!(plan.rally_points().is_empty());
    }

    #[test]
    fn test_rtl_end_is_home_with_zero_base() {
        let plan = MissionPlan::new(
            vec![MissionItem::new(20, vec![0.0; 7])],
            home(10.0, 20.0, 100.0),
        );
        let end = plan.expected_end().unwrap().unwrap();
        assert_eq!(end.point, GeoPoint::new(10.0, 20.0, 100.0));
        assert_eq!(end.base_altitude_m, 0.0);
    }

    #[test]
    fn test_waypoint_end_uses_target_and_home_altitude() {
        let plan = MissionPlan::new(
            vec![
                MissionItem::new(22, vec![0.0, 0.0, 0.0, 0.0, 10.5, 20.5, 30.0]),
                MissionItem::new(16, vec![0.0, 0.0, 0.0, 0.0, 11.0, 21.0, 50.0]),
            ],
            home(10.0, 20.0, 100.0),
        );
        let end = plan.expected_end().unwrap().unwrap();
        assert_eq!(end.point, GeoPoint::new(11.0, 21.0, 50.0));
        assert_eq!(end.base_altitude_m, 100.0);
    }

    #[test]
    fn test_waypoint_end_without_home_fails() {
        let plan = MissionPlan::new(
            vec![MissionItem::new(16, vec![0.0, 0.0, 0.0, 0.0, 11.0, 21.0, 50.0])],
            None,
        );
        assert!(matches!(
            plan.expected_end(),
            Err(MissionParseError::MissingHome)
        ));
    }

    #[test]
    fn test_rtl_without_home_has_no_end() {
        let plan = MissionPlan::new(vec![MissionItem::new(20, vec![])], None);
        assert!(plan.expected_end().unwrap().is_none());
    }

    #[test]
    fn test_empty_plan_fails() {
        let plan = MissionPlan::new(vec![], home(1.0, 2.0, 3.0));
        assert!(matches!(plan.expected_end(), Err(MissionParseError::Empty)));
    }

    #[test]
    fn test_short_final_params_fail() {
        let plan = MissionPlan::new(
            vec![MissionItem::new(21, vec![0.0, 0.0, 0.0])],
            home(1.0, 2.0, 3.0),
        );
        assert!(matches!(
            plan.expected_end(),
            Err(MissionParseError::MissingTargetParams {
                command: 21,
                found: 3
            })
        ));
    }

    #[test]
    fn test_null_final_target_fails() {
        let json = r#"{
            "mission": {
                "items": [
                    { "command": 16, "params": [0, 0, 0, null, null, null, 50] }
                ],
                "plannedHomePosition": [47.3977419, 8.5455938, 488.1]
            }
        }"#;
        let plan = MissionPlan::from_json(json).unwrap();
        assert!(matches!(
            plan.expected_end(),
            Err(MissionParseError::NonFiniteTarget { command: 16, .. })
        ));
    }

    #[test]
    fn test_malformed_json_fails() {
        assert!(matches!(
            MissionPlan::from_json("{\"mission\": {}}"),
            Err(MissionParseError::Json(_))
        ));
        assert!(matches!(
            MissionPlan::from_json("not json"),
            Err(MissionParseError::Json(_))
        ));
    }

    #[test]
    fn test_short_home_fails() {
        let result = MissionPlan::from_json(
            r#"{"mission":{"items":[],"plannedHomePosition":[1.0, 2.0]}}"#,
        );
        assert!(matches!(
            result,
            Err(MissionParseError::InvalidPoint { found: 2, .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = MissionPlan::load(dir.path().join("nope.plan"));
        assert!(matches!(result, Err(MissionParseError::Io { .. })));
    }

    #[test]
    fn test_load_mission_and_home_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(QGC_PLAN.as_bytes()).unwrap();

        let (plan, end) = load_mission(file.path()).unwrap();
        assert_eq!(plan.len(), 3);
        let end = end.unwrap();
        assert_eq!(end.base_altitude_m, 0.0);
        assert_eq!(end.point.alt_m, 488.1);

        let home = home_position(file.path()).unwrap();
        assert_eq!(home.lat_deg, 47.3977419);
    }

    #[test]
    fn test_home_position_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"mission":{"items":[]}}"#).unwrap();
        assert!(matches!(
            home_position(file.path()),
            Err(MissionParseError::MissingHome)
        ));
    }
}
