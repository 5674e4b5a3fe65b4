//! Mission Command Codes
//!
//! MAVLink `MAV_CMD` identifiers and parameter slots that the mission loader
//! needs to interpret QGroundControl plan items.

/// MAV_CMD_NAV_WAYPOINT command ID.
pub const MAV_CMD_NAV_WAYPOINT: u16 = 16;

/// MAV_CMD_NAV_RETURN_TO_LAUNCH command ID.
///
/// When a plan ends with this command the vehicle lands at its home position.
pub const MAV_CMD_NAV_RETURN_TO_LAUNCH: u16 = 20;

/// MAV_CMD_NAV_LAND command ID.
pub const MAV_CMD_NAV_LAND: u16 = 21;

/// MAV_CMD_NAV_TAKEOFF command ID.
pub const MAV_CMD_NAV_TAKEOFF: u16 = 22;

/// MAV_FRAME_GLOBAL_RELATIVE_ALT, the frame QGroundControl uses by default.
pub const MAV_FRAME_GLOBAL_RELATIVE_ALT: u8 = 3;

/// Index of the target latitude in a NAV item's parameter list.
pub const PARAM_LATITUDE: usize = 4;
/// Index of the target longitude in a NAV item's parameter list.
pub const PARAM_LONGITUDE: usize = 5;
/// Index of the target altitude in a NAV item's parameter list.
pub const PARAM_ALTITUDE: usize = 6;

/// Check if a command sends the vehicle back to its launch point.
pub fn is_return_to_launch(command_id: u16) -> bool {
    command_id == MAV_CMD_NAV_RETURN_TO_LAUNCH
}
