//! MAVLink message builders and telemetry decoding.
//!
//! Converts between `mavlink::common` messages and the telemetry types the
//! mission engine consumes. Nothing here touches a socket.

use std::io::{self, Cursor};

use flightbatch_core::mission::command::{
    MAV_FRAME_GLOBAL_RELATIVE_ALT, PARAM_ALTITUDE, PARAM_LATITUDE, PARAM_LONGITUDE,
};
use flightbatch_core::{BodyVelocity, GeoPoint, MissionItem, MissionPlan, Odometry, Position, Quaternion};
use mavlink::common::*;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use num_traits::FromPrimitive;

use crate::error::LinkError;

/// Addressed system/component on the vehicle side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub system: u8,
    pub component: u8,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            system: 1,
            component: 1, // MAV_COMP_ID_AUTOPILOT1
        }
    }
}

/// What a vehicle message means to the mission engine.
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    /// Autopilot heartbeat.
    Heartbeat,
    /// GPS sensor health bit from SYS_STATUS.
    GpsHealth(bool),
    /// Fused global position.
    Position(Position),
    /// Home position has been set.
    HomePosition,
    /// Landed state changed or re-reported.
    InAir(bool),
    /// Odometry sample.
    Odometry(Odometry),
    /// Command or mission protocol reply.
    Reply,
}

/// Classify a message received from the vehicle.
pub fn decode(msg: &MavMessage) -> Option<VehicleEvent> {
    match msg {
        MavMessage::HEARTBEAT(data) => {
            let is_autopilot = data.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
                && data.mavtype != MavType::MAV_TYPE_GCS;
            is_autopilot.then_some(VehicleEvent::Heartbeat)
        }
        MavMessage::SYS_STATUS(data) => Some(VehicleEvent::GpsHealth(
            data.onboard_control_sensors_health
                .contains(MavSysStatusSensor::MAV_SYS_STATUS_SENSOR_GPS),
        )),
        MavMessage::GLOBAL_POSITION_INT(data) => Some(VehicleEvent::Position(Position::new(
            data.lat as f64 / 1e7,
            data.lon as f64 / 1e7,
            data.alt as f64 / 1000.0,
        ))),
        MavMessage::HOME_POSITION(_) => Some(VehicleEvent::HomePosition),
        MavMessage::EXTENDED_SYS_STATE(data) => Some(VehicleEvent::InAir(matches!(
            data.landed_state,
            MavLandedState::MAV_LANDED_STATE_IN_AIR
                | MavLandedState::MAV_LANDED_STATE_TAKEOFF
                | MavLandedState::MAV_LANDED_STATE_LANDING
        ))),
        MavMessage::ODOMETRY(data) => Some(VehicleEvent::Odometry(Odometry {
            time_usec: data.time_usec,
            q: Quaternion {
                w: data.q[0],
                x: data.q[1],
                y: data.q[2],
                z: data.q[3],
            },
            velocity_body: BodyVelocity {
                x_m_s: data.vx,
                y_m_s: data.vy,
                z_m_s: data.vz,
            },
        })),
        MavMessage::COMMAND_ACK(_)
        | MavMessage::MISSION_REQUEST_INT(_)
        | MavMessage::MISSION_REQUEST(_)
        | MavMessage::MISSION_ACK(_) => Some(VehicleEvent::Reply),
        _ => None,
    }
}

/// Build the HEARTBEAT we send as a ground station.
pub fn build_gcs_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_GCS,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

/// Build a COMMAND_LONG for the target.
pub fn build_command_long(target: Target, command: MavCmd, params: [f32; 7]) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        target_system: target.system,
        target_component: target.component,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    })
}

/// Build the MISSION_COUNT that opens an upload.
pub fn build_mission_count(target: Target, count: u16, mission_type: MavMissionType) -> MavMessage {
    MavMessage::MISSION_COUNT(MISSION_COUNT_DATA {
        target_system: target.system,
        target_component: target.component,
        count,
        mission_type,
        ..Default::default()
    })
}

/// Convert a plan item to MISSION_ITEM_INT.
///
/// Params 5-6 are scaled to degE7 for global frames and passed through as
/// integers otherwise.
pub fn build_mission_item(
    target: Target,
    seq: u16,
    item: &MissionItem,
) -> Result<MISSION_ITEM_INT_DATA, LinkError> {
    let command = MavCmd::from_u16(item.command).ok_or_else(|| {
        LinkError::ProtocolError(format!("unsupported mission command {}", item.command))
    })?;
    let frame = MavFrame::from_u8(item.frame)
        .ok_or_else(|| LinkError::ProtocolError(format!("unsupported frame {}", item.frame)))?;

    let (x, y) = if is_global_frame(item.frame) {
        (degrees_to_e7(item.param(PARAM_LATITUDE)), degrees_to_e7(item.param(PARAM_LONGITUDE)))
    } else {
        (item.param(PARAM_LATITUDE) as i32, item.param(PARAM_LONGITUDE) as i32)
    };

    Ok(MISSION_ITEM_INT_DATA {
        target_system: target.system,
        target_component: target.component,
        seq,
        frame,
        command,
        current: u8::from(seq == 0),
        autocontinue: u8::from(item.auto_continue),
        param1: item.param(0) as f32,
        param2: item.param(1) as f32,
        param3: item.param(2) as f32,
        param4: item.param(3) as f32,
        x,
        y,
        z: item.param(PARAM_ALTITUDE) as f32,
        mission_type: MavMissionType::MAV_MISSION_TYPE_MISSION,
    })
}

/// Convert every plan item, in order.
pub fn build_mission_items(
    target: Target,
    plan: &MissionPlan,
) -> Result<Vec<MISSION_ITEM_INT_DATA>, LinkError> {
    plan.items()
        .iter()
        .enumerate()
        .map(|(seq, item)| build_mission_item(target, seq as u16, item))
        .collect()
}

/// Convert rally points to rally-type MISSION_ITEM_INT entries.
pub fn build_rally_items(target: Target, points: &[GeoPoint]) -> Vec<MISSION_ITEM_INT_DATA> {
    points
        .iter()
        .enumerate()
        .map(|(seq, p)| MISSION_ITEM_INT_DATA {
            target_system: target.system,
            target_component: target.component,
            seq: seq as u16,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            command: MavCmd::MAV_CMD_NAV_RALLY_POINT,
            current: 0,
            autocontinue: 0,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: degrees_to_e7(p.lat_deg),
            y: degrees_to_e7(p.lon_deg),
            z: p.alt_m as f32,
            mission_type: MavMissionType::MAV_MISSION_TYPE_RALLY,
        })
        .collect()
}

/// Serialize one message as a MAVLink v2 frame.
pub fn encode(header: MavHeader, msg: &MavMessage) -> io::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::with_capacity(280));
    mavlink::write_v2_msg(&mut buf, header, msg)
        .map_err(|e| io::Error::other(format!("{e:?}")))?;
    Ok(buf.into_inner())
}

/// Parse every MAVLink v2 frame in a datagram. Unparseable tails are ignored.
pub fn parse_datagram(data: &[u8]) -> Vec<(MavHeader, MavMessage)> {
    let mut reader = PeekReader::new(Cursor::new(data));
    let mut messages = Vec::new();
    while let Ok(msg) = mavlink::read_v2_msg::<MavMessage, _>(&mut reader) {
        messages.push(msg);
    }
    messages
}

fn is_global_frame(frame: u8) -> bool {
    // GLOBAL, GLOBAL_RELATIVE_ALT, GLOBAL_INT, GLOBAL_RELATIVE_ALT_INT,
    // GLOBAL_TERRAIN_ALT, GLOBAL_TERRAIN_ALT_INT
    matches!(frame, 0 | MAV_FRAME_GLOBAL_RELATIVE_ALT | 5 | 6 | 10 | 11)
}

fn degrees_to_e7(deg: f64) -> i32 {
    (deg * 1e7).round() as i32
}
