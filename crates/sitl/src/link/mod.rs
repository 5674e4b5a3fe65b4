//! Vehicle link contract.
//!
//! The mission engine only talks to a vehicle through [`VehicleLink`]:
//! connect, readiness, mission upload, arm, start, and telemetry
//! subscriptions. [`MavlinkLink`] implements it over MAVLink/UDP for PX4
//! SITL; [`MockLink`] replays scripted telemetry for tests.

mod udp;
pub mod mock;
pub mod protocol;
mod subscription;

use async_trait::async_trait;
use flightbatch_core::{Health, MissionPlan, Odometry, Position};

pub use udp::{MavlinkConfig, MavlinkLink};
pub use mock::{MockCall, MockLink, Script};
pub use subscription::{Subscription, Topic};

use crate::error::LinkError;

/// Link connection state sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub is_connected: bool,
}

/// Capability set the mission engine needs from a vehicle.
///
/// Subscriptions start delivering from the moment they are created and
/// end (`next()` returns `None`) when the underlying stream ends.
#[async_trait]
pub trait VehicleLink: Send {
    /// Open the link to the vehicle.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Connection state updates.
    fn connection_state(&mut self) -> Subscription<ConnectionState>;

    /// Readiness flags (global position and home position estimates).
    fn health(&mut self) -> Subscription<Health>;

    /// Upload the mission items (and rally points, if any).
    async fn upload_mission(&mut self, plan: &MissionPlan) -> Result<(), LinkError>;

    /// Arm the vehicle.
    async fn arm(&mut self) -> Result<(), LinkError>;

    /// Start the uploaded mission.
    async fn start_mission(&mut self) -> Result<(), LinkError>;

    /// Airborne state updates.
    fn in_air(&mut self) -> Subscription<bool>;

    /// Global position updates (AMSL altitude).
    fn position(&mut self) -> Subscription<Position>;

    /// Odometry updates (orientation and body velocity).
    fn odometry(&mut self) -> Subscription<Odometry>;
}
