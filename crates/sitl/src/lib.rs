//! flightbatch_sitl - Runs simulated flight missions and records trajectories
//!
//! Connects to a SITL vehicle over a [`VehicleLink`], uploads a mission,
//! takes off with bounded retries, then samples position and odometry
//! telemetry into a trajectory log until the vehicle settles at the expected
//! end of the mission.

pub mod controller;
pub mod engine;
pub mod error;
pub mod link;
pub mod supervisor;

pub use controller::{MissionConfig, MissionController, MissionOutcome, MissionPhase, MissionReport};
pub use engine::{AttemptOutcome, SharedPosition, TakeoffConfig, TrajectoryRecorder};
pub use error::{LinkError, MissionError, SupervisorError, TakeoffFailure};
pub use link::{ConnectionState, MavlinkConfig, MavlinkLink, Subscription, VehicleLink};
pub use supervisor::{supervise, SimulatorProcess, SupervisorConfig};
