//! flightbatch_core - Pure logic for simulated flight-mission batches
//!
//! This crate holds the synchronous, runtime-agnostic parts of a mission run
//! so they can be tested without a simulator or an async executor.
//!
//! # Modules
//!
//! - [`mission`]: Mission plan model, `.plan` loader and expected end position
//! - [`landing`]: Landing-detection state machine and its tolerances
//! - [`trajectory`]: Trajectory rows, rounding and sim-time de-duplication
//! - [`types`]: Telemetry sample types shared with the link layer

pub mod landing;
pub mod mission;
pub mod trajectory;
pub mod types;

pub use landing::{DetectionConfig, LandingDetector, LandingVerdict};
pub use mission::{
    home_position, load_mission, ExpectedEndPosition, MissionItem, MissionParseError, MissionPlan,
};
pub use trajectory::{SimTimeFilter, TrajectoryRow, TRAJECTORY_HEADER};
pub use types::{BodyVelocity, GeoPoint, Health, Odometry, Position, Quaternion};
