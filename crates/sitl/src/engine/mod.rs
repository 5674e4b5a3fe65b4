//! Mission execution engine.
//!
//! - [`takeoff`]: bounded arm/start/airborne retries
//! - [`sampler`]: keeps the latest global position
//! - [`recorder`]: turns odometry into trajectory rows and detects landing
//! - [`race`]: runs sampler and recorder together until one finishes

pub mod race;
pub mod recorder;
pub mod sampler;
pub mod takeoff;

pub use race::run_race;
pub use recorder::{RecordStep, TrajectoryRecorder};
pub use sampler::{run_position_sampler, SharedPosition};
pub use takeoff::{attempt_takeoff, AttemptOutcome, TakeoffConfig};
