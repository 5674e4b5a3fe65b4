use std::time::Duration;

use flightbatch_core::MissionParseError;

use crate::engine::AttemptOutcome;

/// Errors raised by a vehicle link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected to a vehicle")]
    NotConnected,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("{command} rejected by vehicle: {result}")]
    CommandRejected {
        command: &'static str,
        result: String,
    },

    #[error("Mission upload rejected: {0}")]
    MissionRejected(String),

    #[error("{0} stream closed")]
    StreamClosed(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every takeoff attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("Takeoff failed after {} attempts", .attempts.len())]
pub struct TakeoffFailure {
    /// Outcome of each attempt, in order.
    pub attempts: Vec<AttemptOutcome>,
}

/// Fatal errors of a mission run.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error(transparent)]
    Parse(#[from] MissionParseError),

    #[error("Connection error: {0}")]
    Connection(#[source] LinkError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error(transparent)]
    Takeoff(#[from] TakeoffFailure),

    #[error("Telemetry stream ended unexpectedly: {0}")]
    StreamTerminated(&'static str),

    #[error("Trajectory log error: {0}")]
    Log(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mission deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

/// Errors of the simulator supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Parse(#[from] MissionParseError),

    #[error("Failed to start simulator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Simulator exited before printing \"{0}\"")]
    NotReady(String),

    #[error(transparent)]
    Mission(#[from] MissionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
