use std::path::PathBuf;

use crate::types::GeoPoint;

/// Errors raised while loading a mission description.
#[derive(Debug, thiserror::Error)]
pub enum MissionParseError {
    #[error("Cannot read mission file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed mission document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mission has no items")]
    Empty,

    #[error("Mission has no planned home position")]
    MissingHome,

    #[error("{field} needs 3 values, found {found}")]
    InvalidPoint { field: &'static str, found: usize },

    #[error("Final mission item (command {command}) has {found} params, target needs 7")]
    MissingTargetParams { command: u16, found: usize },

    #[error("Final mission item (command {command}) has a non-finite target {target}")]
    NonFiniteTarget { command: u16, target: GeoPoint },
}
