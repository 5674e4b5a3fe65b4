//! Position sampling.

use std::cell::Cell;

use flightbatch_core::Position;
use tracing::warn;

use crate::error::MissionError;
use crate::link::Subscription;

/// Latest known global position.
///
/// Written only by [`run_position_sampler`], read by the trajectory
/// recorder. Both run inside one task, so a `Cell` is enough.
#[derive(Debug, Default)]
pub struct SharedPosition {
    latest: Cell<Option<Position>>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Position> {
        self.latest.get()
    }

    pub(crate) fn set(&self, position: Position) {
        self.latest.set(Some(position));
    }
}

/// Overwrite `shared` with every position sample.
///
/// Never finishes while the stream is alive; returns the terminal error once
/// it ends.
pub async fn run_position_sampler(
    mut positions: Subscription<Position>,
    shared: &SharedPosition,
) -> MissionError {
    while let Some(position) = positions.next().await {
        shared.set(position);
    }
    warn!("Position stream ended");
    MissionError::StreamTerminated("position")
}
