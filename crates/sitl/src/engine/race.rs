//! Concurrent position sampling and trajectory recording.

use std::io::Write;

use flightbatch_core::{Odometry, Position};

use super::recorder::TrajectoryRecorder;
use super::sampler::{run_position_sampler, SharedPosition};
use crate::error::MissionError;
use crate::link::Subscription;

/// Run the position sampler and the recorder until one of them finishes.
///
/// The sampler is polled first so a position and an odometry sample that
/// arrive together are recorded with the fresh position. Whichever future
/// loses is dropped before this returns, together with its subscription, so
/// no row can be written afterwards.
pub async fn run_race<W: Write>(
    recorder: &mut TrajectoryRecorder<W>,
    positions: Subscription<Position>,
    odometry: Subscription<Odometry>,
    shared: &SharedPosition,
) -> Result<(), MissionError> {
    tokio::select! {
        biased;
        error = run_position_sampler(positions, shared) => Err(error),
        done = recorder.run(odometry, shared) => done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightbatch_core::{DetectionConfig, LandingDetector, Quaternion};
    use tokio::sync::mpsc;

    fn odometry(time_usec: u64) -> Odometry {
        Odometry {
            time_usec,
            q: Quaternion::IDENTITY,
            velocity_body: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_position_end_stops_recording() {
        let (pos_tx, pos_rx) = mpsc::channel::<Position>(4);
        let (odo_tx, odo_rx) = mpsc::channel(4);
        drop(pos_tx);

        let mut recorder =
            TrajectoryRecorder::new(Vec::new(), LandingDetector::new(DetectionConfig::default(), None))
                .unwrap();
        let shared = SharedPosition::new();
        let result = run_race(
            &mut recorder,
            Subscription::new(pos_rx),
            Subscription::new(odo_rx),
            &shared,
        )
        .await;

        assert!(matches!(result, Err(MissionError::StreamTerminated("position"))));
        assert_eq!(recorder.rows_written(), 0);
        assert!(odo_tx.is_closed());
        assert!(odo_tx.send(odometry(1_000_000)).await.is_err());
    }

    #[tokio::test]
    async fn test_odometry_end_is_reported() {
        let (_pos_tx, pos_rx) = mpsc::channel::<Position>(4);
        let (odo_tx, odo_rx) = mpsc::channel(4);
        odo_tx.send(odometry(1_000_000)).await.unwrap();
        drop(odo_tx);

        let mut recorder =
            TrajectoryRecorder::new(Vec::new(), LandingDetector::new(DetectionConfig::default(), None))
                .unwrap();
        let result = run_race(
            &mut recorder,
            Subscription::new(pos_rx),
            Subscription::new(odo_rx),
            &SharedPosition::new(),
        )
        .await;

        assert!(matches!(result, Err(MissionError::StreamTerminated("odometry"))));
        assert_eq!(recorder.rows_written(), 1);
    }
}
