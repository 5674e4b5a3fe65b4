//! Trajectory recording and landing detection.
//!
//! Every accepted odometry sample becomes one CSV row paired with the latest
//! sampled position. Rows feed the landing detector; the recorder finishes
//! once the detector confirms the vehicle has come to rest.

use std::io::Write;

use flightbatch_core::trajectory::sim_time_seconds;
use flightbatch_core::{
    LandingDetector, LandingVerdict, Odometry, Position, SimTimeFilter, TrajectoryRow,
    TRAJECTORY_HEADER,
};
use tracing::{debug, info, warn};

use super::sampler::SharedPosition;
use crate::error::MissionError;
use crate::link::Subscription;

/// What happened to one odometry sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStep {
    /// Same whole second as the previous row, not logged.
    Duplicate,
    /// Logged, with the detector's verdict for the row.
    Logged(LandingVerdict),
}

/// Writes trajectory rows and tracks landing.
pub struct TrajectoryRecorder<W: Write> {
    writer: csv::Writer<W>,
    filter: SimTimeFilter,
    detector: LandingDetector,
    rows_written: u64,
}

impl<W: Write> TrajectoryRecorder<W> {
    /// Create a recorder and write the header row right away.
    pub fn new(inner: W, detector: LandingDetector) -> Result<Self, MissionError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(TRAJECTORY_HEADER)?;
        writer.flush()?;
        if detector.expected().is_none() {
            warn!("No expected end position, landing detection disabled");
        }
        Ok(Self {
            writer,
            filter: SimTimeFilter::new(),
            detector,
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn detector(&self) -> &LandingDetector {
        &self.detector
    }

    /// Log one odometry sample against the given position.
    pub fn record(
        &mut self,
        sample: &Odometry,
        position: Option<Position>,
    ) -> Result<RecordStep, MissionError> {
        if !self.filter.accept(sim_time_seconds(sample.time_usec)) {
            return Ok(RecordStep::Duplicate);
        }

        let row = TrajectoryRow::compose(sample, position);
        self.writer.serialize(&row)?;
        self.rows_written += 1;

        Ok(RecordStep::Logged(self.detector.observe(position)))
    }

    /// Record odometry until landing is confirmed.
    ///
    /// Fails with `StreamTerminated("odometry")` if the stream ends first.
    pub async fn run(
        &mut self,
        mut odometry: Subscription<Odometry>,
        shared: &SharedPosition,
    ) -> Result<(), MissionError> {
        while let Some(sample) = odometry.next().await {
            let was_settled = self.detector.is_settled();
            match self.record(&sample, shared.get())? {
                RecordStep::Logged(LandingVerdict::Complete) => {
                    info!(
                        rows = self.rows_written,
                        sample = self.detector.sample_count(),
                        "Landing confirmed"
                    );
                    return Ok(());
                }
                RecordStep::Logged(LandingVerdict::Settled) if !was_settled => {
                    info!(
                        sample = self.detector.settled_at_sample(),
                        "Vehicle reached expected end position"
                    );
                }
                RecordStep::Duplicate => debug!(time_usec = sample.time_usec, "Duplicate sim second"),
                RecordStep::Logged(_) => {}
            }
        }
        warn!(rows = self.rows_written, "Odometry stream ended before landing");
        Err(MissionError::StreamTerminated("odometry"))
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, MissionError> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| MissionError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightbatch_core::{BodyVelocity, DetectionConfig, ExpectedEndPosition, GeoPoint, Quaternion};

    fn sample(time_usec: u64) -> Odometry {
        Odometry {
            time_usec,
            q: Quaternion::IDENTITY,
            velocity_body: BodyVelocity {
                x_m_s: 1.23456,
                y_m_s: 0.0,
                z_m_s: -0.5,
            },
        }
    }

    fn recorder() -> TrajectoryRecorder<Vec<u8>> {
        let end = ExpectedEndPosition::at_home(GeoPoint::new(47.0, 8.0, 500.0));
        TrajectoryRecorder::new(Vec::new(), LandingDetector::new(DetectionConfig::default(), Some(end)))
            .unwrap()
    }

    fn output(recorder: TrajectoryRecorder<Vec<u8>>) -> String {
        String::from_utf8(recorder.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_header_written_on_creation() {
        let text = output(recorder());
        assert_eq!(text, "SimTime,Lat,Lon,Alt,qw,qx,qy,qz,Vx,Vy,Vz\n");
    }

    #[test]
    fn test_unknown_position_leaves_empty_cells() {
        let mut rec = recorder();
        let step = rec.record(&sample(1_000_000), None).unwrap();
        assert_eq!(step, RecordStep::Logged(LandingVerdict::Skipped));
        assert_eq!(rec.detector().sample_count(), 1);

        let text = output(rec);
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("1.0,,,,"), "row was {row}");
    }

    #[test]
    fn test_same_second_deduplicated() {
        let mut rec = recorder();
        let pos = Some(Position::new(47.1, 8.1, 600.0));
        assert!(matches!(rec.record(&sample(10_000_000), pos).unwrap(), RecordStep::Logged(_)));
        assert_eq!(rec.record(&sample(10_300_000), pos).unwrap(), RecordStep::Duplicate);
        assert!(matches!(rec.record(&sample(11_000_000), pos).unwrap(), RecordStep::Logged(_)));
        assert_eq!(rec.rows_written(), 2);
        assert_eq!(rec.detector().sample_count(), 3);
    }

    #[test]
    fn test_row_values_rounded() {
        let mut rec = recorder();
        rec.record(&sample(2_345_678), Some(Position::new(47.123456789, 8.987654321, 512.34567)))
            .unwrap();
        let text = output(rec);
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row, "2.35,47.1234568,8.9876543,512.346,1.0,0.0,0.0,0.0,1.235,0.0,-0.5");
    }

    #[tokio::test]
    async fn test_run_stops_at_completion() {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        for k in 1..=60u64 {
            tx.send(sample(k * 1_000_000)).await.unwrap();
        }
        let shared = SharedPosition::new();
        shared.set(Position::new(47.0, 8.0, 500.1));

        let mut rec = recorder();
        rec.run(Subscription::new(rx), &shared).await.unwrap();

        // sample_count starts at 1 and settles at 21, completes at 42
        assert_eq!(rec.detector().sample_count(), 42);
        assert_eq!(rec.detector().settled_at_sample(), 21);
        assert_eq!(rec.rows_written(), 41);
    }

    #[tokio::test]
    async fn test_run_reports_stream_end() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(sample(1_000_000)).await.unwrap();
        drop(tx);

        let mut rec = recorder();
        let err = rec
            .run(Subscription::new(rx), &SharedPosition::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MissionError::StreamTerminated("odometry")));
        assert_eq!(rec.rows_written(), 1);
    }
}
