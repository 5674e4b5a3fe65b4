//! Mission Controller
//!
//! Drives one mission end to end:
//!
//! ```text
//! Idle -> Connecting -> AwaitingHealth -> UploadingMission -> TakingOff -> Recording -> Done
//!                         (any phase) -> Failed | Cancelled
//! ```
//!
//! The trajectory log is created on entering `Recording` and flushed on
//! `Done`. On failure or cancellation it is closed as-is.

use std::fmt;
use std::fs::{self, File};
use std::future::Future;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flightbatch_core::{DetectionConfig, ExpectedEndPosition, Health, LandingDetector, MissionPlan};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::engine::{attempt_takeoff, run_race, SharedPosition, TakeoffConfig, TrajectoryRecorder};
use crate::error::{LinkError, MissionError};
use crate::link::{Subscription, VehicleLink};

/// Where missions come from and go to, plus tuning.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Directory holding `<name>.plan` files.
    pub plans_dir: PathBuf,
    /// Directory receiving `<name>_log.csv` files.
    pub trajectories_dir: PathBuf,
    pub detection: DetectionConfig,
    pub takeoff: TakeoffConfig,
    /// Upper bound on the whole run. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            plans_dir: PathBuf::from("plans"),
            trajectories_dir: PathBuf::from("trajectories"),
            detection: DetectionConfig::default(),
            takeoff: TakeoffConfig::default(),
            deadline: None,
        }
    }
}

impl MissionConfig {
    pub fn plan_path(&self, mission: &str) -> PathBuf {
        self.plans_dir.join(format!("{mission}.plan"))
    }

    pub fn log_path(&self, mission: &str) -> PathBuf {
        self.trajectories_dir.join(format!("{mission}_log.csv"))
    }
}

/// Controller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionPhase {
    Idle,
    Connecting,
    AwaitingHealth,
    UploadingMission,
    TakingOff,
    Recording,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingHealth => "awaiting-health",
            Self::UploadingMission => "uploading-mission",
            Self::TakingOff => "taking-off",
            Self::Recording => "recording",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Summary of a completed mission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionReport {
    pub mission: String,
    pub log_path: PathBuf,
    /// Trajectory rows written, header excluded.
    pub rows: u64,
    /// Attempt number that got the vehicle airborne.
    pub takeoff_attempts: u32,
}

/// How a mission run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionOutcome {
    Completed(MissionReport),
    /// Stopped from outside while in `phase`.
    Cancelled { phase: MissionPhase },
}

/// Runs missions against one vehicle link.
pub struct MissionController<L> {
    link: L,
    config: MissionConfig,
    phase: MissionPhase,
}

impl<L: VehicleLink> MissionController<L> {
    pub fn new(link: L, config: MissionConfig) -> Self {
        Self {
            link,
            config,
            phase: MissionPhase::Idle,
        }
    }

    pub fn phase(&self) -> MissionPhase {
        self.phase
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Run `mission` until it completes, fails, or `cancel` resolves.
    ///
    /// Cancellation drops every in-flight subscription and timer and is
    /// reported as [`MissionOutcome::Cancelled`], not as an error.
    pub async fn run(
        &mut self,
        mission: &str,
        cancel: impl Future<Output = ()>,
    ) -> Result<MissionOutcome, MissionError> {
        let deadline = self.config.deadline;
        let finished = {
            let execute = with_deadline(deadline, self.execute(mission));
            tokio::select! {
                biased;
                () = cancel => None,
                result = execute => Some(result),
            }
        };

        match finished {
            None => {
                let phase = self.phase;
                warn!(mission, %phase, "Mission cancelled");
                self.transition(MissionPhase::Cancelled);
                Ok(MissionOutcome::Cancelled { phase })
            }
            Some(Ok(report)) => Ok(MissionOutcome::Completed(report)),
            Some(Err(e)) => {
                error!(mission, phase = %self.phase, "Mission failed: {e}");
                self.transition(MissionPhase::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, mission: &str) -> Result<MissionReport, MissionError> {
        let plan_path = self.config.plan_path(mission);
        let plan = MissionPlan::load(&plan_path)?;
        let expected = plan.expected_end()?;
        match &expected {
            Some(end) => info!(
                mission,
                items = plan.len(),
                end = %end.point,
                base_alt_m = end.base_altitude_m,
                "Mission loaded"
            ),
            None => warn!(
                mission,
                items = plan.len(),
                "Return-to-launch plan without planned home, landing cannot be detected"
            ),
        }

        self.transition(MissionPhase::Connecting);
        let mut connection = self.link.connection_state();
        self.link.connect().await.map_err(MissionError::Connection)?;
        wait_for(&mut connection, |state| state.is_connected)
            .await
            .ok_or(MissionError::Connection(LinkError::StreamClosed("connection state")))?;
        info!("Vehicle connected");

        self.transition(MissionPhase::AwaitingHealth);
        let mut health = self.link.health();
        wait_for(&mut health, Health::is_ready)
            .await
            .ok_or(MissionError::Connection(LinkError::StreamClosed("health")))?;
        info!("Global and home position estimates ready");
        drop(health);
        drop(connection);

        self.transition(MissionPhase::UploadingMission);
        self.link.upload_mission(&plan).await?;

        self.transition(MissionPhase::TakingOff);
        let takeoff_attempts = attempt_takeoff(&mut self.link, &self.config.takeoff).await?;

        self.transition(MissionPhase::Recording);
        let log_path = self.config.log_path(mission);
        let rows = self.record(&log_path, expected).await?;

        self.transition(MissionPhase::Done);
        info!(mission, rows, path = %log_path.display(), "Trajectory saved");
        Ok(MissionReport {
            mission: mission.to_string(),
            log_path,
            rows,
            takeoff_attempts,
        })
    }

    async fn record(
        &mut self,
        log_path: &Path,
        expected: Option<ExpectedEndPosition>,
    ) -> Result<u64, MissionError> {
        fs::create_dir_all(&self.config.trajectories_dir)?;
        let file = File::create(log_path)?;
        let detector = LandingDetector::new(self.config.detection, expected);
        let mut recorder = TrajectoryRecorder::new(BufWriter::new(file), detector)?;
        info!(path = %log_path.display(), "Recording trajectory");

        let positions = self.link.position();
        let odometry = self.link.odometry();
        let shared = SharedPosition::new();
        run_race(&mut recorder, positions, odometry, &shared).await?;

        let rows = recorder.rows_written();
        recorder.finish()?;
        Ok(rows)
    }

    fn transition(&mut self, next: MissionPhase) {
        info!(from = %self.phase, to = %next, "Mission phase");
        self.phase = next;
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = Result<T, MissionError>>,
) -> Result<T, MissionError> {
    match deadline {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| MissionError::DeadlineExceeded(limit))?,
        None => fut.await,
    }
}

/// Wait for the first sample satisfying `ready`. `None` if the stream ends.
async fn wait_for<T>(subscription: &mut Subscription<T>, ready: impl Fn(&T) -> bool) -> Option<T> {
    while let Some(value) = subscription.next().await {
        if ready(&value) {
            return Some(value);
        }
    }
    None
}
