//! flightbatch - run one simulated mission and save its trajectory
//!
//! ```text
//! flightbatch run survey_01          # vehicle already running
//! flightbatch supervise survey_01    # start PX4 SITL first
//! ```
//!
//! Exit status: 0 when the mission completed, 1 on failure, 130 when
//! interrupted by SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flightbatch_core::DetectionConfig;
use flightbatch_sitl::{
    supervise, MavlinkConfig, MavlinkLink, MissionConfig, MissionController, MissionOutcome,
    SupervisorConfig, TakeoffConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status for an interrupted run, as shells report SIGINT.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "flightbatch")]
#[command(about = "Fly a mission in PX4 SITL and record its trajectory")]
#[command(version)]
struct Args {
    /// Directory holding <mission>.plan files
    #[arg(long, global = true, default_value = "plans")]
    plans_dir: PathBuf,

    /// Directory receiving <mission>_log.csv files
    #[arg(long, global = true, default_value = "trajectories")]
    trajectories_dir: PathBuf,

    /// Local UDP address the vehicle sends MAVLink to
    #[arg(long, global = true, default_value = "0.0.0.0:14540")]
    listen: SocketAddr,

    /// Abort the mission after this many seconds (default: no limit)
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Accepted samples before and after arrival at the end position
    #[arg(long, global = true, default_value_t = flightbatch_core::landing::SETTLE_WINDOW_SAMPLES)]
    settle_window: u32,

    /// Takeoff attempts before giving up
    #[arg(long, global = true, default_value_t = flightbatch_sitl::engine::takeoff::DEFAULT_MAX_ATTEMPTS)]
    takeoff_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a mission against an already running vehicle
    Run {
        /// Mission name, without the .plan extension
        mission: String,
    },

    /// Start the simulator, run a mission, then shut the simulator down
    Supervise {
        /// Mission name, without the .plan extension
        mission: String,

        /// Simulator command
        #[arg(long, default_value = "make")]
        program: String,

        /// Simulator arguments
        #[arg(
            long,
            num_args = 1..,
            allow_hyphen_values = true,
            default_values = ["px4_sitl", "gazebo-classic"]
        )]
        sim_args: Vec<String>,

        /// Directory to start the simulator in (PX4-Autopilot checkout)
        #[arg(long)]
        px4_dir: Option<PathBuf>,

        /// Simulation speed factor
        #[arg(long, default_value_t = flightbatch_sitl::supervisor::DEFAULT_SPEED_FACTOR)]
        speed_factor: u32,
    },
}

impl Args {
    fn mission_config(&self) -> MissionConfig {
        MissionConfig {
            plans_dir: self.plans_dir.clone(),
            trajectories_dir: self.trajectories_dir.clone(),
            detection: DetectionConfig {
                settle_window: self.settle_window,
                ..Default::default()
            },
            takeoff: TakeoffConfig {
                max_attempts: self.takeoff_attempts,
                ..Default::default()
            },
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }

    fn link_config(&self) -> MavlinkConfig {
        MavlinkConfig {
            listen_addr: self.listen,
            ..Default::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let result = run(args).await;
    match &result {
        Ok(MissionOutcome::Completed(report)) => info!(
            mission = %report.mission,
            rows = report.rows,
            path = %report.log_path.display(),
            "Mission completed"
        ),
        Ok(MissionOutcome::Cancelled { phase }) => warn!(%phase, "Mission interrupted"),
        Err(e) => error!("{e:#}"),
    }
    ExitCode::from(exit_status(&result))
}

/// Process exit status for a finished run.
fn exit_status(result: &Result<MissionOutcome>) -> u8 {
    match result {
        Ok(MissionOutcome::Completed(_)) => 0,
        Ok(MissionOutcome::Cancelled { .. }) => EXIT_CANCELLED,
        Err(_) => 1,
    }
}

async fn run(args: Args) -> Result<MissionOutcome> {
    let link = MavlinkLink::new(args.link_config());
    let mut controller = MissionController::new(link, args.mission_config());

    match &args.command {
        Command::Run { mission } => controller
            .run(mission, shutdown_signal())
            .await
            .with_context(|| format!("mission {mission} failed")),
        Command::Supervise {
            mission,
            program,
            sim_args,
            px4_dir,
            speed_factor,
        } => {
            let config = SupervisorConfig {
                program: program.clone(),
                args: sim_args.clone(),
                working_dir: px4_dir.clone(),
                speed_factor: *speed_factor,
                ..Default::default()
            };
            supervise(&config, &mut controller, mission, shutdown_signal())
                .await
                .with_context(|| format!("supervised mission {mission} failed"))
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed never fires instead of aborting the run.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping mission"),
        _ = terminate => info!("Received SIGTERM, stopping mission"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightbatch_sitl::{MissionPhase, MissionReport};

    #[test]
    fn test_exit_status_completed() {
        let report = MissionReport {
            mission: "survey_01".to_string(),
            log_path: PathBuf::from("logs/survey_01.csv"),
            rows: 45,
            takeoff_attempts: 1,
        };
        assert_eq!(exit_status(&Ok(MissionOutcome::Completed(report))), 0);
    }

    #[test]
    fn test_exit_status_failed() {
        let result = Err(anyhow::anyhow!("mission survey_01 failed"));
        assert_eq!(exit_status(&result), 1);
    }

    #[test]
    fn test_exit_status_cancelled() {
        let result = Ok(MissionOutcome::Cancelled {
            phase: MissionPhase::Recording,
        });
        assert_eq!(exit_status(&result), 130);
    }
}
