//! Simulator Supervisor
//!
//! Starts PX4 SITL with the mission's home position, waits for it to report
//! ready, runs the mission in-process and shuts the simulator down through
//! its console.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use flightbatch_core::{home_position, GeoPoint};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::{MissionController, MissionOutcome};
use crate::error::SupervisorError;
use crate::link::VehicleLink;

/// Line PX4 prints once the vehicle can be armed.
pub const DEFAULT_READY_MARKER: &str = "Ready for takeoff!";
/// Simulation speed multiplier passed to PX4.
pub const DEFAULT_SPEED_FACTOR: u32 = 50;

/// How to start the simulator.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Directory to start the simulator in, usually the PX4-Autopilot checkout.
    pub working_dir: Option<PathBuf>,
    pub speed_factor: u32,
    pub ready_marker: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            args: vec!["px4_sitl".to_string(), "gazebo-classic".to_string()],
            working_dir: None,
            speed_factor: DEFAULT_SPEED_FACTOR,
            ready_marker: DEFAULT_READY_MARKER.to_string(),
        }
    }
}

/// Environment that places the simulated vehicle at `home`.
pub fn simulator_env(home: GeoPoint, speed_factor: u32) -> Vec<(&'static str, String)> {
    vec![
        ("PX4_HOME_LAT", home.lat_deg.to_string()),
        ("PX4_HOME_LON", home.lon_deg.to_string()),
        ("PX4_HOME_ALT", home.alt_m.to_string()),
        ("PX4_SIM_SPEED_FACTOR", speed_factor.to_string()),
    ]
}

/// A running simulator process.
#[derive(Debug)]
pub struct SimulatorProcess {
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    drains: Vec<JoinHandle<()>>,
}

impl SimulatorProcess {
    /// Spawn the simulator with piped stdio.
    pub fn launch(config: &SupervisorConfig, home: GeoPoint) -> Result<Self, SupervisorError> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .envs(simulator_env(home, config.speed_factor))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            program: config.program.clone(),
            source,
        })?;
        info!(program = %config.program, pid = ?child.id(), %home, "Simulator started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("simulator stdout not captured"))?;
        let mut drains = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain_lines(
                BufReader::new(stderr).lines(),
                "stderr",
            )));
        }

        Ok(Self {
            child,
            stdout: Some(BufReader::new(stdout).lines()),
            drains,
        })
    }

    /// Read stdout until a line contains `marker`.
    ///
    /// Later output is forwarded to the log in the background so the pipe
    /// never fills up.
    pub async fn wait_ready(&mut self, marker: &str) -> Result<(), SupervisorError> {
        let Some(lines) = self.stdout.as_mut() else {
            return Ok(());
        };
        while let Some(line) = lines.next_line().await? {
            debug!(target: "simulator", "{line}");
            if line.contains(marker) {
                info!("Simulator ready");
                if let Some(rest) = self.stdout.take() {
                    self.drains.push(tokio::spawn(drain_lines(rest, "stdout")));
                }
                return Ok(());
            }
        }
        Err(SupervisorError::NotReady(marker.to_string()))
    }

    /// Ask the simulator to exit and wait for it.
    pub async fn shutdown(mut self) -> Result<ExitStatus, SupervisorError> {
        if let Some(mut stdin) = self.child.stdin.take() {
            info!("Sending shutdown to simulator");
            let sent = async {
                stdin.write_all(b"shutdown\n").await?;
                stdin.flush().await
            };
            if let Err(e) = sent.await {
                // Already gone, nothing to tell it.
                debug!("Simulator console closed: {e}");
            }
        }
        let status = self.child.wait().await?;
        for drain in self.drains.drain(..) {
            if let Err(e) = drain.await {
                debug!("Simulator output drain failed: {e}");
            }
        }
        info!(%status, "Simulator exited");
        Ok(status)
    }
}

async fn drain_lines<R: AsyncRead + Unpin>(mut lines: Lines<BufReader<R>>, stream: &'static str) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "simulator", stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(stream, "Simulator output unreadable: {e}");
                break;
            }
        }
    }
}

/// Run `mission` inside a freshly started simulator.
///
/// The simulator is shut down on every path once it has been started,
/// including cancellation while waiting for it to become ready.
pub async fn supervise<L: VehicleLink>(
    config: &SupervisorConfig,
    controller: &mut MissionController<L>,
    mission: &str,
    cancel: impl Future<Output = ()>,
) -> Result<MissionOutcome, SupervisorError> {
    let home = home_position(controller.config().plan_path(mission))?;
    let mut simulator = SimulatorProcess::launch(config, home)?;

    tokio::pin!(cancel);
    let ready = tokio::select! {
        biased;
        () = &mut cancel => None,
        ready = simulator.wait_ready(&config.ready_marker) => Some(ready),
    };

    let result = match ready {
        None => {
            warn!(mission, "Cancelled while waiting for simulator");
            Ok(MissionOutcome::Cancelled {
                phase: controller.phase(),
            })
        }
        Some(Err(e)) => Err(e),
        Some(Ok(())) => controller
            .run(mission, &mut cancel)
            .await
            .map_err(SupervisorError::from),
    };

    let shutdown = simulator.shutdown().await;
    let outcome = result?;
    shutdown?;
    Ok(outcome)
}
