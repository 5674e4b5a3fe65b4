//! Takeoff sequencing with bounded retries.
//!
//! Each attempt arms, starts the mission and then waits a short time for the
//! vehicle to report airborne on a fresh subscription. PX4 SITL regularly
//! rejects the first arm request while its estimators converge, so a failed
//! attempt is retried after a backoff.

use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::error::{LinkError, TakeoffFailure};
use crate::link::VehicleLink;

/// Default number of takeoff attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default wait for the airborne report after start.
pub const DEFAULT_AIRBORNE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default pause between failed attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Takeoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeoffConfig {
    pub max_attempts: u32,
    pub airborne_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for TakeoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            airborne_timeout: DEFAULT_AIRBORNE_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Result of one takeoff attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Vehicle reported airborne in time.
    Succeeded,
    /// No airborne report within the timeout.
    TimedOut,
    /// Arm, start or the airborne stream failed.
    Errored(LinkError),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Run the takeoff sequence.
///
/// Returns the number of the attempt that got the vehicle airborne, or every
/// attempt's outcome once all have failed.
pub async fn attempt_takeoff<L: VehicleLink + ?Sized>(
    link: &mut L,
    config: &TakeoffConfig,
) -> Result<u32, TakeoffFailure> {
    let mut attempts = Vec::with_capacity(config.max_attempts as usize);

    for attempt in 1..=config.max_attempts {
        info!(attempt, max = config.max_attempts, "Takeoff attempt");
        let outcome = run_attempt(link, config.airborne_timeout).await;
        match &outcome {
            AttemptOutcome::Succeeded => {
                info!(attempt, "Vehicle airborne");
                return Ok(attempt);
            }
            AttemptOutcome::TimedOut => {
                warn!(attempt, timeout = ?config.airborne_timeout, "Vehicle not airborne in time");
            }
            AttemptOutcome::Errored(e) => warn!(attempt, "Takeoff attempt failed: {e}"),
        }
        attempts.push(outcome);

        if attempt < config.max_attempts {
            sleep(config.retry_backoff).await;
        }
    }

    Err(TakeoffFailure { attempts })
}

async fn run_attempt<L: VehicleLink + ?Sized>(link: &mut L, airborne_timeout: Duration) -> AttemptOutcome {
    if let Err(e) = link.arm().await {
        return AttemptOutcome::Errored(e);
    }
    if let Err(e) = link.start_mission().await {
        return AttemptOutcome::Errored(e);
    }

    let mut in_air = link.in_air();
    let airborne = async {
        while let Some(flag) = in_air.next().await {
            if flag {
                return true;
            }
        }
        false
    };

    match timeout(airborne_timeout, airborne).await {
        Ok(true) => AttemptOutcome::Succeeded,
        Ok(false) => AttemptOutcome::Errored(LinkError::StreamClosed("in_air")),
        Err(_) => AttemptOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{MockCall, MockLink, Script};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_succeeds() {
        let mut link = MockLink::new().push_in_air(
            Script::new()
                .at(Duration::from_millis(100), false)
                .at(Duration::from_millis(300), true),
        );
        let attempt = attempt_takeoff(&mut link, &TakeoffConfig::default()).await;
        assert_eq!(attempt.unwrap(), 1);
        assert_eq!(link.count(MockCall::Arm), 1);
        assert_eq!(link.count(MockCall::StartMission), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_rejected_arm() {
        let mut link = MockLink::new()
            .push_arm_result(Err(LinkError::CommandRejected {
                command: "arm",
                result: "MAV_RESULT_TEMPORARILY_REJECTED".into(),
            }))
            .push_in_air(Script::immediate(true));

        let start = Instant::now();
        let attempt = attempt_takeoff(&mut link, &TakeoffConfig::default()).await;
        assert_eq!(attempt.unwrap(), 2);
        // Rejected arm skips start and the airborne wait, only the backoff applies.
        assert_eq!(link.count(MockCall::StartMission), 1);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_every_attempt() {
        let mut link = MockLink::new();
        let start = Instant::now();
        let failure = attempt_takeoff(&mut link, &TakeoffConfig::default())
            .await
            .unwrap_err();

        assert_eq!(failure.attempts.len(), 5);
        assert!(failure
            .attempts
            .iter()
            .all(|a| matches!(a, AttemptOutcome::TimedOut)));
        assert_eq!(link.count(MockCall::Arm), 5);

        // 5 airborne waits and 4 backoffs, no trailing backoff
        assert_eq!(start.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_airborne_stream_is_an_error() {
        let mut link = MockLink::new().push_in_air(Script::closed());
        let config = TakeoffConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let failure = attempt_takeoff(&mut link, &config).await.unwrap_err();
        assert!(matches!(
            failure.attempts[..],
            [AttemptOutcome::Errored(LinkError::StreamClosed("in_air"))]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ground_reports_do_not_count() {
        let mut link = MockLink::new().push_in_air(
            Script::new()
                .at(Duration::ZERO, false)
                .at(Duration::from_millis(500), false),
        );
        let config = TakeoffConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let failure = attempt_takeoff(&mut link, &config).await.unwrap_err();
        assert!(!failure.attempts[0].is_success());
    }
}
