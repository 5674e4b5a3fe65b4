//! Scripted vehicle link for testing.
//!
//! Every subscription replays a [`Script`] of timed samples from a spawned
//! producer, so tests driven by a paused tokio clock see telemetry arrive at
//! exact virtual times. Command calls are recorded with the instant they
//! were made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flightbatch_core::{Health, MissionPlan, Odometry, Position};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{ConnectionState, Subscription, VehicleLink};
use crate::error::LinkError;

/// Timed samples delivered to one subscription.
///
/// Offsets are measured from the moment of subscription. After the last
/// sample the stream either stays open (default) or ends.
#[derive(Debug, Clone)]
pub struct Script<T> {
    steps: Vec<(Duration, T)>,
    keep_open: bool,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            keep_open: true,
        }
    }
}

impl<T: Clone + Send + 'static> Script<T> {
    /// A stream that stays silent and open.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream that ends immediately.
    pub fn closed() -> Self {
        Self::new().then_close()
    }

    /// A stream that delivers `value` right away and stays open.
    pub fn immediate(value: T) -> Self {
        Self::new().at(Duration::ZERO, value)
    }

    /// Deliver `value` at `offset` after subscription.
    pub fn at(mut self, offset: Duration, value: T) -> Self {
        self.steps.push((offset, value));
        self
    }

    /// End the stream after the last sample.
    pub fn then_close(mut self) -> Self {
        self.keep_open = false;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn play(self, released: Arc<AtomicBool>) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.steps.len().max(1));
        let Script { steps, keep_open } = self;
        tokio::spawn(async move {
            let start = Instant::now();
            let feed = async {
                for (offset, value) in steps {
                    tokio::time::sleep_until(start + offset).await;
                    if tx.send(value).await.is_err() {
                        return;
                    }
                }
                if keep_open {
                    std::future::pending::<()>().await;
                }
            };
            tokio::select! {
                _ = tx.closed() => {}
                _ = feed => {}
            }
            if tx.is_closed() {
                released.store(true, Ordering::SeqCst);
            }
        });
        Subscription::new(rx)
    }
}

/// Recorded link operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCall {
    Connect,
    UploadMission,
    Arm,
    StartMission,
    SubscribeInAir,
}

/// [`VehicleLink`] that replays scripted telemetry.
///
/// Defaults: connect succeeds, the vehicle reports connected and healthy
/// immediately, commands are accepted, and it never becomes airborne.
#[derive(Debug)]
pub struct MockLink {
    connect_error: Option<LinkError>,
    upload_error: Option<LinkError>,
    arm_results: VecDeque<Result<(), LinkError>>,
    start_results: VecDeque<Result<(), LinkError>>,
    connection: Script<ConnectionState>,
    health: Script<Health>,
    in_air: VecDeque<Script<bool>>,
    position: Script<Position>,
    odometry: Script<Odometry>,
    calls: Vec<(MockCall, Instant)>,
    uploaded_items: Option<usize>,
    position_released: Vec<Arc<AtomicBool>>,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            connect_error: None,
            upload_error: None,
            arm_results: VecDeque::new(),
            start_results: VecDeque::new(),
            connection: Script::immediate(ConnectionState { is_connected: true }),
            health: Script::immediate(Health {
                global_position_ok: true,
                home_position_ok: true,
            }),
            in_air: VecDeque::new(),
            position: Script::new(),
            odometry: Script::new(),
            calls: Vec::new(),
            uploaded_items: None,
            position_released: Vec::new(),
        }
    }

    pub fn fail_connect(mut self, error: LinkError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn fail_upload(mut self, error: LinkError) -> Self {
        self.upload_error = Some(error);
        self
    }

    /// Queue the result of the next `arm()` call.
    pub fn push_arm_result(mut self, result: Result<(), LinkError>) -> Self {
        self.arm_results.push_back(result);
        self
    }

    /// Queue the result of the next `start_mission()` call.
    pub fn push_start_result(mut self, result: Result<(), LinkError>) -> Self {
        self.start_results.push_back(result);
        self
    }

    pub fn with_connection(mut self, script: Script<ConnectionState>) -> Self {
        self.connection = script;
        self
    }

    pub fn with_health(mut self, script: Script<Health>) -> Self {
        self.health = script;
        self
    }

    /// Queue the script for the next `in_air()` subscription.
    ///
    /// Subscriptions beyond the queued scripts never report airborne.
    pub fn push_in_air(mut self, script: Script<bool>) -> Self {
        self.in_air.push_back(script);
        self
    }

    pub fn with_position(mut self, script: Script<Position>) -> Self {
        self.position = script;
        self
    }

    pub fn with_odometry(mut self, script: Script<Odometry>) -> Self {
        self.odometry = script;
        self
    }

    /// Every recorded call with its instant.
    pub fn calls(&self) -> &[(MockCall, Instant)] {
        &self.calls
    }

    /// Instants at which `call` was made.
    pub fn call_times(&self, call: MockCall) -> Vec<Instant> {
        self.calls
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn count(&self, call: MockCall) -> usize {
        self.calls.iter().filter(|(c, _)| *c == call).count()
    }

    /// Item count of the last uploaded mission.
    pub fn uploaded_items(&self) -> Option<usize> {
        self.uploaded_items
    }

    /// Whether every position subscription handed out has been dropped.
    ///
    /// The producer notices a dropped receiver on its next poll, so callers
    /// should yield to the runtime before asking.
    pub fn position_released(&self) -> bool {
        self.position_released
            .iter()
            .all(|flag| flag.load(Ordering::SeqCst))
    }

    fn record(&mut self, call: MockCall) {
        self.calls.push((call, Instant::now()));
    }
}

#[async_trait]
impl VehicleLink for MockLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.record(MockCall::Connect);
        match self.connect_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn connection_state(&mut self) -> Subscription<ConnectionState> {
        self.connection.clone().play(Arc::default())
    }

    fn health(&mut self) -> Subscription<Health> {
        self.health.clone().play(Arc::default())
    }

    async fn upload_mission(&mut self, plan: &MissionPlan) -> Result<(), LinkError> {
        self.record(MockCall::UploadMission);
        if let Some(error) = self.upload_error.take() {
            return Err(error);
        }
        self.uploaded_items = Some(plan.len());
        Ok(())
    }

    async fn arm(&mut self) -> Result<(), LinkError> {
        self.record(MockCall::Arm);
        self.arm_results.pop_front().unwrap_or(Ok(()))
    }

    async fn start_mission(&mut self) -> Result<(), LinkError> {
        self.record(MockCall::StartMission);
        self.start_results.pop_front().unwrap_or(Ok(()))
    }

    fn in_air(&mut self) -> Subscription<bool> {
        self.record(MockCall::SubscribeInAir);
        self.in_air
            .pop_front()
            .unwrap_or_default()
            .play(Arc::default())
    }

    fn position(&mut self) -> Subscription<Position> {
        let released = Arc::new(AtomicBool::new(false));
        self.position_released.push(Arc::clone(&released));
        self.position.clone().play(released)
    }

    fn odometry(&mut self) -> Subscription<Odometry> {
        self.odometry.clone().play(Arc::default())
    }
}
