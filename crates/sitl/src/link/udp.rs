//! MAVLink over UDP link to a PX4 SITL vehicle.
//!
//! A single spawned task owns the receive side of the socket, publishes
//! decoded telemetry to per-stream [`Topic`]s, and sends the GCS heartbeat.
//! Commands and mission uploads run on the caller's task and read protocol
//! replies from their own subscription.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use flightbatch_core::{Health, MissionPlan, Odometry, Position};
use mavlink::common::*;
use mavlink::MavHeader;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{self, Target, VehicleEvent};
use super::subscription::DEFAULT_CAPACITY;
use super::{ConnectionState, Subscription, Topic, VehicleLink};
use crate::error::LinkError;

/// MAVLink link settings.
#[derive(Debug, Clone)]
pub struct MavlinkConfig {
    /// Local UDP address the vehicle sends to.
    pub listen_addr: SocketAddr,
    /// Vehicle system/component to command.
    pub target: Target,
    /// Our system ID on the MAVLink network.
    pub gcs_system_id: u8,
    /// Our component ID on the MAVLink network.
    pub gcs_component_id: u8,
    /// How long to wait for a COMMAND_ACK.
    pub command_timeout: Duration,
    /// How long to wait for each mission protocol reply.
    pub mission_item_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Per-subscription queue depth.
    pub channel_capacity: usize,
}

impl Default for MavlinkConfig {
    fn default() -> Self {
        Self {
            // PX4 SITL offboard API port
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 14540)),
            target: Target::default(),
            gcs_system_id: 255,
            gcs_component_id: 190, // MAV_COMP_ID_MISSIONPLANNER
            command_timeout: Duration::from_secs(5),
            mission_item_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            channel_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Telemetry fan-out points, alive for the whole life of the link.
struct Topics {
    connection: Topic<ConnectionState>,
    health: Topic<Health>,
    in_air: Topic<bool>,
    position: Topic<Position>,
    odometry: Topic<Odometry>,
    replies: Topic<MavMessage>,
    health_state: Mutex<Health>,
}

impl Topics {
    fn new(capacity: usize) -> Self {
        Self {
            connection: Topic::with_capacity("connection", capacity),
            health: Topic::with_capacity("health", capacity),
            in_air: Topic::with_capacity("in_air", capacity),
            position: Topic::with_capacity("position", capacity),
            odometry: Topic::with_capacity("odometry", capacity),
            replies: Topic::with_capacity("replies", capacity),
            health_state: Mutex::new(Health::default()),
        }
    }

    fn dispatch(&self, msg: MavMessage) {
        let Some(event) = protocol::decode(&msg) else {
            return;
        };
        match event {
            VehicleEvent::Heartbeat => {
                self.connection.publish(ConnectionState { is_connected: true });
                self.update_health(|_| {});
            }
            VehicleEvent::GpsHealth(ok) => self.update_health(|h| h.global_position_ok = ok),
            VehicleEvent::HomePosition => self.update_health(|h| h.home_position_ok = true),
            VehicleEvent::Position(position) => self.position.publish(position),
            VehicleEvent::InAir(in_air) => self.in_air.publish(in_air),
            VehicleEvent::Odometry(odometry) => self.odometry.publish(odometry),
            VehicleEvent::Reply => self.replies.publish(msg),
        }
    }

    fn update_health(&self, apply: impl FnOnce(&mut Health)) {
        let health = {
            let mut state = self
                .health_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            apply(&mut state);
            *state
        };
        self.health.publish(health);
    }

    fn close(&self) {
        self.connection.close();
        self.health.close();
        self.in_air.close();
        self.position.close();
        self.odometry.close();
        self.replies.close();
    }
}

/// Send side of the socket plus the discovered vehicle address.
struct LinkIo {
    socket: UdpSocket,
    vehicle_addr: Mutex<Option<SocketAddr>>,
    system_id: u8,
    component_id: u8,
    sequence: AtomicU8,
}

impl LinkIo {
    fn vehicle_addr(&self) -> Option<SocketAddr> {
        *self
            .vehicle_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remember_vehicle(&self, addr: SocketAddr) {
        let mut current = self
            .vehicle_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if current.is_none() {
            info!(%addr, "Vehicle endpoint discovered");
            *current = Some(addr);
        }
    }

    async fn send(&self, msg: &MavMessage) -> Result<(), LinkError> {
        let addr = self.vehicle_addr().ok_or(LinkError::NotConnected)?;
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let bytes = protocol::encode(header, msg)?;
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }
}

/// [`VehicleLink`] over MAVLink v2 / UDP.
pub struct MavlinkLink {
    config: MavlinkConfig,
    topics: Arc<Topics>,
    io: Option<Arc<LinkIo>>,
    task: Option<JoinHandle<()>>,
}

impl MavlinkLink {
    pub fn new(config: MavlinkConfig) -> Self {
        let topics = Arc::new(Topics::new(config.channel_capacity));
        Self {
            config,
            topics,
            io: None,
            task: None,
        }
    }

    pub fn config(&self) -> &MavlinkConfig {
        &self.config
    }

    /// Bound local address, once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.io.as_ref().and_then(|io| io.socket.local_addr().ok())
    }

    fn io(&self) -> Result<&Arc<LinkIo>, LinkError> {
        self.io.as_ref().ok_or(LinkError::NotConnected)
    }

    async fn command(
        &self,
        name: &'static str,
        command: MavCmd,
        params: [f32; 7],
    ) -> Result<(), LinkError> {
        let io = self.io()?;
        let mut replies = self.topics.replies.subscribe();
        io.send(&protocol::build_command_long(self.config.target, command, params))
            .await?;
        debug!(command = name, "Command sent");

        let wait_ack = async {
            while let Some(msg) = replies.next().await {
                if let MavMessage::COMMAND_ACK(ack) = msg {
                    if ack.command == command && ack.result != MavResult::MAV_RESULT_IN_PROGRESS {
                        return Some(ack.result);
                    }
                }
            }
            None
        };
        let result = timeout(self.config.command_timeout, wait_ack)
            .await
            .map_err(|_| LinkError::Timeout(name))?
            .ok_or(LinkError::StreamClosed("command reply"))?;

        match result {
            MavResult::MAV_RESULT_ACCEPTED => Ok(()),
            other => Err(LinkError::CommandRejected {
                command: name,
                result: format!("{other:?}"),
            }),
        }
    }

    async fn upload_items(
        &self,
        items: &[MISSION_ITEM_INT_DATA],
        mission_type: MavMissionType,
    ) -> Result<(), LinkError> {
        let io = self.io()?;
        let count = u16::try_from(items.len())
            .map_err(|_| LinkError::ProtocolError(format!("{} items exceed u16", items.len())))?;
        let mut replies = self.topics.replies.subscribe();
        io.send(&protocol::build_mission_count(self.config.target, count, mission_type))
            .await?;
        debug!(?mission_type, count, "MISSION_COUNT sent");

        loop {
            let reply = timeout(
                self.config.mission_item_timeout,
                next_mission_reply(&mut replies, mission_type),
            )
            .await
            .map_err(|_| LinkError::Timeout("mission request"))?
            .ok_or(LinkError::StreamClosed("mission reply"))?;

            match reply {
                MissionReply::Request(seq) => {
                    let item = items.get(usize::from(seq)).ok_or_else(|| {
                        LinkError::ProtocolError(format!("vehicle requested item {seq} of {count}"))
                    })?;
                    io.send(&MavMessage::MISSION_ITEM_INT(item.clone())).await?;
                    debug!(seq, "MISSION_ITEM_INT sent");
                }
                MissionReply::Ack(MavMissionResult::MAV_MISSION_ACCEPTED) => return Ok(()),
                MissionReply::Ack(other) => {
                    return Err(LinkError::MissionRejected(format!("{other:?}")));
                }
            }
        }
    }
}

impl Drop for MavlinkLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum MissionReply {
    Request(u16),
    Ack(MavMissionResult),
}

async fn next_mission_reply(
    replies: &mut Subscription<MavMessage>,
    mission_type: MavMissionType,
) -> Option<MissionReply> {
    while let Some(msg) = replies.next().await {
        match msg {
            MavMessage::MISSION_REQUEST_INT(req) if req.mission_type == mission_type => {
                return Some(MissionReply::Request(req.seq));
            }
            MavMessage::MISSION_REQUEST(req) if req.mission_type == mission_type => {
                return Some(MissionReply::Request(req.seq));
            }
            MavMessage::MISSION_ACK(ack) if ack.mission_type == mission_type => {
                return Some(MissionReply::Ack(ack.mavtype));
            }
            _ => {}
        }
    }
    None
}

/// Receive datagrams and send the GCS heartbeat until the link is dropped.
async fn run_io(io: Arc<LinkIo>, topics: Arc<Topics>, target: Target, heartbeat: Duration) {
    let mut buf = vec![0u8; 2048];
    let mut heartbeat = tokio::time::interval(heartbeat);
    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                match io.send(&protocol::build_gcs_heartbeat()).await {
                    Ok(()) | Err(LinkError::NotConnected) => {}
                    Err(e) => debug!("Heartbeat send failed: {e}"),
                }
            }
            received = io.socket.recv_from(&mut buf) => {
                let (len, addr) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("UDP receive failed: {e}");
                        break;
                    }
                };
                for (header, msg) in protocol::parse_datagram(&buf[..len]) {
                    if header.system_id != target.system {
                        continue;
                    }
                    io.remember_vehicle(addr);
                    topics.dispatch(msg);
                }
            }
        }
    }
    topics.close();
}

#[async_trait]
impl VehicleLink for MavlinkLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        if self.io.is_some() {
            return Ok(());
        }
        let addr = self.config.listen_addr;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| LinkError::ConnectionFailed(format!("bind {addr}: {e}")))?;
        info!(addr = %socket.local_addr().unwrap_or(addr), "Listening for vehicle");

        let io = Arc::new(LinkIo {
            socket,
            vehicle_addr: Mutex::new(None),
            system_id: self.config.gcs_system_id,
            component_id: self.config.gcs_component_id,
            sequence: AtomicU8::new(0),
        });
        self.task = Some(tokio::spawn(run_io(
            Arc::clone(&io),
            Arc::clone(&self.topics),
            self.config.target,
            self.config.heartbeat_interval,
        )));
        self.io = Some(io);
        Ok(())
    }

    fn connection_state(&mut self) -> Subscription<ConnectionState> {
        self.topics.connection.subscribe()
    }

    fn health(&mut self) -> Subscription<Health> {
        self.topics.health.subscribe()
    }

    async fn upload_mission(&mut self, plan: &MissionPlan) -> Result<(), LinkError> {
        let target = self.config.target;
        let items = protocol::build_mission_items(target, plan)?;
        self.upload_items(&items, MavMissionType::MAV_MISSION_TYPE_MISSION)
            .await?;
        info!(items = items.len(), "Mission uploaded");

        if !plan.rally_points().is_empty() {
            let rally = protocol::build_rally_items(target, plan.rally_points());
            self.upload_items(&rally, MavMissionType::MAV_MISSION_TYPE_RALLY)
                .await?;
            info!(points = rally.len(), "Rally points uploaded");
        }
        Ok(())
    }

    async fn arm(&mut self) -> Result<(), LinkError> {
        self.command(
            "arm",
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
        .await
    }

    async fn start_mission(&mut self) -> Result<(), LinkError> {
        self.command("start mission", MavCmd::MAV_CMD_MISSION_START, [0.0; 7])
            .await
    }

    fn in_air(&mut self) -> Subscription<bool> {
        self.topics.in_air.subscribe()
    }

    fn position(&mut self) -> Subscription<Position> {
        self.topics.position.subscribe()
    }

    fn odometry(&mut self) -> Subscription<Odometry> {
        self.topics.odometry.subscribe()
    }
}
