//! UDP transport and the peer's main loop

use crate::directory::PeerDirectory;
use crate::error::TransportError;
use crate::physics::{speed_kmh, BoatTuning, ControlAction, KinematicHull, RigidBody};
use crate::scheduler::{SendObserver, SyncConfig};
use crate::session::Session;
use crate::transport::{PeerId, Transport, TransportEvent};
use bincode::{deserialize, serialize};
use glam::Vec3;
use log::{debug, error, info, trace, warn};
use rand::Rng;
use shared::{current_timestamp, Packet, Transform, HELLO_RETRY_MS, PEER_TIMEOUT_MS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Peer-to-peer transport over a single UDP socket.
///
/// Sends are non-blocking `try_send_to` calls from the simulation thread;
/// receiving, handshakes and timeouts run on spawned tasks that report
/// through a [`TransportEvent`] channel.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    directory: Arc<Mutex<PeerDirectory>>,
}

fn lock(directory: &Mutex<PeerDirectory>) -> MutexGuard<'_, PeerDirectory> {
    directory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UdpTransport {
    pub async fn bind(
        addr: &str,
        relayed: Vec<SocketAddr>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Peer listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            directory: Arc::new(Mutex::new(PeerDirectory::new(relayed))),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.directory).len()
    }

    async fn send_control(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) {
        match serialize(packet) {
            Ok(data) => {
                if let Err(e) = socket.send_to(&data, addr).await {
                    warn!("Failed to send {} to {}: {}", packet.kind(), addr, e);
                }
            }
            Err(e) => error!("Failed to encode {}: {}", packet.kind(), e),
        }
    }

    /// Handles one datagram on the receive task.
    async fn handle_datagram(
        socket: &UdpSocket,
        directory: &Mutex<PeerDirectory>,
        events: &mpsc::UnboundedSender<TransportEvent>,
        packet: Packet,
        addr: SocketAddr,
    ) -> Result<(), mpsc::error::SendError<TransportEvent>> {
        match packet {
            Packet::Hello { version } | Packet::Welcome { version } if version != PROTOCOL_VERSION => {
                warn!(
                    "Refusing {} with protocol version {} (expected {})",
                    addr, version, PROTOCOL_VERSION
                );
            }
            Packet::Hello { .. } => {
                let (peer, link, added) = lock(directory).register(addr);
                if added {
                    events.send(TransportEvent::PeerConnected { peer, link })?;
                }
                let reply = Packet::Welcome {
                    version: PROTOCOL_VERSION,
                };
                Self::send_control(socket, &reply, addr).await;
            }
            Packet::Welcome { .. } => {
                let (peer, link, added) = lock(directory).register(addr);
                if added {
                    events.send(TransportEvent::PeerConnected { peer, link })?;
                }
            }
            Packet::Bye => {
                let removed = {
                    let mut directory = lock(directory);
                    let peer = directory.find_by_addr(addr);
                    if let Some(id) = peer {
                        directory.remove(id);
                    }
                    peer
                };
                if let Some(peer) = removed {
                    events.send(TransportEvent::PeerDisconnected { peer })?;
                }
            }
            packet => {
                let peer = {
                    let mut directory = lock(directory);
                    let peer = directory.find_by_addr(addr);
                    if let Some(id) = peer {
                        directory.touch(id);
                    }
                    peer
                };
                match peer {
                    Some(peer) => events.send(TransportEvent::Message { peer, packet })?,
                    None => warn!("Dropping {} from unknown address {}", packet.kind(), addr),
                }
            }
        }
        Ok(())
    }

    /// Spawns the task that listens for datagrams and queues events.
    pub fn spawn_receiver(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        let socket = Arc::clone(&self.socket);
        let directory = Arc::clone(&self.directory);

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let packet = match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!("Failed to deserialize packet from {}: {}", addr, e);
                                continue;
                            }
                        };

                        if let Err(e) =
                            Self::handle_datagram(&socket, &directory, &events, packet, addr).await
                        {
                            error!("Failed to hand event to simulation: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that disconnects peers gone silent.
    pub fn spawn_timeout_checker(&self, events: mpsc::UnboundedSender<TransportEvent>) {
        let directory = Arc::clone(&self.directory);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = lock(&directory).check_timeouts(Duration::from_millis(PEER_TIMEOUT_MS));
                for peer in timed_out {
                    info!("Peer {} timed out", peer);
                    if let Err(e) = events.send(TransportEvent::PeerDisconnected { peer }) {
                        error!("Failed to send timeout event: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Spawns the task that keeps greeting configured addresses until they answer.
    pub fn spawn_hello_sender(&self, targets: Vec<SocketAddr>) {
        if targets.is_empty() {
            return;
        }
        let socket = Arc::clone(&self.socket);
        let directory = Arc::clone(&self.directory);

        tokio::spawn(async move {
            let hello = Packet::Hello {
                version: PROTOCOL_VERSION,
            };
            let mut interval = tokio::time::interval(Duration::from_millis(HELLO_RETRY_MS));

            loop {
                interval.tick().await;

                let pending: Vec<SocketAddr> = {
                    let directory = lock(&directory);
                    targets
                        .iter()
                        .copied()
                        .filter(|addr| !directory.is_connected(*addr))
                        .collect()
                };
                for addr in pending {
                    debug!("Greeting {}", addr);
                    Self::send_control(&socket, &hello, addr).await;
                }
            }
        });
    }

    /// Tells every connected peer we are leaving.
    pub async fn say_goodbye(&self) {
        let addrs = lock(&self.directory).addrs();
        for (_, addr) in addrs {
            Self::send_control(&self.socket, &Packet::Bye, addr).await;
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, peer: PeerId, packet: &Packet) -> Result<(), TransportError> {
        let addr = lock(&self.directory)
            .addr_of(peer)
            .ok_or(TransportError::PeerGone(peer))?;
        let data = serialize(packet)?;
        self.socket.try_send_to(&data, addr)?;
        Ok(())
    }
}

/// Logs a line for every data-flow notification from the scheduler.
struct DataFlowLog;

impl SendObserver for DataFlowLog {
    fn on_data_flow(&mut self, from: Vec3, to: Vec3) {
        trace!("Data flow {:?} -> {:?}", from, to);
    }
}

/// Runtime options for a peer node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub bind: String,
    pub peers: Vec<SocketAddr>,
    pub relayed_peers: Vec<SocketAddr>,
    pub tick_duration: Duration,
    pub wind: Vec3,
    pub sync: SyncConfig,
    pub tuning: BoatTuning,
    pub autopilot: bool,
}

/// A headless peer: local boat, remote boats and the UDP transport.
pub struct PeerNode {
    transport: UdpTransport,
    session: Session,
    hull: KinematicHull,
    options: NodeOptions,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl PeerNode {
    pub async fn new(options: NodeOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let transport = UdpTransport::bind(&options.bind, options.relayed_peers.clone()).await?;

        let spawn = {
            let mut rng = rand::thread_rng();
            Transform::from_translation(Vec3::new(
                rng.gen_range(-50.0..50.0),
                0.0,
                rng.gen_range(-50.0..50.0),
            ))
        };

        let mut session = Session::new(options.sync, options.tuning, spawn);
        session.set_send_observer(Box::new(DataFlowLog));
        let hull = KinematicHull::new(options.tuning.mass, spawn);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            transport,
            session,
            hull,
            options,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one simulation tick: drain the network, step physics, send.
    pub fn tick(&mut self, dt: f32) {
        self.session.drain_events(&mut self.events_rx);

        self.session
            .steer_local(dt, self.options.wind, &mut self.hull);
        self.hull.integrate(dt);
        self.session.sync_local(&self.hull);

        let report = self
            .session
            .send_updates(current_timestamp(), &mut self.transport);
        if report.failures > 0 {
            debug!("{} sends failed this tick", report.failures);
        }
    }

    /// Holds forward and flips between steering directions at random,
    /// writing the control flags from its own task.
    fn spawn_autopilot(&self) {
        let controls = self.session.controls();

        tokio::spawn(async move {
            controls.set(ControlAction::Forward, true);
            loop {
                let (left, right, hold) = {
                    let mut rng = rand::thread_rng();
                    (
                        rng.gen_bool(0.4),
                        rng.gen_bool(0.4),
                        rng.gen_range(500..3000),
                    )
                };
                controls.set(ControlAction::SteerLeft, left);
                controls.set(ControlAction::SteerRight, right);
                tokio::time::sleep(Duration::from_millis(hold)).await;
            }
        });
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.transport.spawn_receiver(self.events_tx.clone());
        self.transport.spawn_timeout_checker(self.events_tx.clone());

        let mut targets = self.options.peers.clone();
        targets.extend(self.options.relayed_peers.iter().copied());
        self.transport.spawn_hello_sender(targets);

        if self.options.autopilot {
            self.spawn_autopilot();
        }

        let mut tick_interval = interval(self.options.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        let mut ticks: u64 = 0;

        // Cap the step so a stalled loop does not launch the boat
        let max_delta_time = 1.0 / 20.0;

        info!("Peer started successfully");

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(max_delta_time);
                    last_tick = now;

                    self.tick(dt);
                    ticks += 1;

                    if ticks % 60 == 0 {
                        debug!(
                            "Tick {}: {} peers, speed {:.2} km/h",
                            ticks,
                            self.session.peer_count(),
                            speed_kmh(self.hull.linear_velocity())
                        );
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, leaving session");
                    break;
                }
            }
        }

        self.transport.say_goodbye().await;
        Ok(())
    }
}
