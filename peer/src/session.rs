//! Replication session: the local boat, one remote boat per connected peer,
//! and the glue between transport events, physics and the send scheduler.
//!
//! Everything in here runs on the simulation thread. Transport events are
//! queued by the transport's own task and drained at the start of a tick, so
//! the staleness filter and applier never race with local physics.

use crate::applier::{apply_animation, apply_transform, ApplyOutcome};
use crate::entity::Boat;
use crate::error::ReplicationError;
use crate::physics::{BoatControls, BoatTuning, RigidBody, SailDrive};
use crate::scheduler::{PeerRecord, SendObserver, SendScheduler, SyncConfig, TickReport};
use crate::transport::{LinkQuality, PeerId, Transport, TransportEvent};
use glam::Vec3;
use log::{info, warn};
use shared::{Packet, Transform};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A connected peer and the boat it drives.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    pub record: PeerRecord,
    pub boat: Boat,
}

pub struct Session {
    local: Boat,
    drive: SailDrive,
    controls: Arc<BoatControls>,
    peers: HashMap<PeerId, RemotePeer>,
    scheduler: SendScheduler,
    remote_frame: Transform,
}

impl Session {
    /// Creates a session with the local boat at `spawn` and no peers.
    ///
    /// Remote boats are parented under the identity frame until
    /// [`Session::set_remote_frame`] moves it.
    pub fn new(config: SyncConfig, tuning: BoatTuning, spawn: Transform) -> Self {
        Self {
            local: Boat::local(spawn),
            drive: SailDrive::new(tuning),
            controls: Arc::new(BoatControls::new()),
            peers: HashMap::new(),
            scheduler: SendScheduler::new(config),
            remote_frame: Transform::IDENTITY,
        }
    }

    /// Handle for the input side to set control flags from any thread.
    pub fn controls(&self) -> Arc<BoatControls> {
        Arc::clone(&self.controls)
    }

    /// Installs the presentation hook for throttled data-flow notifications.
    pub fn set_send_observer(&mut self, observer: Box<dyn SendObserver>) {
        self.scheduler.set_observer(observer);
    }

    /// The boat driven by local input.
    pub fn local_boat(&self) -> &Boat {
        &self.local
    }

    /// Sail state of the local boat: sensitivity, wind alignment and thrust.
    pub fn drive(&self) -> &SailDrive {
        &self.drive
    }

    /// The boat mirrored for `peer`, if it is connected.
    pub fn remote_boat(&self, peer: PeerId) -> Option<&Boat> {
        self.peers.get(&peer).map(|remote| &remote.boat)
    }

    /// Scheduling state for `peer`, if it is connected.
    pub fn peer_record(&self, peer: PeerId) -> Option<&PeerRecord> {
        self.peers.get(&peer).map(|remote| &remote.record)
    }

    /// Number of connected peers, each with one remote boat.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Moves the frame remote boats are parented under.
    pub fn set_remote_frame(&mut self, frame: Transform) {
        self.remote_frame = frame;
        for remote in self.peers.values_mut() {
            remote.boat.set_parent(frame);
        }
    }

    /// Creates a remote boat and a fresh send record for `peer`.
    ///
    /// A peer that is already known keeps its boat and send history; only
    /// its link quality is updated.
    pub fn on_peer_connected(&mut self, peer: PeerId, link: LinkQuality) {
        if let Some(existing) = self.peers.get_mut(&peer) {
            info!("Peer {} reconnected over {:?} link", peer, link);
            existing.record.link = link;
            return;
        }

        info!("Peer {} connected over {:?} link", peer, link);
        self.peers.insert(
            peer,
            RemotePeer {
                record: PeerRecord::new(link),
                boat: Boat::remote(peer, self.remote_frame),
            },
        );
    }

    /// Drops the peer's boat and scheduling state. Returns false if unknown.
    pub fn on_peer_disconnected(&mut self, peer: PeerId) -> bool {
        if self.peers.remove(&peer).is_some() {
            info!("Peer {} disconnected", peer);
            true
        } else {
            false
        }
    }

    /// Filters and applies one inbound packet to the sender's boat.
    pub fn handle_message(
        &mut self,
        peer: PeerId,
        packet: &Packet,
    ) -> Result<ApplyOutcome, ReplicationError> {
        let remote = self
            .peers
            .get_mut(&peer)
            .ok_or(ReplicationError::UnknownPeer(peer))?;

        match packet {
            Packet::Transform(snapshot) => Ok(apply_transform(&mut remote.boat, snapshot)),
            Packet::Animation(snapshot) => Ok(apply_animation(&mut remote.boat, snapshot)),
            other => Err(ReplicationError::UnexpectedPacket {
                peer,
                kind: other.kind(),
            }),
        }
    }

    /// Handles one transport event; message failures are logged and dropped.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerConnected { peer, link } => self.on_peer_connected(peer, link),
            TransportEvent::PeerDisconnected { peer } => {
                self.on_peer_disconnected(peer);
            }
            TransportEvent::Message { peer, packet } => {
                if let Err(e) = self.handle_message(peer, &packet) {
                    warn!("Error processing message from peer {}: {}", peer, e);
                }
            }
        }
    }

    /// Drains every queued transport event. Returns how many were handled.
    pub fn drain_events(&mut self, events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Runs the input bridge for one step: updates sail state and animation
    /// from the held controls, then applies forces to the local body.
    pub fn steer_local(&mut self, tpf: f32, wind: Vec3, body: &mut impl RigidBody) {
        let rotation = body.transform().rotation;
        self.drive
            .update(tpf, &self.controls, wind, rotation, &mut self.local.animation);
        self.drive.pre_physics_tick(&self.controls, body);
    }

    /// Copies the integrated body placement onto the local boat.
    pub fn sync_local(&mut self, body: &impl RigidBody) {
        self.local.set_world_transform(&body.transform());
    }

    /// Sends the local boat's state to every peer due at `now` (ms).
    ///
    /// Per-peer failures are logged and counted in the report; they never
    /// stop the pass.
    pub fn send_updates(&mut self, now: u64, transport: &mut dyn Transport) -> TickReport {
        self.scheduler
            .tick(now, &self.local, &mut self.peers, transport)
    }
}
