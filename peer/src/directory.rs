//! Address book of connected peers for the UDP transport
//!
//! This module maps socket addresses to transport-assigned peer ids and
//! tracks liveness:
//! - Peer registration on handshake and removal on goodbye or timeout
//! - Link classification (direct or relayed) per address
//! - Last-seen tracking for silent-peer detection
//!
//! The directory is shared between the receive task and the simulation
//! thread, so every operation is short and never awaits.

use crate::transport::{LinkQuality, PeerId};
use log::info;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A peer known to the transport
#[derive(Debug)]
pub struct KnownPeer {
    /// Identifier handed to the replication session
    pub id: PeerId,
    /// Where datagrams for this peer are sent
    pub addr: SocketAddr,
    pub link: LinkQuality,
    /// Last time any datagram arrived from this peer
    pub last_seen: Instant,
}

impl KnownPeer {
    /// Creates an entry last seen now.
    pub fn new(id: PeerId, addr: SocketAddr, link: LinkQuality) -> Self {
        Self {
            id,
            addr,
            link,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing has arrived from this peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of connected peers indexed by id
pub struct PeerDirectory {
    peers: HashMap<PeerId, KnownPeer>,
    next_peer_id: PeerId,
    /// Addresses reached through a relay server
    relayed: HashSet<SocketAddr>,
}

impl PeerDirectory {
    /// Creates an empty directory; traffic to any address in `relayed`
    /// is classified as going through a relay.
    pub fn new(relayed: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            relayed: relayed.into_iter().collect(),
        }
    }

    /// Classifies `addr` as relayed if it was configured as such,
    /// direct otherwise.
    pub fn link_for(&self, addr: SocketAddr) -> LinkQuality {
        if self.relayed.contains(&addr) {
            LinkQuality::Relayed
        } else {
            LinkQuality::Direct
        }
    }

    /// Registers `addr` if it is new.
    ///
    /// Returns the peer's id and link, plus whether it was newly added. A
    /// known address just refreshes its last-seen time.
    pub fn register(&mut self, addr: SocketAddr) -> (PeerId, LinkQuality, bool) {
        if let Some(id) = self.find_by_addr(addr) {
            self.touch(id);
            let link = self.peers[&id].link;
            return (id, link, false);
        }

        let id = self.next_peer_id;
        self.next_peer_id += 1;

        let link = self.link_for(addr);
        info!("Peer {} registered at {} ({:?})", id, addr, link);
        self.peers.insert(id, KnownPeer::new(id, addr, link));

        (id, link, true)
    }

    /// Removes a peer. Returns false if it was already gone.
    pub fn remove(&mut self, id: PeerId) -> bool {
        self.peers.remove(&id).is_some()
    }

    /// Looks up the peer registered at `addr`.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.peers
            .iter()
            .find(|(_, peer)| peer.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Returns where datagrams for `id` should go, or None once the peer
    /// is gone.
    pub fn addr_of(&self, id: PeerId) -> Option<SocketAddr> {
        self.peers.get(&id).map(|peer| peer.addr)
    }

    /// Marks `id` as alive now. Unknown ids are ignored.
    pub fn touch(&mut self, id: PeerId) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_seen = Instant::now();
        }
    }

    /// Removes and returns every peer silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PeerId> {
        let timed_out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.remove(*id);
        }

        timed_out
    }

    /// True if a peer is registered at `addr`.
    pub fn is_connected(&self, addr: SocketAddr) -> bool {
        self.find_by_addr(addr).is_some()
    }

    /// Snapshot of every registered peer and its address.
    pub fn addrs(&self) -> Vec<(PeerId, SocketAddr)> {
        self.peers.iter().map(|(id, peer)| (*id, peer.addr)).collect()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
