//! The seam between the replication core and whatever carries its packets.
//!
//! The core never blocks on the network: outbound packets go through
//! [`Transport::send`] (fire-and-forget, failure reported per peer), and inbound
//! traffic arrives as [`TransportEvent`]s queued by the transport's own task and
//! drained on the simulation thread.

use crate::error::TransportError;
use shared::Packet;

/// Identity of a remote connection, assigned by the transport.
pub type PeerId = u32;

/// Route a peer's traffic takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkQuality {
    /// Direct peer-to-peer path.
    Direct,
    /// Traffic is forwarded through a relay server (TURN or similar).
    Relayed,
}

/// Events handed from the transport to the simulation thread.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PeerConnected { peer: PeerId, link: LinkQuality },
    PeerDisconnected { peer: PeerId },
    Message { peer: PeerId, packet: Packet },
}

pub trait Transport {
    /// Sends one packet to one peer without blocking.
    fn send(&mut self, peer: PeerId, packet: &Packet) -> Result<(), TransportError>;
}
