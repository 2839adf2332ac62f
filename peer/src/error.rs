use crate::transport::PeerId;
use thiserror::Error;

/// Failures reported by a transport for a single outbound message.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is no longer connected")]
    PeerGone(PeerId),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
}

/// Failures while processing one inbound message.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("no boat registered for peer {0}")]
    UnknownPeer(PeerId),
    #[error("unexpected {kind} packet from peer {peer}")]
    UnexpectedPacket { peer: PeerId, kind: &'static str },
}

/// Rejected scheduler settings.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max distance must be positive and finite, got {0}")]
    InvalidMaxDistance(f32),
    #[error("{name} must be non-negative and finite, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },
}
