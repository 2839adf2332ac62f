use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 100;

/// Send interval for the closest peers (25 Hz).
pub const NETSYNC_MAX_RATE_MS: f64 = 1000.0 / 25.0;
/// Send interval for peers at or beyond `NETSYNC_MAX_DISTANCE` (5 Hz).
pub const NETSYNC_MIN_RATE_MS: f64 = 1000.0 / 5.0;
/// Fixed send interval for peers reached through a relay.
pub const NETSYNC_RELAYED_RATE_MS: f64 = 1000.0;
pub const NETSYNC_MAX_DISTANCE: f32 = 2000.0;

pub const DATA_FLOW_EVERY_N_SENDS: u32 = 3;
pub const PEER_TIMEOUT_MS: u64 = 5000;
pub const HELLO_RETRY_MS: u64 = 1000;

/// Application-level messages exchanged between peers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Hello { version: u32 },
    Welcome { version: u32 },
    Transform(TransformSnapshot),
    Animation(AnimationSnapshot),
    Bye,
}

impl Packet {
    /// Session control must arrive; state snapshots are superseded by the next send.
    pub fn is_reliable(&self) -> bool {
        match self {
            Packet::Hello { .. } | Packet::Welcome { .. } | Packet::Bye => true,
            Packet::Transform(_) | Packet::Animation(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Hello { .. } => "hello",
            Packet::Welcome { .. } => "welcome",
            Packet::Transform(_) => "transform",
            Packet::Animation(_) => "animation",
            Packet::Bye => "bye",
        }
    }
}

/// World-space placement of an entity.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    pub fn distance(&self, other: &Transform) -> f32 {
        self.translation.distance(other.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct TransformSnapshot {
    pub transform: Transform,
    pub timestamp: u64,
}

impl TransformSnapshot {
    pub fn capture(transform: &Transform, timestamp: u64) -> Self {
        Self {
            transform: *transform,
            timestamp,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct AnimationSnapshot {
    pub flag_factor: f32,
    pub sail_factor: f32,
    pub wind_factor: f32,
    pub timestamp: u64,
}

impl AnimationSnapshot {
    pub fn new(flag_factor: f32, sail_factor: f32, wind_factor: f32, timestamp: u64) -> Self {
        Self {
            flag_factor,
            sail_factor,
            wind_factor,
            timestamp,
        }
    }
}

/// Milliseconds since the unix epoch on the sender's clock.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
