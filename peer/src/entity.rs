//! Boats and their animation blend state

use crate::staleness::SnapshotFilters;
use crate::transport::PeerId;
use shared::{AnimationSnapshot, Transform};

/// Sail fold values above this snap to fully folded.
const SAIL_FOLD_SNAP: f32 = 0.9;

/// Who drives a boat's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Driven by local input and physics.
    Local,
    /// Driven by snapshots received from a peer.
    Remote(PeerId),
}

/// Which sail clip the blend factors currently drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SailMode {
    #[default]
    SailScale,
    StrongWind,
}

/// Blend factors consumed by the boat's animation clips.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoatAnimation {
    flag_factor: f32,
    sail_factor: f32,
    wind_factor: f32,
    sail_mode: SailMode,
}

impl BoatAnimation {
    pub fn set_flag(&mut self, rotation: f32) {
        self.flag_factor = rotation;
    }

    /// Sets sail fold and wind force. A fully unfolded sail (`fold == 0`)
    /// switches to the strong-wind clip driven by `force`.
    pub fn set_sail(&mut self, fold: f32, force: f32) {
        let fold = if fold > SAIL_FOLD_SNAP { 1.0 } else { fold };
        self.sail_mode = if fold == 0.0 {
            SailMode::StrongWind
        } else {
            SailMode::SailScale
        };
        self.sail_factor = fold;
        self.wind_factor = force;
    }

    pub fn flag_factor(&self) -> f32 {
        self.flag_factor
    }

    pub fn sail_factor(&self) -> f32 {
        self.sail_factor
    }

    pub fn wind_factor(&self) -> f32 {
        self.wind_factor
    }

    pub fn sail_mode(&self) -> SailMode {
        self.sail_mode
    }

    pub fn snapshot(&self, timestamp: u64) -> AnimationSnapshot {
        AnimationSnapshot::new(
            self.flag_factor,
            self.sail_factor,
            self.wind_factor,
            timestamp,
        )
    }
}

/// One replicated boat.
///
/// Placement is stored relative to a parent frame so remote boats can hang
/// under a moving root distinct from the sender's frame. The staleness filters
/// only ever advance for remote boats.
#[derive(Debug, Clone)]
pub struct Boat {
    owner: Owner,
    parent: Transform,
    local: Transform,
    pub animation: BoatAnimation,
    pub(crate) filters: SnapshotFilters,
}

impl Boat {
    pub fn local(spawn: Transform) -> Self {
        Self {
            owner: Owner::Local,
            parent: Transform::IDENTITY,
            local: spawn,
            animation: BoatAnimation::default(),
            filters: SnapshotFilters::default(),
        }
    }

    pub fn remote(peer: PeerId, parent: Transform) -> Self {
        Self {
            owner: Owner::Remote(peer),
            parent,
            local: Transform::IDENTITY,
            animation: BoatAnimation::default(),
            filters: SnapshotFilters::default(),
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.owner, Owner::Remote(_))
    }

    pub fn parent(&self) -> Transform {
        self.parent
    }

    /// Moves the parent frame; the parent-local placement is kept.
    pub fn set_parent(&mut self, parent: Transform) {
        self.parent = parent;
    }

    pub fn local_transform(&self) -> Transform {
        self.local
    }

    /// Places the boat from a world-space transform: translation relative to
    /// the parent's world position, rotation composed with the parent's.
    pub fn set_world_transform(&mut self, world: &Transform) {
        self.local.translation = world.translation - self.parent.translation;
        self.local.rotation = world.rotation * self.parent.rotation;
    }

    /// Inverse of [`Boat::set_world_transform`].
    pub fn world_transform(&self) -> Transform {
        Transform::new(
            self.parent.translation + self.local.translation,
            self.local.rotation * self.parent.rotation.inverse(),
        )
    }

    pub fn last_applied_transform(&self) -> Option<u64> {
        self.filters.transform.last_applied()
    }

    pub fn last_applied_animation(&self) -> Option<u64> {
        self.filters.animation.last_applied()
    }
}
