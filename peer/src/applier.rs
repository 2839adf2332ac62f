//! Applies accepted snapshots to remote boats.
//!
//! Each function runs the boat's staleness filter for the snapshot kind first,
//! so callers never see state move backwards in time.

use crate::entity::Boat;
use log::trace;
use shared::{AnimationSnapshot, TransformSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Not strictly newer than the last applied snapshot of the same kind.
    Stale,
}

pub fn apply_transform(boat: &mut Boat, snapshot: &TransformSnapshot) -> ApplyOutcome {
    debug_assert!(boat.is_remote(), "local boats are never driven by the network");

    if !boat.filters.transform.admit(snapshot.timestamp) {
        trace!(
            "Dropping stale transform {} (last applied {:?})",
            snapshot.timestamp,
            boat.last_applied_transform()
        );
        return ApplyOutcome::Stale;
    }

    boat.set_world_transform(&snapshot.transform);
    ApplyOutcome::Applied
}

/// Sets the blend factors directly; smoothing belongs to the animation clips.
pub fn apply_animation(boat: &mut Boat, snapshot: &AnimationSnapshot) -> ApplyOutcome {
    debug_assert!(boat.is_remote(), "local boats are never driven by the network");

    if !boat.filters.animation.admit(snapshot.timestamp) {
        trace!(
            "Dropping stale animation {} (last applied {:?})",
            snapshot.timestamp,
            boat.last_applied_animation()
        );
        return ApplyOutcome::Stale;
    }

    boat.animation.set_flag(snapshot.flag_factor);
    boat.animation.set_sail(snapshot.sail_factor, snapshot.wind_factor);
    ApplyOutcome::Applied
}
