//! Rejection of out-of-order and duplicate snapshots.

/// Remembers the newest applied timestamp of one snapshot stream.
///
/// A fresh filter has seen nothing, so the first snapshot is always admitted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StalenessFilter {
    last_applied: Option<u64>,
}

impl StalenessFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `timestamp` only if it is strictly newer than the last admitted one,
    /// recording it as the new high-water mark.
    pub fn admit(&mut self, timestamp: u64) -> bool {
        match self.last_applied {
            Some(last) if timestamp <= last => false,
            _ => {
                self.last_applied = Some(timestamp);
                true
            }
        }
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }
}

/// Independent filters for the two snapshot streams of one entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotFilters {
    pub transform: StalenessFilter,
    pub animation: StalenessFilter,
}
