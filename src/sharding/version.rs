use std::fmt;

use serde::{Deserialize, Serialize};

/// The version tag of a collection's partition assignment.
///
/// The `epoch` identifies one partitioning of the collection; it changes
/// when the collection is dropped and re-partitioned. The `sequence`
/// advances every time a partition boundary moves within an epoch. A
/// request routed with an old view of the map carries a version that is
/// no longer write-compatible with the locally cached one, which the
/// batch engine reports as a stale-version error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionVersion {
    pub epoch: u64,
    pub sequence: u64,
}

impl PartitionVersion {
    /// Sentinel a router sends to opt out of version checking.
    pub const IGNORED: PartitionVersion = PartitionVersion {
        epoch: u64::MAX,
        sequence: u64::MAX,
    };

    /// The version of a collection with no partition assignment.
    pub const UNPARTITIONED: PartitionVersion = PartitionVersion {
        epoch: 0,
        sequence: 0,
    };

    pub const fn new(epoch: u64, sequence: u64) -> Self {
        Self { epoch, sequence }
    }

    pub fn is_ignored(&self) -> bool {
        *self == Self::IGNORED
    }

    /// Whether a write routed with this version can safely proceed
    /// against a collection whose local version is `other`: the epochs
    /// must agree and this version must not be older in sequence.
    pub fn is_write_compatible_with(&self, other: &PartitionVersion) -> bool {
        self.epoch == other.epoch && self.sequence >= other.sequence
    }
}

impl fmt::Display for PartitionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.epoch, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_epoch_newer_sequence_is_compatible() {
        let local = PartitionVersion::new(7, 3);
        assert!(PartitionVersion::new(7, 3).is_write_compatible_with(&local));
        assert!(PartitionVersion::new(7, 5).is_write_compatible_with(&local));
    }

    #[test]
    fn older_sequence_is_stale() {
        let local = PartitionVersion::new(7, 3);
        assert!(!PartitionVersion::new(7, 2).is_write_compatible_with(&local));
    }

    #[test]
    fn epoch_change_is_stale_in_both_directions() {
        let local = PartitionVersion::new(7, 3);
        assert!(!PartitionVersion::new(8, 3).is_write_compatible_with(&local));
        assert!(!PartitionVersion::new(6, 9).is_write_compatible_with(&local));
    }

    #[test]
    fn ignored_sentinel() {
        assert!(PartitionVersion::IGNORED.is_ignored());
        assert!(!PartitionVersion::UNPARTITIONED.is_ignored());
    }
}
