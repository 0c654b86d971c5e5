use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};

/// Identifier of an epoch; epochs are numbered from zero at genesis.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, Debug,
    DataSize,
)]
pub struct EpochId(u32);

impl EpochId {
    /// Returns a new `EpochId`.
    pub fn new(value: u32) -> EpochId {
        EpochId(value)
    }

    /// Returns the wrapped value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Returns `true` for the genesis epoch.
    pub fn is_genesis(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for the first post-genesis epoch, the earliest epoch
    /// that has an anchor block but no real predecessor anchor.
    pub fn is_first(self) -> bool {
        self.0 <= 1
    }

    /// Returns the successor epoch, or `None` on overflow.
    pub fn successor(self) -> Option<EpochId> {
        self.0.checked_add(1).map(EpochId)
    }

    /// Returns the predecessor epoch, or `None` at genesis.
    pub fn predecessor(self) -> Option<EpochId> {
        self.0.checked_sub(1).map(EpochId)
    }
}

impl From<u32> for EpochId {
    fn from(value: u32) -> EpochId {
        EpochId(value)
    }
}

impl Display for EpochId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

/// Identifier of a shard.  The metachain, which coordinates the user shards
/// and owns the anchor blocks, uses a reserved sentinel value.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, Debug,
    DataSize,
)]
pub struct ShardId(u32);

impl ShardId {
    /// The metachain's shard identifier.
    pub const METACHAIN: ShardId = ShardId(u32::MAX);

    /// Returns a new `ShardId`.
    pub fn new(value: u32) -> ShardId {
        ShardId(value)
    }

    /// Returns the wrapped value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the metachain.
    pub fn is_metachain(self) -> bool {
        self == Self::METACHAIN
    }
}

impl From<u32> for ShardId {
    fn from(value: u32) -> ShardId {
        ShardId(value)
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.is_metachain() {
            write!(f, "metachain")
        } else {
            write!(f, "shard {}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_boundaries() {
        assert!(EpochId::new(0).is_genesis());
        assert!(EpochId::new(0).is_first());
        assert!(EpochId::new(1).is_first());
        assert!(!EpochId::new(2).is_first());
        assert_eq!(EpochId::new(0).predecessor(), None);
        assert_eq!(EpochId::new(3).successor(), Some(EpochId::new(4)));
        assert_eq!(EpochId::new(u32::MAX).successor(), None);
    }

    #[test]
    fn metachain_display() {
        assert_eq!(ShardId::METACHAIN.to_string(), "metachain");
        assert_eq!(ShardId::new(2).to_string(), "shard 2");
    }
}
