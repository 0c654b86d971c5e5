use std::{
    collections::BTreeMap,
    fmt::{self, Debug, Display, Formatter},
};

use datasize::DataSize;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

use shardnet_hashing::Digest;

use crate::{content_digest, EpochId, ShardId, TimeDiff, Timestamp};

/// A validator's public key.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, DataSize)]
pub struct ValidatorKey([u8; ValidatorKey::LENGTH]);

impl ValidatorKey {
    /// The number of bytes in a validator key.
    pub const LENGTH: usize = 32;

    /// Returns a new `ValidatorKey`.
    pub fn new(bytes: [u8; ValidatorKey::LENGTH]) -> ValidatorKey {
        ValidatorKey(bytes)
    }

    /// Returns the raw key bytes.
    pub fn inner(&self) -> &[u8; ValidatorKey::LENGTH] {
        &self.0
    }
}

impl Display for ValidatorKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let hex_string = base16::encode_lower(&self.0);
        write!(f, "key {}..", &hex_string[..8])
    }
}

impl Debug for ValidatorKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "ValidatorKey({})", base16::encode_lower(&self.0))
    }
}

impl Serialize for ValidatorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            base16::encode_lower(&self.0).serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ValidatorKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let hex_string = String::deserialize(deserializer)?;
            let bytes = base16::decode(hex_string.as_bytes()).map_err(SerdeError::custom)?;
            if bytes.len() != ValidatorKey::LENGTH {
                return Err(SerdeError::custom("wrong validator key length"));
            }
            let mut array = [0_u8; ValidatorKey::LENGTH];
            array.copy_from_slice(bytes.as_slice());
            Ok(ValidatorKey(array))
        } else {
            let bytes = <[u8; ValidatorKey::LENGTH]>::deserialize(deserializer)?;
            Ok(ValidatorKey(bytes))
        }
    }
}

/// The validator-to-shard assignment for one epoch: per shard, the eligible
/// (block-producing) set and the waiting (queued-to-join) set.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct EpochAssignment {
    /// The epoch the assignment is valid for.
    pub epoch: EpochId,
    /// Eligible validators per shard.
    pub eligible: BTreeMap<ShardId, Vec<ValidatorKey>>,
    /// Waiting validators per shard.
    pub waiting: BTreeMap<ShardId, Vec<ValidatorKey>>,
}

impl EpochAssignment {
    /// Returns the shard a key is assigned to, searching the eligible sets
    /// first and the waiting sets second, or `None` if the key was shuffled
    /// out of the epoch entirely.
    pub fn shard_of(&self, key: &ValidatorKey) -> Option<ShardId> {
        for sets in [&self.eligible, &self.waiting] {
            for (shard, keys) in sets {
                if keys.contains(key) {
                    return Some(*shard);
                }
            }
        }
        None
    }

    /// Returns the number of user shards (the metachain not counted).
    pub fn num_shards(&self) -> u32 {
        self.eligible
            .keys()
            .filter(|shard| !shard.is_metachain())
            .count() as u32
    }

    /// Returns the content-derived key the assignment is stored under.
    pub fn storage_key(&self) -> Digest {
        content_digest(self)
    }
}

impl Display for EpochAssignment {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "assignment for {}, {} shards",
            self.epoch,
            self.num_shards()
        )
    }
}

/// The chain's genesis configuration, as far as the bootstrap subsystem needs
/// it: chain timing and the initial validator sets.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct GenesisConfig {
    /// The configured chain start time.
    pub start_time: Timestamp,
    /// Duration of a single round.
    pub round_duration: TimeDiff,
    /// Number of rounds per epoch.
    pub rounds_per_epoch: u64,
    /// Number of user shards.
    pub num_shards: u32,
    /// Initial eligible validators per shard (metachain included).
    pub validators: BTreeMap<ShardId, Vec<ValidatorKey>>,
}

impl GenesisConfig {
    /// Returns the current round, or `None` if the configured start time is
    /// still in the future.
    pub fn current_round(&self, now: Timestamp) -> Option<u64> {
        if now < self.start_time || self.round_duration.millis() == 0 {
            return None;
        }
        let elapsed = now.saturating_diff(self.start_time);
        Some(elapsed.millis() / self.round_duration.millis())
    }

    /// Returns the genesis validator assignment: the configured validators
    /// are all eligible, nobody is waiting.
    pub fn initial_assignment(&self) -> EpochAssignment {
        EpochAssignment {
            epoch: EpochId::new(0),
            eligible: self.validators.clone(),
            waiting: BTreeMap::new(),
        }
    }
}
