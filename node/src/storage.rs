//! The boundary to the persistent storage engine, plus the typed key layout
//! the bootstrap subsystem uses on top of it.
//!
//! The engine itself (and its pruning/eviction policy) is an external
//! collaborator; the subsystem only assumes linearizable single-key
//! `put`/`get`/`has` per logical unit and performs its own multi-key
//! sequencing on top.

mod layout;
mod mem;
mod record;

use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

use thiserror::Error;

use shardnet_hashing::Digest;
use shardnet_types::{
    AnchorBlock, DecodedPayload, EpochAssignment, EpochId, MiniBlock, MiniBlockHash, ShardHeader,
    ShardId, TrieNode, TrieSnapshot,
};

pub use mem::MemStore;
pub use record::{BootstrapRecord, LastHeaderInfo};

/// A logical unit of the key-value store, one per kind of artifact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Unit {
    /// Shard headers and anchor blocks keyed by content hash.
    Headers,
    /// Nonce-to-hash secondary index for headers.
    HeaderIndex,
    /// Mini-blocks keyed by content hash.
    MiniBlocks,
    /// Trie nodes keyed by content hash.
    TrieNodes,
    /// Validator assignments keyed by content-derived key.
    Assignments,
    /// Bootstrap records keyed by round.
    BootstrapRecords,
    /// Cross-epoch metadata; the only unit not namespaced per epoch.
    Meta,
}

impl Display for Unit {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match self {
            Unit::Headers => "headers",
            Unit::HeaderIndex => "header_index",
            Unit::MiniBlocks => "mini_blocks",
            Unit::TrieNodes => "trie_nodes",
            Unit::Assignments => "assignments",
            Unit::BootstrapRecords => "bootstrap_records",
            Unit::Meta => "meta",
        };
        write!(f, "{}", name)
    }
}

/// A storage engine failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The engine rejected or failed an operation.
    #[error("storage engine error in unit {unit}: {message}")]
    Engine {
        /// The unit the failed operation targeted.
        unit: Unit,
        /// Engine-provided detail.
        message: String,
    },
    /// A stored value could not be deserialized.
    #[error("corrupt value in unit {unit}: {source}")]
    CorruptValue {
        /// The unit the value was read from.
        unit: Unit,
        /// The deserialization failure.
        source: bincode::Error,
    },
}

/// The consumed key-value storage collaborator.
///
/// Single-key operations are assumed linearizable; nothing more is required.
pub trait KeyValueStore: Send + Sync {
    /// Stores a value under a key.
    fn put(&self, unit: Unit, key: &[u8], value: Vec<u8>) -> Result<(), StoreError>;

    /// Returns the value stored under a key, if any.
    fn get(&self, unit: Unit, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns `true` if a value is stored under the key.
    fn has(&self, unit: Unit, key: &[u8]) -> Result<bool, StoreError>;
}

/// Typed access to the bootstrap subsystem's persisted artifacts.
///
/// All keys except the [`Unit::Meta`] pointer are namespaced by epoch, so an
/// epoch rollover never mixes data across epochs and a failed attempt cannot
/// damage a previous epoch's records.
#[derive(Clone)]
pub struct BootstrapStore {
    store: Arc<dyn KeyValueStore>,
}

impl BootstrapStore {
    /// Creates a typed wrapper around a storage engine.
    pub fn new(store: Arc<dyn KeyValueStore>) -> BootstrapStore {
        BootstrapStore { store }
    }

    /// Stores a shard header by hash and indexes it by `(shard, nonce)`.
    pub fn put_header(&self, epoch: EpochId, header: &ShardHeader) -> Result<(), StoreError> {
        let hash = header.hash();
        let value = shardnet_types::serialize(&DecodedPayload::ShardHeader(header.clone()));
        self.store
            .put(Unit::Headers, &layout::hash_key(epoch, hash.inner()), value)?;
        self.store.put(
            Unit::HeaderIndex,
            &layout::nonce_key(epoch, header.shard, header.nonce),
            shardnet_types::serialize(&hash),
        )
    }

    /// Stores an anchor block by hash.
    pub fn put_anchor(&self, epoch: EpochId, anchor: &AnchorBlock) -> Result<(), StoreError> {
        let value = shardnet_types::serialize(&DecodedPayload::AnchorBlock(anchor.clone()));
        self.store.put(
            Unit::Headers,
            &layout::hash_key(epoch, anchor.hash().inner()),
            value,
        )
    }

    /// Returns `true` if a header or anchor is stored under the hash.
    pub fn has_header(&self, epoch: EpochId, hash: &Digest) -> Result<bool, StoreError> {
        self.store.has(Unit::Headers, &layout::hash_key(epoch, hash))
    }

    /// Looks a header hash up through the nonce index.
    pub fn header_hash_by_nonce(
        &self,
        epoch: EpochId,
        shard: ShardId,
        nonce: u64,
    ) -> Result<Option<shardnet_types::BlockHash>, StoreError> {
        let key = layout::nonce_key(epoch, shard, nonce);
        match self.store.get(Unit::HeaderIndex, &key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|source| StoreError::CorruptValue {
                    unit: Unit::HeaderIndex,
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Stores a mini-block by hash.
    pub fn put_mini_block(&self, epoch: EpochId, mini_block: &MiniBlock) -> Result<(), StoreError> {
        let value = shardnet_types::serialize(&DecodedPayload::MiniBlock(mini_block.clone()));
        self.store.put(
            Unit::MiniBlocks,
            &layout::hash_key(epoch, mini_block.hash().inner()),
            value,
        )
    }

    /// Returns the mini-block stored under a hash, if any.
    pub fn get_mini_block(
        &self,
        epoch: EpochId,
        hash: &MiniBlockHash,
    ) -> Result<Option<MiniBlock>, StoreError> {
        let key = layout::hash_key(epoch, hash.inner());
        let bytes = match self.store.get(Unit::MiniBlocks, &key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match bincode::deserialize(&bytes) {
            Ok(DecodedPayload::MiniBlock(mini_block)) => Ok(Some(mini_block)),
            Ok(_) => Err(StoreError::Engine {
                unit: Unit::MiniBlocks,
                message: "stored value is not a mini-block".to_string(),
            }),
            Err(source) => Err(StoreError::CorruptValue {
                unit: Unit::MiniBlocks,
                source,
            }),
        }
    }

    /// Commits every node of a trie snapshot into the trie unit.
    pub fn put_trie_snapshot(
        &self,
        epoch: EpochId,
        snapshot: &TrieSnapshot,
    ) -> Result<(), StoreError> {
        for (hash, node) in snapshot.iter() {
            self.put_trie_node(epoch, hash, node)?;
        }
        Ok(())
    }

    /// Stores a single trie node by hash.
    pub fn put_trie_node(
        &self,
        epoch: EpochId,
        hash: &Digest,
        node: &TrieNode,
    ) -> Result<(), StoreError> {
        self.store.put(
            Unit::TrieNodes,
            &layout::hash_key(epoch, hash),
            shardnet_types::serialize(node),
        )
    }

    /// Stores a validator assignment under its content-derived key and
    /// returns that key.
    pub fn put_assignment(&self, assignment: &EpochAssignment) -> Result<Digest, StoreError> {
        let key = assignment.storage_key();
        self.store.put(
            Unit::Assignments,
            &layout::hash_key(assignment.epoch, &key),
            shardnet_types::serialize(assignment),
        )?;
        Ok(key)
    }

    /// Returns the assignment stored under a content-derived key.
    pub fn get_assignment(
        &self,
        epoch: EpochId,
        key: &Digest,
    ) -> Result<Option<EpochAssignment>, StoreError> {
        match self
            .store
            .get(Unit::Assignments, &layout::hash_key(epoch, key))?
        {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|source| StoreError::CorruptValue {
                    unit: Unit::Assignments,
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Stores a bootstrap record keyed by its round.
    pub fn put_record(&self, record: &BootstrapRecord) -> Result<(), StoreError> {
        self.store.put(
            Unit::BootstrapRecords,
            &layout::round_key(record.epoch, record.round),
            shardnet_types::serialize(record),
        )
    }

    /// Returns the bootstrap record stored for `(epoch, round)`.
    pub fn get_record(
        &self,
        epoch: EpochId,
        round: u64,
    ) -> Result<Option<BootstrapRecord>, StoreError> {
        match self
            .store
            .get(Unit::BootstrapRecords, &layout::round_key(epoch, round))?
        {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|source| StoreError::CorruptValue {
                    unit: Unit::BootstrapRecords,
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Points the cross-epoch highest-round pointer at `(epoch, round)`.
    ///
    /// This is the last write of a hand-off; until it lands, the new record
    /// is not addressable and a restart resumes from the previous pointer.
    pub fn set_highest_round(&self, epoch: EpochId, round: u64) -> Result<(), StoreError> {
        self.store.put(
            Unit::Meta,
            layout::HIGHEST_ROUND_KEY,
            shardnet_types::serialize(&(epoch, round)),
        )
    }

    /// Returns the `(epoch, round)` of the most recent completed hand-off.
    pub fn highest_round(&self) -> Result<Option<(EpochId, u64)>, StoreError> {
        match self.store.get(Unit::Meta, layout::HIGHEST_ROUND_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|source| StoreError::CorruptValue {
                    unit: Unit::Meta,
                    source,
                }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shardnet_hashing::Digest;
    use shardnet_types::{EpochId, MiniBlock, ShardHeader, ShardId};

    use super::{BootstrapStore, MemStore};

    fn store() -> BootstrapStore {
        BootstrapStore::new(Arc::new(MemStore::new()))
    }

    fn header(shard: u32, nonce: u64) -> ShardHeader {
        ShardHeader {
            shard: ShardId::new(shard),
            nonce,
            round: nonce * 2,
            epoch: EpochId::new(3),
            prev_hash: Default::default(),
            state_root: Digest::hash(b"root"),
        }
    }

    #[test]
    fn header_round_trip_with_nonce_index() {
        let store = store();
        let epoch = EpochId::new(3);
        let header = header(1, 42);
        store.put_header(epoch, &header).unwrap();

        assert!(store.has_header(epoch, header.hash().inner()).unwrap());
        let indexed = store
            .header_hash_by_nonce(epoch, ShardId::new(1), 42)
            .unwrap();
        assert_eq!(indexed, Some(header.hash()));
        // Same nonce, different epoch namespace.
        assert_eq!(
            store
                .header_hash_by_nonce(EpochId::new(4), ShardId::new(1), 42)
                .unwrap(),
            None
        );
    }

    #[test]
    fn mini_block_round_trip() {
        let store = store();
        let epoch = EpochId::new(3);
        let mini_block = MiniBlock {
            sender_shard: ShardId::new(0),
            receiver_shard: ShardId::new(1),
            tx_hashes: vec![Digest::hash(b"tx")],
        };
        store.put_mini_block(epoch, &mini_block).unwrap();
        assert_eq!(
            store.get_mini_block(epoch, &mini_block.hash()).unwrap(),
            Some(mini_block.clone())
        );
        assert_eq!(
            store
                .get_mini_block(EpochId::new(9), &mini_block.hash())
                .unwrap(),
            None
        );
    }

    #[test]
    fn highest_round_pointer() {
        let store = store();
        assert_eq!(store.highest_round().unwrap(), None);
        store.set_highest_round(EpochId::new(2), 199).unwrap();
        store.set_highest_round(EpochId::new(3), 300).unwrap();
        assert_eq!(
            store.highest_round().unwrap(),
            Some((EpochId::new(3), 300))
        );
    }
}
