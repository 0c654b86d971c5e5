use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use shardnet_hashing::Digest;

use crate::{content_digest, EpochId, MiniBlockHash, MiniBlockHeader, ShardId};

/// The content hash of a block-like object (shard header or anchor block).
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, Debug,
    DataSize,
)]
pub struct BlockHash(Digest);

impl BlockHash {
    /// Returns a new `BlockHash`.
    pub fn new(digest: Digest) -> BlockHash {
        BlockHash(digest)
    }

    /// Returns the wrapped digest.
    pub fn inner(&self) -> &Digest {
        &self.0
    }

    /// Returns `true` for the all-zeros hash used by synthesized placeholder
    /// blocks.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Display for BlockHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "block hash {}", self.0)
    }
}

impl From<Digest> for BlockHash {
    fn from(digest: Digest) -> BlockHash {
        BlockHash(digest)
    }
}

/// A regular block header produced by a single shard.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct ShardHeader {
    /// The shard that produced the block.
    pub shard: ShardId,
    /// Position of the block in the shard's chain.
    pub nonce: u64,
    /// The network-wide round the block was produced in.
    pub round: u64,
    /// The epoch the block belongs to.
    pub epoch: EpochId,
    /// Hash of the preceding block in the same shard.
    pub prev_hash: BlockHash,
    /// Root hash of the shard's account-state trie after applying the block.
    pub state_root: Digest,
}

impl ShardHeader {
    /// Returns the content hash of the header.
    pub fn hash(&self) -> BlockHash {
        BlockHash(content_digest(self))
    }
}

impl Display for ShardHeader {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "header {} of {}, nonce {}, {}",
            self.hash(),
            self.shard,
            self.nonce,
            self.epoch
        )
    }
}

/// Per-shard finalization data carried by an anchor block: the last finalized
/// header of the shard at the epoch boundary and the cross-shard mini-blocks
/// still in flight at that point.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct ShardAnchorEntry {
    /// The shard this entry describes.
    pub shard: ShardId,
    /// Hash of the shard's last finalized header.
    pub header_hash: BlockHash,
    /// Nonce of that header.
    pub nonce: u64,
    /// Round that header was produced in.
    pub round: u64,
    /// State-trie root hash of the shard at that header.
    pub state_root: Digest,
    /// Mini-blocks created but not yet fully cross-notarized.
    pub pending_mini_blocks: Vec<MiniBlockHeader>,
}

/// The network-wide block marking the start of an epoch.
///
/// Broadcast by metachain validators; immutable once confirmed and identified
/// by its content hash.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct AnchorBlock {
    /// The epoch this anchor starts.
    pub epoch: EpochId,
    /// The round the anchor was produced in.
    pub round: u64,
    /// Hash of the previous epoch's anchor block.
    pub prev_anchor_hash: BlockHash,
    /// Root hash of the global validator-statistics trie.
    pub validator_stats_root: Digest,
    /// One entry per shard, sorted by shard identifier.
    pub shard_entries: Vec<ShardAnchorEntry>,
}

impl AnchorBlock {
    /// Returns the content hash of the anchor block.
    pub fn hash(&self) -> BlockHash {
        BlockHash(content_digest(self))
    }

    /// Synthesizes the empty predecessor used when the target epoch is the
    /// very first one and no real previous anchor exists.
    pub fn placeholder(epoch: EpochId) -> AnchorBlock {
        AnchorBlock {
            epoch,
            round: 0,
            prev_anchor_hash: BlockHash::default(),
            validator_stats_root: Digest::default(),
            shard_entries: Vec::new(),
        }
    }

    /// Returns `true` if this is a synthesized placeholder rather than a real
    /// anchor received from the network.
    pub fn is_placeholder(&self) -> bool {
        self.shard_entries.is_empty() && self.prev_anchor_hash.is_zero()
    }

    /// Returns the entry for the given shard, if present.
    pub fn entry_for(&self, shard: ShardId) -> Option<&ShardAnchorEntry> {
        self.shard_entries.iter().find(|entry| entry.shard == shard)
    }

    /// Returns all pending mini-block hashes, paired with the shard whose
    /// entry listed them.
    pub fn pending_mini_block_hashes(&self) -> Vec<(ShardId, MiniBlockHash)> {
        self.shard_entries
            .iter()
            .flat_map(|entry| {
                entry
                    .pending_mini_blocks
                    .iter()
                    .map(move |header| (entry.shard, header.hash))
            })
            .collect()
    }
}

impl Display for AnchorBlock {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "anchor {} for {}, round {}, {} shard entries",
            self.hash(),
            self.epoch,
            self.round,
            self.shard_entries.len()
        )
    }
}
