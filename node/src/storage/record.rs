//! The durable summary written after a successful bootstrap.

use std::collections::BTreeMap;

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use shardnet_hashing::Digest;
use shardnet_types::{BlockHash, EpochId, MiniBlockHash, ShardId};

/// Last finalized header info for one shard, as recorded at the epoch
/// boundary.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct LastHeaderInfo {
    /// Hash of the last finalized header.
    pub hash: BlockHash,
    /// Nonce of that header.
    pub nonce: u64,
    /// Round that header was produced in.
    pub round: u64,
    /// State-trie root at that header.
    pub state_root: Digest,
}

/// The artifact the resume-from-storage path reads instead of the network.
///
/// Written once at the end of a successful bootstrap, keyed by round, and
/// addressable through the highest-round pointer; read-only thereafter until
/// superseded by the next epoch's record.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct BootstrapRecord {
    /// The bootstrapped epoch.
    pub epoch: EpochId,
    /// The round of the epoch's anchor block.
    pub round: u64,
    /// The shard this node was assigned to.
    pub own_shard: ShardId,
    /// Total number of user shards.
    pub num_shards: u32,
    /// Per-shard last finalized header info.
    pub last_headers: BTreeMap<ShardId, LastHeaderInfo>,
    /// Pending mini-block hashes, grouped by the shard whose anchor entry
    /// listed them.
    pub pending_mini_blocks: BTreeMap<ShardId, Vec<MiniBlockHash>>,
    /// Content-derived key of the stored validator assignment.
    pub assignment_key: Digest,
}
