use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use shardnet_hashing::Digest;

use crate::{content_digest, ShardId};

/// The content hash of a mini-block.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, Debug,
    DataSize,
)]
pub struct MiniBlockHash(Digest);

impl MiniBlockHash {
    /// Returns a new `MiniBlockHash`.
    pub fn new(digest: Digest) -> MiniBlockHash {
        MiniBlockHash(digest)
    }

    /// Returns the wrapped digest.
    pub fn inner(&self) -> &Digest {
        &self.0
    }
}

impl Display for MiniBlockHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "mini-block hash {}", self.0)
    }
}

impl From<Digest> for MiniBlockHash {
    fn from(digest: Digest) -> MiniBlockHash {
        MiniBlockHash(digest)
    }
}

/// A cross-shard block fragment: the transactions a sender shard produced for
/// a single receiver shard within one block.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct MiniBlock {
    /// The shard that produced the mini-block.
    pub sender_shard: ShardId,
    /// The shard the contained transactions are destined for.
    pub receiver_shard: ShardId,
    /// Hashes of the contained transactions.
    pub tx_hashes: Vec<Digest>,
}

impl MiniBlock {
    /// Returns the content hash of the mini-block.
    pub fn hash(&self) -> MiniBlockHash {
        MiniBlockHash(content_digest(self))
    }
}

impl Display for MiniBlock {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "mini-block {} ({} -> {}, {} txs)",
            self.hash(),
            self.sender_shard,
            self.receiver_shard,
            self.tx_hashes.len()
        )
    }
}

/// The summary of a mini-block as referenced from an anchor block's per-shard
/// entry; carries enough information to fetch and route the full mini-block.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct MiniBlockHeader {
    /// Hash of the full mini-block.
    pub hash: MiniBlockHash,
    /// The shard that produced the mini-block.
    pub sender_shard: ShardId,
    /// The shard the mini-block is destined for.
    pub receiver_shard: ShardId,
    /// Number of transactions in the full mini-block.
    pub tx_count: u32,
}
