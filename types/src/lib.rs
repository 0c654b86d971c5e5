//! Types shared by the shardnet bootstrap subsystem.
//!
//! Everything here is plain data: block-like objects identified by the digest
//! of their canonical (bincode) encoding, identifiers for epochs and shards,
//! trie nodes and snapshots, validator assignment sets, and the tagged payload
//! type objects are decoded into at the network boundary.

mod block;
mod ids;
mod mini_block;
mod payload;
mod time;
mod trie;
mod validator;

use serde::Serialize;

use shardnet_hashing::Digest;

pub use block::{AnchorBlock, BlockHash, ShardAnchorEntry, ShardHeader};
pub use ids::{EpochId, ShardId};
pub use mini_block::{MiniBlock, MiniBlockHash, MiniBlockHeader};
pub use payload::{DecodedPayload, PayloadError, Tag};
pub use time::{Timestamp, TimeDiff, TimeDiffParseError};
pub use trie::{TrieNode, TrieSnapshot, TrieVerifyError, BRANCH_WIDTH};
pub use validator::{EpochAssignment, GenesisConfig, ValidatorKey};

/// Serializes a value into its canonical byte representation.
///
/// All in-memory values in this crate are serializable by construction, hence
/// the `expect`.
pub fn serialize<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("in-memory value should serialize")
}

/// Computes the content digest of a value, i.e. the hash of its canonical byte
/// representation.
pub fn content_digest<T: Serialize>(value: &T) -> Digest {
    Digest::hash(serialize(value))
}
