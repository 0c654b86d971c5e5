//! Key layout of the persisted artifacts.
//!
//! Every key except the highest-round pointer is prefixed with the epoch it
//! belongs to, which makes epoch rollover additive: a new epoch's writes can
//! never collide with, or corrupt, a previous epoch's data.

use shardnet_hashing::Digest;
use shardnet_types::{EpochId, ShardId};

/// The single cross-epoch key, holding the `(epoch, round)` of the most
/// recent completed hand-off.
pub(super) const HIGHEST_ROUND_KEY: &[u8] = b"highest_round";

/// Key for a content-addressed artifact: epoch prefix plus the digest.
pub(super) fn hash_key(epoch: EpochId, hash: &Digest) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + Digest::LENGTH);
    key.extend_from_slice(&epoch.value().to_be_bytes());
    key.extend_from_slice(hash.as_ref());
    key
}

/// Key for the nonce-to-hash header index.
pub(super) fn nonce_key(epoch: EpochId, shard: ShardId, nonce: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + 4 + 8);
    key.extend_from_slice(&epoch.value().to_be_bytes());
    key.extend_from_slice(&shard.value().to_be_bytes());
    key.extend_from_slice(&nonce.to_be_bytes());
    key
}

/// Key for a bootstrap record, one per round.
pub(super) fn round_key(epoch: EpochId, round: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + 8);
    key.extend_from_slice(&epoch.value().to_be_bytes());
    key.extend_from_slice(&round.to_be_bytes());
    key
}
