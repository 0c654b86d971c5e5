//! The shared in-memory object pool.
//!
//! Every component resolves objects through the pool: the resolver's receive
//! handler writes decoded payloads into it, and `resolve` calls read their
//! results back out.  Entries are keyed by content hash and write-once; a
//! duplicate delivery is a no-op, never an overwrite.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use shardnet_hashing::Digest;
use shardnet_types::DecodedPayload;

/// A write-once, content-addressed pool of decoded payloads.
#[derive(Debug, Default)]
pub struct ObjectPool {
    entries: Mutex<HashMap<Digest, DecodedPayload>>,
}

impl ObjectPool {
    /// Creates an empty pool.
    pub fn new() -> ObjectPool {
        ObjectPool::default()
    }

    /// Inserts a payload under its content hash.
    ///
    /// Returns the hash, plus `true` if this was the first delivery; `false`
    /// means the key was already present (first writer wins).
    pub fn insert(&self, payload: DecodedPayload) -> (Digest, bool) {
        let hash = payload.content_hash();
        let mut entries = self.entries.lock().expect("lock poisoned");
        let inserted = match entries.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(payload);
                true
            }
        };
        (hash, inserted)
    }

    /// Returns a clone of the payload stored under `hash`.
    pub fn get(&self, hash: &Digest) -> Option<DecodedPayload> {
        self.entries.lock().expect("lock poisoned").get(hash).cloned()
    }

    /// Returns `true` if the pool holds an entry for `hash`.
    pub fn contains(&self, hash: &Digest) -> bool {
        self.entries.lock().expect("lock poisoned").contains_key(hash)
    }

    /// Returns the number of pooled entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    /// Returns `true` if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use shardnet_hashing::Digest;
    use shardnet_types::{DecodedPayload, MiniBlock, ShardId};

    use super::ObjectPool;

    fn payload(seed: &[u8]) -> DecodedPayload {
        DecodedPayload::MiniBlock(MiniBlock {
            sender_shard: ShardId::new(0),
            receiver_shard: ShardId::new(1),
            tx_hashes: vec![Digest::hash(seed)],
        })
    }

    #[test]
    fn first_writer_wins() {
        let pool = ObjectPool::new();
        let (hash, inserted) = pool.insert(payload(b"a"));
        assert!(inserted);
        let (same_hash, inserted_again) = pool.insert(payload(b"a"));
        assert_eq!(hash, same_hash);
        assert!(!inserted_again);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(&hash), Some(payload(b"a")));
    }

    #[test]
    fn distinct_objects_coexist() {
        let pool = ObjectPool::new();
        let (hash_a, _) = pool.insert(payload(b"a"));
        let (hash_b, _) = pool.insert(payload(b"b"));
        assert_ne!(hash_a, hash_b);
        assert!(pool.contains(&hash_a));
        assert!(pool.contains(&hash_b));
    }
}
