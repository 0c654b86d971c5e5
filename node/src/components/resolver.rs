//! Object resolver.
//!
//! Turns "I need the objects behind these hashes" into a single awaitable
//! call. Callers hand over a batch of `(shard, hash)` pairs; the resolver
//! fills the batch from the [`ObjectPool`] where possible and requests the
//! rest from the network, re-requesting at a fixed interval until the batch
//! is complete or the caller's timeout expires.
//!
//! All inbound objects arrive through the single handler registered on
//! [`Topic::Objects`]. Each delivery is decoded once, inserted into the pool
//! (first writer wins) and crossed off every active batch still waiting for
//! that hash. Duplicate deliveries are no-ops, and deliveries for a batch
//! that already timed out only populate the pool.

use std::{
    cmp,
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use thiserror::Error;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, trace};

use shardnet_hashing::Digest;
use shardnet_types::{DecodedPayload, ShardId};

use crate::{
    config::ResolverConfig,
    network::{NetworkService, NodeId, PayloadHandler, Topic},
    pool::ObjectPool,
};

/// Error returned by [`ObjectResolver::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The timeout expired with objects still outstanding.
    #[error("timed out resolving batch: {} of {requested} objects still missing", missing.len())]
    Timeout {
        /// Number of distinct hashes the batch asked for.
        requested: usize,
        /// Hashes that never arrived.
        missing: Vec<Digest>,
    },
    /// A hash was crossed off the batch but the pool has no object for it.
    ///
    /// The pool is write-once, so this indicates a bug rather than a
    /// transient condition.
    #[error("object {hash} missing from pool after delivery")]
    VanishedFromPool {
        /// The hash that was crossed off but has no pooled object.
        hash: Digest,
    },
}

/// One in-flight batch.
#[derive(Debug)]
struct BatchState {
    /// Hashes the batch is still waiting for.
    missing: Mutex<HashSet<Digest>>,
    /// Set once the owning `resolve` call has ended, by return or by
    /// cancellation; late deliveries still land in the pool but no longer
    /// touch this batch.
    abandoned: AtomicBool,
    /// Signalled when `missing` becomes empty.
    notify: Notify,
}

/// Deregisters a batch when the owning `resolve` call ends, whether it
/// returns or its future is dropped mid-await (e.g. a trie sync whose
/// wall-clock budget expires cancels every in-flight `resolve`).
struct BatchGuard<'a> {
    resolver: &'a ObjectResolver,
    batch: Arc<BatchState>,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.batch.abandoned.store(true, Ordering::SeqCst);
        self.resolver
            .batches
            .lock()
            .expect("lock poisoned")
            .retain(|active| !Arc::ptr_eq(active, &self.batch));
    }
}

/// Resolves content hashes to decoded objects via pool and network.
pub struct ObjectResolver {
    network: Arc<dyn NetworkService>,
    pool: Arc<ObjectPool>,
    config: ResolverConfig,
    batches: Mutex<Vec<Arc<BatchState>>>,
}

impl ObjectResolver {
    /// Creates the resolver and registers its delivery handler on
    /// [`Topic::Objects`].
    pub fn new(
        network: Arc<dyn NetworkService>,
        pool: Arc<ObjectPool>,
        config: ResolverConfig,
    ) -> Arc<Self> {
        let resolver = Arc::new(ObjectResolver {
            network: network.clone(),
            pool,
            config,
            batches: Mutex::new(Vec::new()),
        });
        network.register_handler(Topic::Objects, resolver.clone());
        resolver
    }

    /// Shared object pool backing this resolver.
    pub fn pool(&self) -> &Arc<ObjectPool> {
        &self.pool
    }

    /// Resolves a batch of objects, returning the decoded payload for every
    /// requested hash.
    ///
    /// Objects already in the pool are taken from there without any network
    /// traffic. Outstanding hashes are requested from their shard's peers
    /// and re-requested every `request_interval` until all have arrived or
    /// `timeout` expires.
    pub async fn resolve(
        &self,
        items: &[(ShardId, Digest)],
        timeout: Duration,
    ) -> Result<HashMap<Digest, DecodedPayload>, ResolveError> {
        let mut wanted: HashMap<Digest, ShardId> = HashMap::new();
        for (shard, hash) in items {
            wanted.entry(*hash).or_insert(*shard);
        }

        let missing: HashSet<Digest> = wanted
            .keys()
            .filter(|hash| !self.pool.contains(hash))
            .copied()
            .collect();
        if missing.is_empty() {
            return self.collect(wanted.keys());
        }

        trace!(
            requested = wanted.len(),
            missing = missing.len(),
            "requesting objects from the network"
        );
        let batch = Arc::new(BatchState {
            missing: Mutex::new(missing),
            abandoned: AtomicBool::new(false),
            notify: Notify::new(),
        });
        self.batches
            .lock()
            .expect("lock poisoned")
            .push(batch.clone());
        let _guard = BatchGuard {
            resolver: self,
            batch: batch.clone(),
        };

        let deadline = Instant::now() + timeout;
        let result = self.drive_batch(&wanted, &batch, deadline).await;

        match result {
            Ok(()) => self.collect(wanted.keys()),
            Err(missing) => Err(ResolveError::Timeout {
                requested: wanted.len(),
                missing,
            }),
        }
    }

    /// Request loop for one batch. Returns the outstanding hashes on
    /// timeout.
    async fn drive_batch(
        &self,
        wanted: &HashMap<Digest, ShardId>,
        batch: &BatchState,
        deadline: Instant,
    ) -> Result<(), Vec<Digest>> {
        let request_interval = Duration::from(self.config.request_interval);
        loop {
            let notified = batch.notify.notified();

            let outstanding: Vec<Digest> = {
                let missing = batch.missing.lock().expect("lock poisoned");
                missing.iter().copied().collect()
            };
            if outstanding.is_empty() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(outstanding);
            }

            for hash in &outstanding {
                let shard = wanted
                    .get(hash)
                    .copied()
                    .unwrap_or(ShardId::METACHAIN);
                self.network.request_by_hash(shard, *hash);
            }

            let wait = cmp::min(deadline - now, request_interval);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    fn collect<'a>(
        &self,
        hashes: impl Iterator<Item = &'a Digest>,
    ) -> Result<HashMap<Digest, DecodedPayload>, ResolveError> {
        hashes
            .map(|hash| {
                let payload = self
                    .pool
                    .get(hash)
                    .ok_or(ResolveError::VanishedFromPool { hash: *hash })?;
                Ok((*hash, payload))
            })
            .collect()
    }
}

impl PayloadHandler for ObjectResolver {
    fn handle(&self, sender: NodeId, payload: &[u8]) {
        let payload = match DecodedPayload::decode(payload) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(%sender, %error, "dropping undecodable object payload");
                return;
            }
        };
        let (hash, first) = self.pool.insert(payload);
        if !first {
            trace!(%hash, %sender, "duplicate object delivery");
        }

        let batches: Vec<Arc<BatchState>> = self
            .batches
            .lock()
            .expect("lock poisoned")
            .iter()
            .cloned()
            .collect();
        for batch in batches {
            if batch.abandoned.load(Ordering::SeqCst) {
                continue;
            }
            let now_complete = {
                let mut missing = batch.missing.lock().expect("lock poisoned");
                missing.remove(&hash) && missing.is_empty()
            };
            if now_complete {
                batch.notify.notify_waiters();
            }
        }
    }
}
