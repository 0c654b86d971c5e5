//! State-trie syncer.
//!
//! Downloads a complete Merkle trie starting from its root hash.  The node
//! set is discovered on the fly: every fetched node's children are pushed
//! onto a shared [`WorkQueue`] and a pool of workers drains it, with a
//! semaphore bounding the number of node fetches in flight.  Once the queue
//! is empty the assembled snapshot is verified against the root hash before
//! it is handed out.
//!
//! Completed snapshots are cached per root, so syncing the same root twice
//! (the validator-statistics trie is shared by all nodes of an epoch, for
//! instance) does not touch the network again.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use shardnet_hashing::Digest;
use shardnet_types::{
    DecodedPayload, ShardId, Tag, TimeDiff, TrieNode, TrieSnapshot, TrieVerifyError,
};

use crate::{
    components::resolver::{ObjectResolver, ResolveError},
    config::TrieSyncConfig,
    utils::work_queue::WorkQueue,
};

/// Error returned by [`TrieSyncer::sync`].
#[derive(Debug, Error)]
pub enum TrieSyncError {
    /// The whole-trie time budget ran out before the download finished.
    #[error("trie sync for root {root} exceeded its budget of {budget}")]
    BudgetExceeded {
        /// The root of the abandoned download.
        root: Digest,
        /// The configured budget.
        budget: TimeDiff,
    },
    /// A single node could not be resolved.
    #[error("could not resolve trie node {hash}: {source}")]
    Node {
        /// The unresolvable node.
        hash: Digest,
        /// The underlying resolution failure.
        source: ResolveError,
    },
    /// An object resolved under a trie-node hash was something else.
    #[error("object {hash} is a {found}, expected a trie node")]
    WrongPayloadKind {
        /// The hash the object was requested under.
        hash: Digest,
        /// The kind that actually arrived.
        found: Tag,
    },
    /// The assembled snapshot failed hash verification.
    #[error("downloaded trie for root {root} failed verification: {source}")]
    Verification {
        root: Digest,
        source: TrieVerifyError,
    },
}

/// Downloads and verifies complete state tries.
pub struct TrieSyncer {
    resolver: Arc<ObjectResolver>,
    config: TrieSyncConfig,
    /// Bounds concurrent node fetches across all in-flight syncs.
    fetch_limit: Semaphore,
    /// Verified snapshots by root hash.
    completed: Mutex<HashMap<Digest, Arc<TrieSnapshot>>>,
}

impl TrieSyncer {
    /// Creates a trie syncer on top of the shared object resolver.
    pub fn new(resolver: Arc<ObjectResolver>, config: TrieSyncConfig) -> TrieSyncer {
        let fetch_limit = Semaphore::new(config.max_parallel_fetches);
        TrieSyncer {
            resolver,
            config,
            fetch_limit,
            completed: Mutex::new(HashMap::new()),
        }
    }

    /// Downloads the trie rooted at `root` from peers of `owner`, verifies
    /// it and returns the snapshot.
    ///
    /// The all-zeros root denotes the empty trie and completes immediately.
    /// The entire download shares one time budget; on expiry all workers are
    /// stopped and the partial download is discarded.
    pub async fn sync(
        &self,
        owner: ShardId,
        root: Digest,
    ) -> Result<Arc<TrieSnapshot>, TrieSyncError> {
        if root.is_zero() {
            return Ok(Arc::new(TrieSnapshot::empty()));
        }
        if let Some(snapshot) = self
            .completed
            .lock()
            .expect("lock poisoned")
            .get(&root)
        {
            debug!(%root, "reusing previously synced trie");
            return Ok(snapshot.clone());
        }

        let budget = Duration::from(self.config.budget);
        let snapshot = tokio::time::timeout(budget, self.sync_inner(owner, root))
            .await
            .map_err(|_| TrieSyncError::BudgetExceeded {
                root,
                budget: self.config.budget,
            })??;

        let snapshot = Arc::new(snapshot);
        self.completed
            .lock()
            .expect("lock poisoned")
            .insert(root, snapshot.clone());
        Ok(snapshot)
    }

    async fn sync_inner(
        &self,
        owner: ShardId,
        root: Digest,
    ) -> Result<TrieSnapshot, TrieSyncError> {
        let queue: Arc<WorkQueue<Digest>> = Arc::new(WorkQueue::default());
        queue.push_job(root);
        let nodes: Mutex<BTreeMap<Digest, TrieNode>> = Mutex::new(BTreeMap::new());
        let seen: Mutex<HashSet<Digest>> = Mutex::new(HashSet::from([root]));
        let abort = AtomicBool::new(false);

        let mut workers: FuturesUnordered<_> = (0..self.config.worker_count)
            .map(|worker_id| self.trie_worker(worker_id, owner, queue.clone(), &nodes, &seen, &abort))
            .collect();
        while let Some(result) = workers.next().await {
            result?;
        }
        drop(workers);

        let nodes = mem::take(&mut *nodes.lock().expect("lock poisoned"));
        let snapshot = TrieSnapshot::new(root, nodes);
        snapshot
            .verify()
            .map_err(|source| TrieSyncError::Verification { root, source })?;
        info!(%root, %owner, node_count = snapshot.len(), "trie sync complete");
        Ok(snapshot)
    }

    /// A single download worker; runs until the queue is drained or an
    /// abort is signalled.
    async fn trie_worker(
        &self,
        worker_id: usize,
        owner: ShardId,
        queue: Arc<WorkQueue<Digest>>,
        nodes: &Mutex<BTreeMap<Digest, TrieNode>>,
        seen: &Mutex<HashSet<Digest>>,
        abort: &AtomicBool,
    ) -> Result<(), TrieSyncError> {
        while let Some(job) = queue.next_job().await {
            if abort.load(Ordering::Relaxed) {
                return Ok(());
            }
            let hash = *job.inner();

            let permit = self
                .fetch_limit
                .acquire()
                .await
                .expect("semaphore closed");
            let result = self
                .resolver
                .resolve(
                    &[(owner, hash)],
                    Duration::from(self.config.node_request_timeout),
                )
                .await;
            drop(permit);

            let mut resolved = match result {
                Ok(resolved) => resolved,
                Err(source) => {
                    abort.store(true, Ordering::Relaxed);
                    warn!(worker_id, %hash, %source, "trie node fetch failed");
                    return Err(TrieSyncError::Node { hash, source });
                }
            };
            let node = match resolved.remove(&hash) {
                Some(DecodedPayload::TrieNode(node)) => node,
                Some(other) => {
                    abort.store(true, Ordering::Relaxed);
                    return Err(TrieSyncError::WrongPayloadKind {
                        hash,
                        found: other.tag(),
                    });
                }
                // The resolver only returns complete batches.
                None => unreachable!("resolved batch is missing a requested hash"),
            };

            for child in node.children() {
                if seen.lock().expect("lock poisoned").insert(child) {
                    queue.push_job(child);
                }
            }
            nodes.lock().expect("lock poisoned").insert(hash, node);
            // Dropping the job handle marks it complete in the queue.
            drop(job);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        config::ResolverConfig,
        pool::ObjectPool,
        testing::{self, TestNetwork},
    };

    fn syncer(network: Arc<TestNetwork>, budget: &str) -> TrieSyncer {
        let resolver = ObjectResolver::new(
            network,
            Arc::new(ObjectPool::new()),
            ResolverConfig {
                request_interval: "10ms".parse().unwrap(),
            },
        );
        TrieSyncer::new(
            resolver,
            TrieSyncConfig {
                budget: budget.parse().unwrap(),
                node_request_timeout: "50ms".parse().unwrap(),
                worker_count: 4,
                max_parallel_fetches: 8,
            },
        )
    }

    #[tokio::test]
    async fn downloads_and_verifies_a_complete_trie() {
        let mut rng = StdRng::seed_from_u64(0x791E);
        let network = Arc::new(TestNetwork::new(4));
        let syncer = syncer(network.clone(), "5sec");

        let (root, nodes) = testing::sample_trie(&mut rng, 3);
        for node in nodes.values() {
            network.serve(DecodedPayload::TrieNode(node.clone()));
        }

        let snapshot = syncer
            .sync(ShardId::new(0), root)
            .await
            .expect("all nodes are served");
        assert_eq!(snapshot.root(), root);
        assert_eq!(snapshot.len(), nodes.len());
        snapshot.verify().expect("snapshot verifies");
    }

    #[tokio::test]
    async fn zero_root_is_the_empty_trie() {
        let network = Arc::new(TestNetwork::new(4));
        let syncer = syncer(network.clone(), "5sec");

        let snapshot = syncer
            .sync(ShardId::new(0), Digest::default())
            .await
            .expect("empty trie needs no download");
        assert!(snapshot.is_empty());
        assert_eq!(network.request_count(), 0);
    }

    #[tokio::test]
    async fn completed_roots_are_served_from_the_cache() {
        let mut rng = StdRng::seed_from_u64(0x791F);
        let network = Arc::new(TestNetwork::new(4));
        let syncer = syncer(network.clone(), "5sec");

        let (root, nodes) = testing::sample_trie(&mut rng, 2);
        for node in nodes.values() {
            network.serve(DecodedPayload::TrieNode(node.clone()));
        }

        let first = syncer.sync(ShardId::new(0), root).await.unwrap();
        let requests_after_first = network.request_count();
        let second = syncer.sync(ShardId::new(1), root).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(network.request_count(), requests_after_first);
    }

    #[tokio::test]
    async fn missing_node_aborts_the_sync() {
        let mut rng = StdRng::seed_from_u64(0x7920);
        let network = Arc::new(TestNetwork::new(4));
        let syncer = syncer(network.clone(), "5sec");

        let (root, mut nodes) = testing::sample_trie(&mut rng, 3);
        // Withhold one non-root node.
        let withheld = *nodes
            .keys()
            .find(|hash| **hash != root)
            .expect("trie has more than one node");
        nodes.remove(&withheld);
        for node in nodes.values() {
            network.serve(DecodedPayload::TrieNode(node.clone()));
        }

        let error = syncer
            .sync(ShardId::new(0), root)
            .await
            .expect_err("one node is unobtainable");
        match error {
            TrieSyncError::Node { hash, .. } => assert_eq!(hash, withheld),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn budget_expiry_discards_the_partial_download() {
        let network = Arc::new(TestNetwork::new(4));
        let syncer = syncer(network.clone(), "30ms");

        // Nothing is served and the node timeout exceeds the budget, so the
        // overall budget fires first.
        let root = Digest::hash(b"unobtainable root");
        let error = syncer
            .sync(ShardId::new(0), root)
            .await
            .expect_err("budget must expire");
        assert!(matches!(error, TrieSyncError::BudgetExceeded { .. }));
        assert!(syncer.completed.lock().unwrap().is_empty());
    }
}
