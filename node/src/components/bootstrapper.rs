//! Bootstrap orchestrator.
//!
//! Decides how a starting node reaches an operational state and drives the
//! chosen path end to end:
//!
//! * **epoch zero**: the chain has not started, or is still in its first
//!   epoch; the genesis configuration alone answers everything.
//! * **local storage**: a recent enough bootstrap record exists and the
//!   node's key is still part of the recorded assignment; no network work.
//! * **network sync**: anchor confirmation, header sync, assignment
//!   derivation, then trie and pending-block sync in parallel, and finally
//!   the storage hand-off.

use std::sync::Arc;

use prometheus::Registry;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use shardnet_hashing::Digest;
use shardnet_types::{
    EpochId, GenesisConfig, ShardId, Timestamp, ValidatorKey,
};

use crate::{
    components::{
        anchor_locator::{AnchorLocator, LocateError},
        assignment::{self, AssignmentError, ValidatorShuffler},
        handoff::{self, HandoffBundle, HandoffError},
        header_sync::{self, HeaderSyncError},
        metrics::Metrics,
        pending_blocks::{PendingBlockSyncer, PendingSyncError, SyncState},
        resolver::ObjectResolver,
        trie_sync::{TrieSyncError, TrieSyncer},
    },
    config::BootstrapConfig,
    network::NetworkService,
    pool::ObjectPool,
    storage::{BootstrapStore, KeyValueStore, StoreError},
};

/// The path a bootstrap took.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootstrapPath {
    /// Answered from the genesis configuration.
    EpochZero,
    /// Resumed from a recent bootstrap record.
    FromLocalStorage,
    /// Full sync from the network.
    NetworkSync,
}

impl BootstrapPath {
    fn as_str(self) -> &'static str {
        match self {
            BootstrapPath::EpochZero => "epoch_zero",
            BootstrapPath::FromLocalStorage => "local_storage",
            BootstrapPath::NetworkSync => "network_sync",
        }
    }
}

/// What the rest of the node needs to start participating.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootstrapTarget {
    /// The epoch the node bootstrapped into.
    pub epoch: EpochId,
    /// The shard the node joins.
    pub self_shard: ShardId,
    /// Total number of user shards.
    pub num_shards: u32,
    /// Key of the epoch's validator assignment.
    pub assignment_key: Digest,
    /// The path the bootstrap took.
    pub path: BootstrapPath,
}

/// A fatal bootstrap failure.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// No epoch anchor could be confirmed.
    #[error("could not confirm an epoch anchor: {0}")]
    Anchor(#[from] LocateError),
    /// The anchor's headers could not be synced.
    #[error(transparent)]
    Headers(#[from] HeaderSyncError),
    /// The validator assignment could not be derived.
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    /// A state trie could not be downloaded and verified.
    #[error(transparent)]
    Trie(#[from] TrieSyncError),
    /// The pending mini-blocks could not be synced.
    #[error(transparent)]
    PendingBlocks(#[from] PendingSyncError),
    /// The hand-off to storage failed.
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    /// A storage read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Metric registration failed.
    #[error("could not register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Drives a starting node to an operational state.
pub struct Bootstrapper {
    config: BootstrapConfig,
    genesis: GenesisConfig,
    own_key: ValidatorKey,
    store: BootstrapStore,
    shuffler: Arc<dyn ValidatorShuffler>,
    resolver: Arc<ObjectResolver>,
    locator: Arc<AnchorLocator>,
    trie_syncer: TrieSyncer,
    pending: PendingBlockSyncer,
    metrics: Metrics,
}

impl Bootstrapper {
    /// Wires up the whole subsystem on top of the given collaborators.
    pub fn new(
        config: BootstrapConfig,
        genesis: GenesisConfig,
        own_key: ValidatorKey,
        network: Arc<dyn NetworkService>,
        engine: Arc<dyn KeyValueStore>,
        shuffler: Arc<dyn ValidatorShuffler>,
        registry: &Registry,
    ) -> Result<Bootstrapper, BootstrapError> {
        let pool = Arc::new(ObjectPool::new());
        let resolver = ObjectResolver::new(network.clone(), pool, config.resolver.clone());
        let locator = AnchorLocator::new(network, config.anchor.clone());
        let store = BootstrapStore::new(engine);
        let trie_syncer = TrieSyncer::new(resolver.clone(), config.trie.clone());
        let pending =
            PendingBlockSyncer::new(resolver.clone(), store.clone(), config.pending.clone());
        let metrics = Metrics::new(registry)?;
        Ok(Bootstrapper {
            config,
            genesis,
            own_key,
            store,
            shuffler,
            resolver,
            locator,
            trie_syncer,
            pending,
            metrics,
        })
    }

    /// Bootstraps the node, taking the cheapest applicable path.
    pub async fn bootstrap(&self) -> Result<BootstrapTarget, BootstrapError> {
        self.bootstrap_at(Timestamp::now()).await
    }

    /// Bootstraps the node, evaluating path conditions against `now`.
    pub async fn bootstrap_at(&self, now: Timestamp) -> Result<BootstrapTarget, BootstrapError> {
        let started = Instant::now();

        let current_round = match self.genesis.current_round(now) {
            // Chain start still in the future.
            None => return self.epoch_zero(),
            Some(round) if round < self.genesis.rounds_per_epoch => {
                return self.epoch_zero();
            }
            Some(round) => round,
        };

        match self.try_resume(current_round) {
            Ok(Some(target)) => return Ok(target),
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "resume from local storage failed, falling back to network sync");
            }
        }

        let target = self.network_sync().await?;
        self.metrics
            .bootstrap_duration_seconds
            .set(started.elapsed().as_secs_f64());
        Ok(target)
    }

    /// The trivial path: the chain is in its first epoch (or has not started
    /// yet), so the genesis configuration answers everything.
    fn epoch_zero(&self) -> Result<BootstrapTarget, BootstrapError> {
        let assignment = self.genesis.initial_assignment();
        let self_shard = assignment
            .shard_of(&self.own_key)
            .unwrap_or(self.config.destination_shard_as_observer);
        // Persist the genesis assignment so the returned key dereferences to
        // a stored blob, same as on the other two paths.
        let assignment_key = self.store.put_assignment(&assignment)?;
        info!(%self_shard, "bootstrapping from genesis configuration");
        self.metrics
            .bootstrap_path
            .with_label_values(&[BootstrapPath::EpochZero.as_str()])
            .inc();
        Ok(BootstrapTarget {
            epoch: EpochId::new(0),
            self_shard,
            num_shards: self.genesis.num_shards,
            assignment_key,
            path: BootstrapPath::EpochZero,
        })
    }

    /// Attempts the resume path; returns `Ok(None)` when the network path
    /// must be taken instead.
    fn try_resume(&self, current_round: u64) -> Result<Option<BootstrapTarget>, BootstrapError> {
        let (epoch, round) = match self.store.highest_round()? {
            Some(pointer) => pointer,
            None => return Ok(None),
        };
        if current_round.saturating_sub(round) > self.config.resume_grace_rounds {
            debug!(
                %epoch,
                round,
                current_round,
                "bootstrap record too old to resume from"
            );
            return Ok(None);
        }
        let record = match self.store.get_record(epoch, round)? {
            Some(record) => record,
            None => {
                warn!(%epoch, round, "highest-round pointer has no record behind it");
                return Ok(None);
            }
        };
        let assignment = match self.store.get_assignment(epoch, &record.assignment_key)? {
            Some(assignment) => assignment,
            None => {
                warn!(%epoch, "bootstrap record references a missing assignment");
                return Ok(None);
            }
        };

        let self_shard = match assignment.shard_of(&self.own_key) {
            Some(shard) => shard,
            None => {
                // The stored epoch shuffled this key out; its state must be
                // re-synced for whatever shard it belongs to now.
                info!(
                    key = %self.own_key,
                    %epoch,
                    "key absent from the stored assignment, full sync required"
                );
                return Ok(None);
            }
        };

        // Spot-check the artifacts the record promises.
        if let Some(info) = record.last_headers.get(&self_shard) {
            let indexed = self
                .store
                .header_hash_by_nonce(epoch, self_shard, info.nonce)?;
            if indexed != Some(info.hash) {
                warn!(
                    %epoch,
                    %self_shard,
                    nonce = info.nonce,
                    "stored header index contradicts the bootstrap record"
                );
                return Ok(None);
            }
        }

        info!(%epoch, round, %self_shard, "resuming from local storage");
        self.metrics
            .bootstrap_path
            .with_label_values(&[BootstrapPath::FromLocalStorage.as_str()])
            .inc();
        Ok(Some(BootstrapTarget {
            epoch,
            self_shard,
            num_shards: record.num_shards,
            assignment_key: record.assignment_key,
            path: BootstrapPath::FromLocalStorage,
        }))
    }

    /// The full network path.
    async fn network_sync(&self) -> Result<BootstrapTarget, BootstrapError> {
        info!("starting network bootstrap");

        let anchor = self.locator.locate().await?;
        let synced = header_sync::sync_anchor_headers(
            &self.resolver,
            &anchor,
            self.config.header_resolve_timeout.into(),
        )
        .await?;
        self.metrics
            .resolved_headers
            .inc_by(synced.last_headers.len() as u64);

        let node_assignment = assignment::resolve_assignment(
            &*self.shuffler,
            &self.genesis,
            &anchor,
            &synced.prev_anchor,
            &self.own_key,
            self.config.destination_shard_as_observer,
        )?;
        let self_shard = node_assignment.own_shard;

        // The shard's account trie and the global validator-statistics trie
        // download in parallel with the pending mini-block bodies.
        let account_root = anchor
            .entry_for(self_shard)
            .map(|entry| entry.state_root)
            .unwrap_or_default();
        let (account_trie, validator_trie, pending_result) = tokio::join!(
            self.trie_syncer.sync(self_shard, account_root),
            self.trie_syncer
                .sync(ShardId::METACHAIN, anchor.validator_stats_root),
            self.pending.sync_pending_mini_blocks(&anchor),
        );
        let account_trie = account_trie?;
        let validator_trie = validator_trie?;
        pending_result?;
        let pending_blocks = match self.pending.mini_blocks() {
            SyncState::Synced(grouped) => grouped,
            // sync_pending_mini_blocks publishes before returning Ok.
            SyncState::NotSynced => unreachable!("pending sync returned without publishing"),
        };
        self.metrics
            .resolved_trie_nodes
            .inc_by((account_trie.len() + validator_trie.len()) as u64);
        self.metrics
            .resolved_mini_blocks
            .inc_by(pending_blocks.values().map(Vec::len).sum::<usize>() as u64);

        let tries = [account_trie, validator_trie];
        let record = handoff::commit(
            &self.store,
            &HandoffBundle {
                anchor: &anchor,
                prev_anchor: &synced.prev_anchor,
                last_headers: &synced.last_headers,
                pending_mini_blocks: &pending_blocks,
                assignment: &node_assignment.assignment,
                tries: &tries,
                own_shard: self_shard,
            },
        )?;

        info!(
            epoch = %record.epoch,
            %self_shard,
            num_shards = record.num_shards,
            "network bootstrap complete"
        );
        self.metrics
            .bootstrap_path
            .with_label_values(&[BootstrapPath::NetworkSync.as_str()])
            .inc();
        Ok(BootstrapTarget {
            epoch: record.epoch,
            self_shard,
            num_shards: record.num_shards,
            assignment_key: record.assignment_key,
            path: BootstrapPath::NetworkSync,
        })
    }
}
