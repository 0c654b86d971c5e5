//! Pending-block syncer.
//!
//! An anchor block lists, per shard, the cross-shard mini-blocks that were
//! created but not yet fully notarized at the epoch boundary.  Those bodies
//! are needed before the node can take part in the new epoch, so this
//! component resolves them: local storage first, then the object pool and
//! network through the shared resolver.
//!
//! The synced set is only published once it is complete.  Until then (and
//! after any failure) readers see [`SyncState::NotSynced`], never a partial
//! set.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, info};

use shardnet_hashing::Digest;
use shardnet_types::{
    AnchorBlock, DecodedPayload, MiniBlock, MiniBlockHash, ShardId, Tag,
};

use crate::{
    components::resolver::{ObjectResolver, ResolveError},
    config::PendingSyncConfig,
    storage::{BootstrapStore, StoreError},
};

/// Whether a piece of synced data is available yet.
///
/// The `NotSynced` variant carries no partial data on purpose; consumers
/// either get the complete result or nothing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncState<T> {
    /// The sync has not completed (not started, in progress, or failed).
    NotSynced,
    /// The sync completed; the full result is available.
    Synced(T),
}

impl<T> SyncState<T> {
    /// Returns `true` once the data is available.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced(_))
    }
}

/// The pending mini-blocks of an epoch boundary, grouped by the shard whose
/// anchor entry listed them.
pub type PendingMiniBlocks = BTreeMap<ShardId, Vec<MiniBlock>>;

/// Error returned by [`PendingBlockSyncer::sync_pending_mini_blocks`].
#[derive(Debug, Error)]
pub enum PendingSyncError {
    /// The missing bodies could not all be resolved within the budget.
    #[error("pending mini-blocks not fully resolved: {source}")]
    Resolve {
        /// The underlying resolution failure.
        #[from]
        source: ResolveError,
    },
    /// An object resolved under a mini-block hash was something else.
    #[error("object {hash} is a {found}, expected a mini-block")]
    WrongPayloadKind {
        /// The hash the object was requested under.
        hash: Digest,
        /// The kind that actually arrived.
        found: Tag,
    },
    /// Reading previously stored bodies failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Syncs the mini-block bodies an anchor block lists as pending.
pub struct PendingBlockSyncer {
    resolver: Arc<ObjectResolver>,
    store: BootstrapStore,
    config: PendingSyncConfig,
    state: Mutex<SyncState<PendingMiniBlocks>>,
}

impl PendingBlockSyncer {
    /// Creates a pending-block syncer.
    pub fn new(
        resolver: Arc<ObjectResolver>,
        store: BootstrapStore,
        config: PendingSyncConfig,
    ) -> PendingBlockSyncer {
        PendingBlockSyncer {
            resolver,
            store,
            config,
            state: Mutex::new(SyncState::NotSynced),
        }
    }

    /// Resolves every pending mini-block the anchor lists and publishes the
    /// complete set.
    ///
    /// On failure the published state stays `NotSynced`; a later retry
    /// starts over (bodies that did arrive are still in the pool, so no
    /// network work is repeated for them).
    pub async fn sync_pending_mini_blocks(
        &self,
        anchor: &AnchorBlock,
    ) -> Result<(), PendingSyncError> {
        *self.state.lock().expect("lock poisoned") = SyncState::NotSynced;

        let mut wanted = anchor.pending_mini_block_hashes();
        // The same body can be listed by both the sender and receiver shard
        // entries; resolve it once per listing shard.
        let mut listed: HashSet<(ShardId, MiniBlockHash)> = HashSet::new();
        wanted.retain(|item| listed.insert(*item));

        if wanted.is_empty() {
            debug!(%anchor, "no pending mini-blocks at this epoch boundary");
            *self.state.lock().expect("lock poisoned") = SyncState::Synced(BTreeMap::new());
            return Ok(());
        }

        let epoch = anchor.epoch;
        let mut bodies: HashMap<MiniBlockHash, MiniBlock> = HashMap::new();
        let mut to_fetch: Vec<(ShardId, Digest)> = Vec::new();
        for (shard, hash) in &wanted {
            if bodies.contains_key(hash) {
                continue;
            }
            if let Some(body) = self.store.get_mini_block(epoch, hash)? {
                bodies.insert(*hash, body);
                continue;
            }
            to_fetch.push((*shard, *hash.inner()));
        }

        if !to_fetch.is_empty() {
            debug!(
                total = wanted.len(),
                from_network = to_fetch.len(),
                "fetching pending mini-block bodies"
            );
            let resolved = self
                .resolver
                .resolve(&to_fetch, Duration::from(self.config.budget))
                .await?;
            for (hash, payload) in resolved {
                match payload {
                    DecodedPayload::MiniBlock(body) => {
                        bodies.insert(body.hash(), body);
                    }
                    other => {
                        return Err(PendingSyncError::WrongPayloadKind {
                            hash,
                            found: other.tag(),
                        });
                    }
                }
            }
        }

        let mut grouped: PendingMiniBlocks = BTreeMap::new();
        for (shard, hash) in &wanted {
            // Every listed hash was read from storage or resolved above.
            let body = bodies
                .get(hash)
                .unwrap_or_else(|| unreachable!("pending body neither stored nor resolved"));
            grouped.entry(*shard).or_default().push(body.clone());
        }

        info!(
            %anchor,
            bodies = wanted.len(),
            shards = grouped.len(),
            "pending mini-blocks synced"
        );
        *self.state.lock().expect("lock poisoned") = SyncState::Synced(grouped);
        Ok(())
    }

    /// Returns the synced pending set, or `NotSynced` if no complete sync
    /// has been published.
    pub fn mini_blocks(&self) -> SyncState<PendingMiniBlocks> {
        self.state.lock().expect("lock poisoned").clone()
    }
}
