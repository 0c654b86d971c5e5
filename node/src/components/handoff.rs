//! Storage hand-off writer.
//!
//! Persists everything a network sync assembled, in an order that keeps a
//! crash at any point recoverable: artifacts first, then the bootstrap
//! record describing them, and only then the cross-epoch highest-round
//! pointer.  Until the pointer lands, a restart simply does not see the new
//! record and re-runs the sync; it can never observe a record whose
//! artifacts are missing.

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

use shardnet_types::{
    AnchorBlock, EpochAssignment, MiniBlock, ShardHeader, ShardId, TrieSnapshot,
};

use crate::storage::{BootstrapRecord, BootstrapStore, LastHeaderInfo, StoreError};

/// The phase of the hand-off a failure happened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandoffPhase {
    /// Writing trie nodes.
    Tries,
    /// Writing headers, anchors and the nonce index.
    Headers,
    /// Writing mini-block bodies.
    MiniBlocks,
    /// Writing the validator assignment.
    Assignment,
    /// Writing the bootstrap record.
    Record,
    /// Advancing the highest-round pointer.
    Pointer,
}

impl std::fmt::Display for HandoffPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            HandoffPhase::Tries => "tries",
            HandoffPhase::Headers => "headers",
            HandoffPhase::MiniBlocks => "mini-blocks",
            HandoffPhase::Assignment => "assignment",
            HandoffPhase::Record => "record",
            HandoffPhase::Pointer => "pointer",
        };
        write!(f, "{}", name)
    }
}

/// A hand-off failure; the pointer was not advanced.
#[derive(Debug, Error)]
#[error("storage hand-off failed writing {phase}: {source}")]
pub struct HandoffError {
    /// The phase the failing write belonged to.
    pub phase: HandoffPhase,
    /// The underlying storage failure.
    pub source: StoreError,
}

/// Everything a completed network sync hands over to storage.
pub struct HandoffBundle<'a> {
    /// The confirmed anchor of the target epoch.
    pub anchor: &'a AnchorBlock,
    /// The previous epoch's anchor (possibly a placeholder, which is not
    /// persisted).
    pub prev_anchor: &'a AnchorBlock,
    /// Last finalized header per shard.
    pub last_headers: &'a BTreeMap<ShardId, ShardHeader>,
    /// Pending mini-block bodies grouped by listing shard.
    pub pending_mini_blocks: &'a BTreeMap<ShardId, Vec<MiniBlock>>,
    /// The derived validator assignment.
    pub assignment: &'a EpochAssignment,
    /// The downloaded and verified state tries.
    pub tries: &'a [Arc<TrieSnapshot>],
    /// The shard the local node joins.
    pub own_shard: ShardId,
}

/// Commits a sync result to storage and returns the bootstrap record that
/// now describes it.
pub fn commit(
    store: &BootstrapStore,
    bundle: &HandoffBundle<'_>,
) -> Result<BootstrapRecord, HandoffError> {
    let epoch = bundle.anchor.epoch;
    let in_phase = |phase| move |source| HandoffError { phase, source };

    for snapshot in bundle.tries {
        store
            .put_trie_snapshot(epoch, snapshot)
            .map_err(in_phase(HandoffPhase::Tries))?;
        debug!(root = %snapshot.root(), nodes = snapshot.len(), "trie committed");
    }

    for header in bundle.last_headers.values() {
        store
            .put_header(epoch, header)
            .map_err(in_phase(HandoffPhase::Headers))?;
    }
    store
        .put_anchor(epoch, bundle.anchor)
        .map_err(in_phase(HandoffPhase::Headers))?;
    if !bundle.prev_anchor.is_placeholder() {
        store
            .put_anchor(epoch, bundle.prev_anchor)
            .map_err(in_phase(HandoffPhase::Headers))?;
    }

    for bodies in bundle.pending_mini_blocks.values() {
        for body in bodies {
            store
                .put_mini_block(epoch, body)
                .map_err(in_phase(HandoffPhase::MiniBlocks))?;
        }
    }

    let assignment_key = store
        .put_assignment(bundle.assignment)
        .map_err(in_phase(HandoffPhase::Assignment))?;

    let record = BootstrapRecord {
        epoch,
        round: bundle.anchor.round,
        own_shard: bundle.own_shard,
        num_shards: bundle.assignment.num_shards(),
        last_headers: bundle
            .last_headers
            .iter()
            .map(|(shard, header)| {
                (
                    *shard,
                    LastHeaderInfo {
                        hash: header.hash(),
                        nonce: header.nonce,
                        round: header.round,
                        state_root: header.state_root,
                    },
                )
            })
            .collect(),
        pending_mini_blocks: bundle
            .pending_mini_blocks
            .iter()
            .map(|(shard, bodies)| (*shard, bodies.iter().map(MiniBlock::hash).collect()))
            .collect(),
        assignment_key,
    };
    store
        .put_record(&record)
        .map_err(in_phase(HandoffPhase::Record))?;

    // The pointer is the commit point; everything above must already be
    // durable when it lands.
    store
        .set_highest_round(epoch, record.round)
        .map_err(in_phase(HandoffPhase::Pointer))?;

    info!(
        %epoch,
        round = record.round,
        own_shard = %record.own_shard,
        "bootstrap state handed off to storage"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use shardnet_types::EpochId;

    use super::*;
    use crate::{
        storage::{MemStore, Unit},
        testing,
    };

    struct Committed {
        store: BootstrapStore,
        record: BootstrapRecord,
        fixture: testing::EpochFixture,
    }

    fn commit_fixture(seed: u64) -> Committed {
        let mut rng = StdRng::seed_from_u64(seed);
        let fixture = testing::sample_epoch(&mut rng, EpochId::new(3), 2);
        let store = BootstrapStore::new(Arc::new(MemStore::new()));

        let (trie_root, trie_nodes) = testing::sample_trie(&mut rng, 2);
        let tries = vec![Arc::new(TrieSnapshot::new(trie_root, trie_nodes))];
        let assignment = testing::sample_assignment(&mut rng, EpochId::new(3), 2);
        let pending: BTreeMap<ShardId, Vec<MiniBlock>> = {
            let mut grouped = BTreeMap::new();
            for (shard, hash) in fixture.anchor.pending_mini_block_hashes() {
                let body = fixture.mini_blocks[&hash].clone();
                grouped.entry(shard).or_insert_with(Vec::new).push(body);
            }
            grouped
        };

        let record = commit(
            &store,
            &HandoffBundle {
                anchor: &fixture.anchor,
                prev_anchor: &fixture.prev_anchor,
                last_headers: &fixture.headers,
                pending_mini_blocks: &pending,
                assignment: &assignment,
                tries: &tries,
                own_shard: ShardId::new(1),
            },
        )
        .expect("in-memory commit cannot fail");
        Committed {
            store,
            record,
            fixture,
        }
    }

    #[test]
    fn commit_persists_all_artifacts_and_advances_the_pointer() {
        let committed = commit_fixture(0x0FF1);
        let epoch = EpochId::new(3);

        for header in committed.fixture.headers.values() {
            assert!(committed
                .store
                .has_header(epoch, header.hash().inner())
                .unwrap());
            assert_eq!(
                committed
                    .store
                    .header_hash_by_nonce(epoch, header.shard, header.nonce)
                    .unwrap(),
                Some(header.hash())
            );
        }
        assert!(committed
            .store
            .has_header(epoch, committed.fixture.anchor.hash().inner())
            .unwrap());
        for (hash, body) in &committed.fixture.mini_blocks {
            assert_eq!(
                committed.store.get_mini_block(epoch, hash).unwrap().as_ref(),
                Some(body)
            );
        }
        assert!(committed
            .store
            .get_assignment(epoch, &committed.record.assignment_key)
            .unwrap()
            .is_some());
        assert_eq!(
            committed.store.highest_round().unwrap(),
            Some((epoch, committed.fixture.anchor.round))
        );
        assert_eq!(
            committed.store.get_record(epoch, committed.record.round).unwrap(),
            Some(committed.record)
        );
    }

    #[test]
    fn record_reflects_the_synced_headers() {
        let committed = commit_fixture(0x0FF2);
        assert_eq!(committed.record.epoch, EpochId::new(3));
        assert_eq!(committed.record.own_shard, ShardId::new(1));
        for (shard, header) in &committed.fixture.headers {
            let info = &committed.record.last_headers[shard];
            assert_eq!(info.hash, header.hash());
            assert_eq!(info.nonce, header.nonce);
            assert_eq!(info.state_root, header.state_root);
        }
    }

    #[test]
    fn failed_write_leaves_the_pointer_untouched() {
        let mut rng = StdRng::seed_from_u64(0x0FF3);
        let fixture = testing::sample_epoch(&mut rng, EpochId::new(3), 2);
        let assignment = testing::sample_assignment(&mut rng, EpochId::new(3), 2);
        // Fails every write to the record unit; the pointer write never runs.
        let engine = Arc::new(testing::FailingStore::failing_unit(Unit::BootstrapRecords));
        let store = BootstrapStore::new(engine);

        let empty_headers = BTreeMap::new();
        let empty_pending = BTreeMap::new();
        let error = commit(
            &store,
            &HandoffBundle {
                anchor: &fixture.anchor,
                prev_anchor: &fixture.prev_anchor,
                last_headers: &empty_headers,
                pending_mini_blocks: &empty_pending,
                assignment: &assignment,
                tries: &[],
                own_shard: ShardId::new(0),
            },
        )
        .expect_err("record write fails");
        assert_eq!(error.phase, HandoffPhase::Record);
        assert_eq!(store.highest_round().unwrap(), None);
    }
}
