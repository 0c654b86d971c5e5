//! Header syncer.
//!
//! Given a confirmed anchor block, resolves every per-shard last-finalized
//! header the anchor references, plus the previous epoch's anchor block.
//! For the very first epoch no previous anchor exists on the network, so a
//! placeholder is synthesized instead of requested.

use std::{collections::BTreeMap, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use shardnet_hashing::Digest;
use shardnet_types::{
    AnchorBlock, BlockHash, DecodedPayload, EpochId, ShardHeader, ShardId, Tag,
};

use crate::components::resolver::{ObjectResolver, ResolveError};

/// Error returned by [`sync_anchor_headers`].
#[derive(Debug, Error)]
pub enum HeaderSyncError {
    /// The batch of headers could not be resolved in time.
    #[error("could not resolve headers of anchor {anchor}: {source}")]
    Resolve {
        /// The anchor whose headers were requested.
        anchor: BlockHash,
        /// The underlying resolution failure.
        source: ResolveError,
    },
    /// A resolved object was not of the kind the anchor declared.
    #[error("object {hash} is a {found}, expected a {expected}")]
    WrongPayloadKind {
        /// The hash the object was requested under.
        hash: Digest,
        /// The kind the anchor declared.
        expected: Tag,
        /// The kind that actually arrived.
        found: Tag,
    },
    /// A header's own shard field contradicts the anchor entry listing it.
    #[error("header {hash} declares {found}, but the anchor entry is for {declared}")]
    ShardMismatch {
        /// The offending header.
        hash: BlockHash,
        /// The shard the anchor entry belongs to.
        declared: ShardId,
        /// The shard the header itself declares.
        found: ShardId,
    },
    /// The resolved previous anchor does not start the epoch preceding the
    /// current one.
    #[error("previous anchor starts {found}, expected the predecessor of {current}")]
    EpochMismatch {
        /// The epoch of the current anchor.
        current: EpochId,
        /// The epoch the previous anchor actually starts.
        found: EpochId,
    },
}

/// The headers behind one anchor block, fully resolved.
#[derive(Clone, Debug)]
pub struct SyncedHeaders {
    /// The last finalized header of every shard listed by the anchor.
    pub last_headers: BTreeMap<ShardId, ShardHeader>,
    /// The previous epoch's anchor block, or a placeholder for the first
    /// epoch.
    pub prev_anchor: AnchorBlock,
}

/// Resolves all headers referenced by a confirmed anchor block.
pub async fn sync_anchor_headers(
    resolver: &ObjectResolver,
    anchor: &AnchorBlock,
    timeout: Duration,
) -> Result<SyncedHeaders, HeaderSyncError> {
    let mut items: Vec<(ShardId, Digest)> = anchor
        .shard_entries
        .iter()
        .map(|entry| (entry.shard, *entry.header_hash.inner()))
        .collect();
    let wants_prev_anchor = !anchor.epoch.is_first();
    if wants_prev_anchor {
        items.push((ShardId::METACHAIN, *anchor.prev_anchor_hash.inner()));
    }
    debug!(%anchor, num_headers = items.len(), "resolving anchor headers");

    let resolved = resolver
        .resolve(&items, timeout)
        .await
        .map_err(|source| HeaderSyncError::Resolve {
            anchor: anchor.hash(),
            source,
        })?;

    let mut last_headers = BTreeMap::new();
    for entry in &anchor.shard_entries {
        let hash = *entry.header_hash.inner();
        match resolved.get(&hash) {
            Some(DecodedPayload::ShardHeader(header)) => {
                if header.shard != entry.shard {
                    return Err(HeaderSyncError::ShardMismatch {
                        hash: entry.header_hash,
                        declared: entry.shard,
                        found: header.shard,
                    });
                }
                last_headers.insert(entry.shard, header.clone());
            }
            Some(other) => {
                return Err(HeaderSyncError::WrongPayloadKind {
                    hash,
                    expected: Tag::ShardHeader,
                    found: other.tag(),
                });
            }
            // The resolver only returns complete batches.
            None => unreachable!("resolved batch is missing a requested hash"),
        }
    }

    let prev_anchor = if wants_prev_anchor {
        let hash = *anchor.prev_anchor_hash.inner();
        match resolved.get(&hash) {
            Some(DecodedPayload::AnchorBlock(prev)) => {
                if prev.epoch.successor() != Some(anchor.epoch) {
                    return Err(HeaderSyncError::EpochMismatch {
                        current: anchor.epoch,
                        found: prev.epoch,
                    });
                }
                prev.clone()
            }
            Some(other) => {
                return Err(HeaderSyncError::WrongPayloadKind {
                    hash,
                    expected: Tag::AnchorBlock,
                    found: other.tag(),
                });
            }
            None => unreachable!("resolved batch is missing a requested hash"),
        }
    } else {
        AnchorBlock::placeholder(anchor.epoch.predecessor().unwrap_or_default())
    };

    info!(
        %anchor,
        num_headers = last_headers.len(),
        placeholder_prev = prev_anchor.is_placeholder(),
        "anchor headers synced"
    );
    Ok(SyncedHeaders {
        last_headers,
        prev_anchor,
    })
}
