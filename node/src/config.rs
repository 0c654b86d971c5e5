//! Configuration for the bootstrap subsystem.
//!
//! Operational tuning constants (quorum fraction, retry bounds, budgets) are
//! deliberately configuration rather than hard-coded values; the defaults
//! below mirror the reference deployment.

use std::str::FromStr;

use datasize::DataSize;
use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use shardnet_types::{ShardId, TimeDiff};

const DEFAULT_ANCHOR_WAIT_WINDOW: &str = "5sec";
const DEFAULT_ANCHOR_MAX_RETRIES: u32 = 10;
const DEFAULT_REQUEST_INTERVAL: &str = "500ms";
const DEFAULT_HEADER_RESOLVE_TIMEOUT: &str = "30sec";
const DEFAULT_TRIE_BUDGET: &str = "10min";
const DEFAULT_TRIE_NODE_REQUEST_TIMEOUT: &str = "10sec";
const DEFAULT_TRIE_WORKER_COUNT: usize = 8;
const DEFAULT_TRIE_MAX_PARALLEL_FETCHES: usize = 20;
const DEFAULT_PENDING_BUDGET: &str = "1min";
const DEFAULT_RESUME_GRACE_ROUNDS: u64 = 100;

/// Configuration of the epoch-anchor locator.
#[derive(Clone, DataSize, Debug, Deserialize, Serialize)]
pub struct AnchorLocatorConfig {
    /// Fraction of currently connected peers that must report the same
    /// candidate hash before it is confirmed.
    #[data_size(skip)]
    pub threshold: Ratio<u64>,
    /// How long to wait for a quorum before re-broadcasting the request.
    pub wait_window: TimeDiff,
    /// How many re-broadcast attempts to make before giving up.  Exceeding
    /// this is a fatal bootstrap failure.
    pub max_retries: u32,
}

impl Default for AnchorLocatorConfig {
    fn default() -> Self {
        AnchorLocatorConfig {
            threshold: Ratio::new(1, 5),
            wait_window: TimeDiff::from_str(DEFAULT_ANCHOR_WAIT_WINDOW).unwrap(),
            max_retries: DEFAULT_ANCHOR_MAX_RETRIES,
        }
    }
}

/// Configuration of the object resolver.
#[derive(Copy, Clone, DataSize, Debug, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Interval at which outstanding hashes are re-requested, to compensate
    /// for dropped messages.
    pub request_interval: TimeDiff,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            request_interval: TimeDiff::from_str(DEFAULT_REQUEST_INTERVAL).unwrap(),
        }
    }
}

/// Configuration of the state-trie syncer.
#[derive(Copy, Clone, DataSize, Debug, Deserialize, Serialize)]
pub struct TrieSyncConfig {
    /// Wall-clock budget for syncing one trie; exceeding it is a hard
    /// failure.
    pub budget: TimeDiff,
    /// Timeout for resolving a single trie node.
    pub node_request_timeout: TimeDiff,
    /// Number of worker tasks walking the trie concurrently.
    pub worker_count: usize,
    /// Upper bound on in-flight node fetches across all concurrent trie
    /// syncs.
    pub max_parallel_fetches: usize,
}

impl Default for TrieSyncConfig {
    fn default() -> Self {
        TrieSyncConfig {
            budget: TimeDiff::from_str(DEFAULT_TRIE_BUDGET).unwrap(),
            node_request_timeout: TimeDiff::from_str(DEFAULT_TRIE_NODE_REQUEST_TIMEOUT).unwrap(),
            worker_count: DEFAULT_TRIE_WORKER_COUNT,
            max_parallel_fetches: DEFAULT_TRIE_MAX_PARALLEL_FETCHES,
        }
    }
}

/// Configuration of the pending mini-block syncer.
#[derive(Copy, Clone, DataSize, Debug, Deserialize, Serialize)]
pub struct PendingSyncConfig {
    /// Wall-clock budget for resolving all pending mini-blocks.
    pub budget: TimeDiff,
}

impl Default for PendingSyncConfig {
    fn default() -> Self {
        PendingSyncConfig {
            budget: TimeDiff::from_str(DEFAULT_PENDING_BUDGET).unwrap(),
        }
    }
}

/// Top-level configuration of the bootstrap orchestrator.
#[derive(Clone, DataSize, Debug, Deserialize, Serialize)]
pub struct BootstrapConfig {
    /// Epoch-anchor locator tuning.
    pub anchor: AnchorLocatorConfig,
    /// Object resolver tuning.
    pub resolver: ResolverConfig,
    /// State-trie syncer tuning.
    pub trie: TrieSyncConfig,
    /// Pending mini-block syncer tuning.
    pub pending: PendingSyncConfig,
    /// Timeout for resolving the headers referenced by an anchor block.
    pub header_resolve_timeout: TimeDiff,
    /// Maximum age, in rounds, of a bootstrap record the resume-from-storage
    /// path will still accept.
    pub resume_grace_rounds: u64,
    /// The shard to rejoin as an observer when the node's key turns out to be
    /// shuffled out of every eligible and waiting set.
    pub destination_shard_as_observer: ShardId,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            anchor: AnchorLocatorConfig::default(),
            resolver: ResolverConfig::default(),
            trie: TrieSyncConfig::default(),
            pending: PendingSyncConfig::default(),
            header_resolve_timeout: TimeDiff::from_str(DEFAULT_HEADER_RESOLVE_TIMEOUT).unwrap(),
            resume_grace_rounds: DEFAULT_RESUME_GRACE_ROUNDS,
            destination_shard_as_observer: ShardId::new(0),
        }
    }
}
