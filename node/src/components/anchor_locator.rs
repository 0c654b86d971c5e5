//! Epoch-anchor locator.
//!
//! A late joiner does not know the current epoch, so it asks the network:
//! broadcast a request, collect the anchor blocks peers gossip back, and
//! confirm the candidate that a configured fraction of connected peers agree
//! on.  Peer votes are keyed by the anchor's content hash; a peer voting
//! twice for the same candidate is counted once, and a peer that sends an
//! undecodable reply is remembered and ignored for the rest of the run.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use num_rational::Ratio;
use thiserror::Error;
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, info, warn};

use shardnet_types::{AnchorBlock, BlockHash, DecodedPayload};

use crate::{
    config::AnchorLocatorConfig,
    network::{NetworkService, NodeId, PayloadHandler, Topic},
};

/// Error returned by [`AnchorLocator::locate`].
#[derive(Debug, Error)]
pub enum LocateError {
    /// No candidate gathered enough peer votes within the retry budget.
    #[error(
        "no anchor reached quorum after {attempts} attempts: best candidate had \
         {best_reporters} of {connected} connected peers behind it"
    )]
    QuorumNotReached {
        /// Number of broadcast-and-wait windows spent.
        attempts: u32,
        /// Vote count of the best candidate seen.
        best_reporters: usize,
        /// Connected peer count at the final check.
        connected: usize,
    },
}

#[derive(Debug, Default)]
struct LocatorState {
    /// Whether a `locate` call is currently collecting votes.
    active: bool,
    /// Votes per candidate hash; a `HashSet` so repeat votes are no-ops.
    votes: HashMap<BlockHash, HashSet<NodeId>>,
    /// The candidate anchors themselves, by hash.
    candidates: HashMap<BlockHash, AnchorBlock>,
    /// Set once a candidate reaches quorum.
    confirmed: Option<AnchorBlock>,
    /// Peers that sent garbage; their votes no longer count.
    bad_peers: HashSet<NodeId>,
}

/// Confirms the current epoch's anchor block by peer quorum.
pub struct AnchorLocator {
    network: Arc<dyn NetworkService>,
    config: AnchorLocatorConfig,
    state: Mutex<LocatorState>,
    notify: Notify,
}

impl AnchorLocator {
    /// Creates the locator and registers its handler on
    /// [`Topic::AnchorBlocks`].
    pub fn new(network: Arc<dyn NetworkService>, config: AnchorLocatorConfig) -> Arc<Self> {
        let locator = Arc::new(AnchorLocator {
            network: network.clone(),
            config,
            state: Mutex::new(LocatorState::default()),
            notify: Notify::new(),
        });
        network.register_handler(Topic::AnchorBlocks, locator.clone());
        locator
    }

    /// Broadcasts anchor requests and waits until one candidate is backed by
    /// at least `threshold` of the connected peers.
    ///
    /// Each attempt re-broadcasts the request and waits `wait_window`; after
    /// `max_retries` attempts without quorum the whole bootstrap fails.
    pub async fn locate(&self) -> Result<AnchorBlock, LocateError> {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.active = true;
            state.votes.clear();
            state.candidates.clear();
            state.confirmed = None;
        }

        let wait_window = Duration::from(self.config.wait_window);
        for attempt in 1..=self.config.max_retries {
            debug!(attempt, "broadcasting anchor request");
            self.network.broadcast(Topic::AnchorRequests, Vec::new());

            let deadline = Instant::now() + wait_window;
            loop {
                let notified = self.notify.notified();
                if let Some(anchor) = self.take_confirmed() {
                    info!(%anchor, attempt, "anchor confirmed by quorum");
                    return Ok(anchor);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let _ = tokio::time::timeout(deadline - now, notified).await;
            }
            warn!(
                attempt,
                max_retries = self.config.max_retries,
                "anchor wait window elapsed without quorum"
            );
        }

        let mut state = self.state.lock().expect("lock poisoned");
        state.active = false;
        let best_reporters = state
            .votes
            .values()
            .map(HashSet::len)
            .max()
            .unwrap_or(0);
        state.votes.clear();
        state.candidates.clear();
        Err(LocateError::QuorumNotReached {
            attempts: self.config.max_retries,
            best_reporters,
            connected: self.network.connected_peer_count(),
        })
    }

    /// Takes the confirmed anchor out of the state, deactivating collection.
    fn take_confirmed(&self) -> Option<AnchorBlock> {
        let mut state = self.state.lock().expect("lock poisoned");
        let anchor = state.confirmed.take()?;
        state.active = false;
        state.votes.clear();
        state.candidates.clear();
        Some(anchor)
    }

    fn quorum_reached(&self, reporters: usize, connected: usize) -> bool {
        if connected == 0 {
            return false;
        }
        Ratio::new(reporters as u64, connected as u64) >= self.config.threshold
    }
}

impl PayloadHandler for AnchorLocator {
    fn handle(&self, sender: NodeId, payload: &[u8]) {
        let anchor = match DecodedPayload::decode(payload) {
            Ok(DecodedPayload::AnchorBlock(anchor)) => anchor,
            Ok(other) => {
                warn!(%sender, kind = %other.tag(), "non-anchor payload on anchor topic");
                self.state
                    .lock()
                    .expect("lock poisoned")
                    .bad_peers
                    .insert(sender);
                return;
            }
            Err(error) => {
                warn!(%sender, %error, "undecodable anchor payload");
                self.state
                    .lock()
                    .expect("lock poisoned")
                    .bad_peers
                    .insert(sender);
                return;
            }
        };

        let mut state = self.state.lock().expect("lock poisoned");
        if !state.active || state.confirmed.is_some() {
            return;
        }
        if state.bad_peers.contains(&sender) {
            debug!(%sender, "ignoring anchor vote from known-bad peer");
            return;
        }

        let hash = anchor.hash();
        state.candidates.entry(hash).or_insert(anchor);
        let newly_counted = state.votes.entry(hash).or_default().insert(sender);
        if !newly_counted {
            return;
        }

        let reporters = state.votes[&hash].len();
        let connected = self.network.connected_peer_count();
        if self.quorum_reached(reporters, connected) {
            debug!(%hash, reporters, connected, "anchor candidate reached quorum");
            let confirmed = state.candidates.get(&hash).cloned();
            state.confirmed = confirmed;
            self.notify.notify_waiters();
        }
    }
}
