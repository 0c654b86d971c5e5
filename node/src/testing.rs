//! Shared test scaffolding: a scripted in-process network, fixture builders
//! and simple collaborator doubles.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use rand::{rngs::StdRng, Rng};

use shardnet_hashing::Digest;
use shardnet_types::{
    AnchorBlock, BlockHash, DecodedPayload, EpochAssignment, EpochId, GenesisConfig, MiniBlock,
    MiniBlockHash, MiniBlockHeader, ShardAnchorEntry, ShardHeader, ShardId, TimeDiff, Timestamp,
    TrieNode, ValidatorKey, BRANCH_WIDTH,
};

use crate::{
    components::assignment::{ShuffleError, ValidatorShuffler},
    network::{NetworkService, NodeId, PayloadHandler, Topic},
    storage::{KeyValueStore, MemStore, StoreError, Unit},
};

/// The peer identifier the scripted network serves objects from.
const SERVER_PEER: NodeId = NodeId::new(0xFEED);

/// An in-process [`NetworkService`] with scripted responses.
///
/// Objects registered through [`TestNetwork::serve`] are delivered inline on
/// [`Topic::Objects`] whenever they are requested by hash; anchors registered
/// through [`TestNetwork::gossip_on_request`] are delivered on
/// [`Topic::AnchorBlocks`] from a configurable number of distinct peers
/// whenever an anchor request is broadcast.
pub(crate) struct TestNetwork {
    connected: AtomicUsize,
    handlers: Mutex<HashMap<Topic, Vec<Arc<dyn PayloadHandler>>>>,
    /// Encoded objects by content hash, served on request.
    served: Mutex<HashMap<Digest, Vec<u8>>>,
    /// Encoded anchors gossiped in response to anchor requests, with the
    /// number of peers echoing each.
    anchor_responses: Mutex<Vec<(Vec<u8>, u64)>>,
    requests: AtomicUsize,
    broadcasts: Mutex<HashMap<Topic, usize>>,
}

impl TestNetwork {
    pub(crate) fn new(connected: usize) -> TestNetwork {
        TestNetwork {
            connected: AtomicUsize::new(connected),
            handlers: Mutex::new(HashMap::new()),
            served: Mutex::new(HashMap::new()),
            anchor_responses: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
            broadcasts: Mutex::new(HashMap::new()),
        }
    }

    /// Scripts an object to be served whenever its hash is requested.
    pub(crate) fn serve(&self, payload: DecodedPayload) {
        let hash = payload.content_hash();
        self.served
            .lock()
            .expect("lock poisoned")
            .insert(hash, payload.encode());
    }

    /// Scripts `peers` distinct peers to gossip `payload` on
    /// [`Topic::AnchorBlocks`] after every anchor-request broadcast.
    pub(crate) fn gossip_on_request(&self, payload: DecodedPayload, peers: u64) {
        self.anchor_responses
            .lock()
            .expect("lock poisoned")
            .push((payload.encode(), peers));
    }

    /// Delivers raw bytes to every handler registered for `topic`.
    pub(crate) fn deliver(&self, topic: Topic, sender: NodeId, payload: &[u8]) {
        let handlers: Vec<Arc<dyn PayloadHandler>> = self
            .handlers
            .lock()
            .expect("lock poisoned")
            .get(&topic)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler.handle(sender, payload);
        }
    }

    /// Total number of by-hash requests seen.
    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of broadcasts seen on a topic.
    pub(crate) fn broadcast_count(&self, topic: Topic) -> usize {
        *self
            .broadcasts
            .lock()
            .expect("lock poisoned")
            .get(&topic)
            .unwrap_or(&0)
    }
}

impl NetworkService for TestNetwork {
    fn broadcast(&self, topic: Topic, _payload: Vec<u8>) {
        *self
            .broadcasts
            .lock()
            .expect("lock poisoned")
            .entry(topic)
            .or_insert(0) += 1;
        if topic == Topic::AnchorRequests {
            let responses: Vec<(Vec<u8>, u64)> = self
                .anchor_responses
                .lock()
                .expect("lock poisoned")
                .clone();
            for (bytes, peers) in responses {
                for peer in 1..=peers {
                    self.deliver(Topic::AnchorBlocks, NodeId::new(peer), &bytes);
                }
            }
        }
    }

    fn request_by_hash(&self, _shard: ShardId, hash: Digest) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .served
            .lock()
            .expect("lock poisoned")
            .get(&hash)
            .cloned();
        if let Some(bytes) = bytes {
            self.deliver(Topic::Objects, SERVER_PEER, &bytes);
        }
    }

    fn register_handler(&self, topic: Topic, handler: Arc<dyn PayloadHandler>) {
        self.handlers
            .lock()
            .expect("lock poisoned")
            .entry(topic)
            .or_default()
            .push(handler);
    }

    fn connected_peer_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A storage engine that fails every operation on one unit and passes the
/// rest through to an in-memory store.
pub(crate) struct FailingStore {
    inner: MemStore,
    failing: Unit,
}

impl FailingStore {
    pub(crate) fn failing_unit(failing: Unit) -> FailingStore {
        FailingStore {
            inner: MemStore::new(),
            failing,
        }
    }

    fn check(&self, unit: Unit) -> Result<(), StoreError> {
        if unit == self.failing {
            Err(StoreError::Engine {
                unit,
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl KeyValueStore for FailingStore {
    fn put(&self, unit: Unit, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.check(unit)?;
        self.inner.put(unit, key, value)
    }

    fn get(&self, unit: Unit, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(unit)?;
        self.inner.get(unit, key)
    }

    fn has(&self, unit: Unit, key: &[u8]) -> Result<bool, StoreError> {
        self.check(unit)?;
        self.inner.has(unit, key)
    }
}

/// A deterministic shuffle rotating each genesis shard's validators by the
/// epoch number; good enough for exercising assignment-dependent paths.
pub(crate) struct RotatingShuffler;

impl ValidatorShuffler for RotatingShuffler {
    fn derive_assignment(
        &self,
        genesis: &GenesisConfig,
        current: &AnchorBlock,
        _previous: &AnchorBlock,
    ) -> Result<EpochAssignment, ShuffleError> {
        if genesis.num_shards == 0 {
            return Err(ShuffleError("genesis configures no shards".to_string()));
        }
        let shift = current.epoch.value();
        let mut eligible = BTreeMap::new();
        for (shard, keys) in &genesis.validators {
            let target = if shard.is_metachain() {
                *shard
            } else {
                ShardId::new((shard.value() + shift) % genesis.num_shards)
            };
            eligible.insert(target, keys.clone());
        }
        Ok(EpochAssignment {
            epoch: current.epoch,
            eligible,
            waiting: BTreeMap::new(),
        })
    }
}

pub(crate) fn random_digest(rng: &mut StdRng) -> Digest {
    Digest::hash(rng.gen::<[u8; 16]>())
}

fn random_key(rng: &mut StdRng) -> ValidatorKey {
    ValidatorKey::new(rng.gen())
}

/// Builds a genesis configuration with `validators_per_shard` keys on each
/// user shard and the metachain, 100ms rounds and 100 rounds per epoch.
pub(crate) fn sample_genesis(
    rng: &mut StdRng,
    num_shards: u32,
    validators_per_shard: usize,
) -> GenesisConfig {
    let mut validators = BTreeMap::new();
    for shard_value in 0..num_shards {
        let keys = (0..validators_per_shard).map(|_| random_key(rng)).collect();
        validators.insert(ShardId::new(shard_value), keys);
    }
    let metachain_keys = (0..validators_per_shard).map(|_| random_key(rng)).collect();
    validators.insert(ShardId::METACHAIN, metachain_keys);
    GenesisConfig {
        start_time: Timestamp::from_millis(1_700_000_000_000),
        round_duration: TimeDiff::from_millis(100),
        rounds_per_epoch: 100,
        num_shards,
        validators,
    }
}

/// Builds an assignment with two random keys per shard.
pub(crate) fn sample_assignment(
    rng: &mut StdRng,
    epoch: EpochId,
    num_shards: u32,
) -> EpochAssignment {
    let mut eligible = BTreeMap::new();
    for shard_value in 0..num_shards {
        let keys = vec![random_key(rng), random_key(rng)];
        eligible.insert(ShardId::new(shard_value), keys);
    }
    eligible.insert(ShardId::METACHAIN, vec![random_key(rng)]);
    let mut waiting = BTreeMap::new();
    waiting.insert(ShardId::new(0), vec![random_key(rng)]);
    EpochAssignment {
        epoch,
        eligible,
        waiting,
    }
}

/// Builds a random trie of the given depth; every node is reachable from the
/// returned root.
pub(crate) fn sample_trie(
    rng: &mut StdRng,
    depth: usize,
) -> (Digest, BTreeMap<Digest, TrieNode>) {
    let mut nodes = BTreeMap::new();
    let root = build_subtree(rng, depth, &mut nodes);
    (root, nodes)
}

fn build_subtree(rng: &mut StdRng, depth: usize, nodes: &mut BTreeMap<Digest, TrieNode>) -> Digest {
    let node = if depth == 0 {
        TrieNode::Leaf {
            path: vec![rng.gen()],
            value: rng.gen::<[u8; 8]>().to_vec(),
        }
    } else {
        // Two children in distinct halves of the branch, so no slot is ever
        // overwritten and every generated node stays reachable.
        let mut children = [None; BRANCH_WIDTH];
        children[rng.gen_range(0..BRANCH_WIDTH / 2)] = Some(build_subtree(rng, depth - 1, nodes));
        children[BRANCH_WIDTH / 2 + rng.gen_range(0..BRANCH_WIDTH / 2)] =
            Some(build_subtree(rng, depth - 1, nodes));
        TrieNode::Branch { children }
    };
    let hash = node.node_hash();
    nodes.insert(hash, node);
    hash
}

/// A consistent set of objects describing one epoch boundary: the anchor,
/// its predecessor, the per-shard last headers, the pending mini-block
/// bodies and (optionally) the referenced state tries.
pub(crate) struct EpochFixture {
    pub anchor: AnchorBlock,
    pub prev_anchor: AnchorBlock,
    pub headers: BTreeMap<ShardId, ShardHeader>,
    pub mini_blocks: BTreeMap<MiniBlockHash, MiniBlock>,
    pub trie_nodes: BTreeMap<Digest, TrieNode>,
}

/// Builds an epoch fixture whose state roots are all the empty trie.
pub(crate) fn sample_epoch(rng: &mut StdRng, epoch: EpochId, num_shards: u32) -> EpochFixture {
    sample_epoch_inner(rng, epoch, num_shards, false)
}

/// Builds an epoch fixture with real state tries behind every root.
pub(crate) fn sample_epoch_with_tries(
    rng: &mut StdRng,
    epoch: EpochId,
    num_shards: u32,
) -> EpochFixture {
    sample_epoch_inner(rng, epoch, num_shards, true)
}

/// Convenience: just the anchor of a fresh epoch fixture.
pub(crate) fn sample_anchor(rng: &mut StdRng, epoch: EpochId, num_shards: u32) -> AnchorBlock {
    sample_epoch(rng, epoch, num_shards).anchor
}

fn sample_epoch_inner(
    rng: &mut StdRng,
    epoch: EpochId,
    num_shards: u32,
    with_tries: bool,
) -> EpochFixture {
    let round = epoch.value() as u64 * 100;
    let prev_anchor = AnchorBlock {
        epoch: epoch.predecessor().unwrap_or_default(),
        round: round.saturating_sub(100),
        prev_anchor_hash: BlockHash::new(random_digest(rng)),
        validator_stats_root: Digest::default(),
        shard_entries: Vec::new(),
    };

    let mut trie_nodes = BTreeMap::new();
    let mut trie_root = |rng: &mut StdRng, trie_nodes: &mut BTreeMap<Digest, TrieNode>| {
        if with_tries {
            let (root, nodes) = sample_trie(rng, 2);
            trie_nodes.extend(nodes);
            root
        } else {
            Digest::default()
        }
    };
    let validator_stats_root = trie_root(rng, &mut trie_nodes);

    let mut headers = BTreeMap::new();
    let mut mini_blocks = BTreeMap::new();
    let mut shard_entries = Vec::new();
    for shard_value in 0..num_shards {
        let shard = ShardId::new(shard_value);
        let state_root = trie_root(rng, &mut trie_nodes);
        let header = ShardHeader {
            shard,
            nonce: 40 + shard_value as u64,
            round: round.saturating_sub(1),
            epoch,
            prev_hash: BlockHash::new(random_digest(rng)),
            state_root,
        };
        let pending_mini_blocks = (0..2)
            .map(|_| {
                let body = MiniBlock {
                    sender_shard: shard,
                    receiver_shard: ShardId::new((shard_value + 1) % num_shards),
                    tx_hashes: vec![random_digest(rng), random_digest(rng)],
                };
                let summary = MiniBlockHeader {
                    hash: body.hash(),
                    sender_shard: body.sender_shard,
                    receiver_shard: body.receiver_shard,
                    tx_count: body.tx_hashes.len() as u32,
                };
                mini_blocks.insert(body.hash(), body);
                summary
            })
            .collect();
        shard_entries.push(ShardAnchorEntry {
            shard,
            header_hash: header.hash(),
            nonce: header.nonce,
            round: header.round,
            state_root,
            pending_mini_blocks,
        });
        headers.insert(shard, header);
    }

    let anchor = AnchorBlock {
        epoch,
        round,
        prev_anchor_hash: prev_anchor.hash(),
        validator_stats_root,
        shard_entries,
    };
    EpochFixture {
        anchor,
        prev_anchor,
        headers,
        mini_blocks,
        trie_nodes,
    }
}
