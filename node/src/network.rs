//! The boundary to the peer-to-peer layer.
//!
//! The bootstrap subsystem does not define wire framing or transport; it only
//! consumes the small surface below.  Delivery is at-least-once: handlers
//! must tolerate duplicated and arbitrarily interleaved messages.

use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use shardnet_hashing::Digest;
use shardnet_types::ShardId;

/// The network identifier for a peer.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, DataSize,
)]
pub struct NodeId(u64);

impl NodeId {
    /// Returns a new `NodeId`.
    pub const fn new(value: u64) -> NodeId {
        NodeId(value)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "node-{:x}", self.0)
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "NodeId({:x})", self.0)
    }
}

/// A pub/sub topic of the gossip layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, DataSize)]
pub enum Topic {
    /// Gossiped epoch-start anchor blocks.
    AnchorBlocks,
    /// Requests for the current epoch's anchor block.
    AnchorRequests,
    /// Objects served in response to by-hash requests.
    Objects,
}

impl Topic {
    /// Returns the topic's wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::AnchorBlocks => "anchor_blocks",
            Topic::AnchorRequests => "anchor_requests",
            Topic::Objects => "objects",
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A callback invoked by the network layer for every payload received on a
/// registered topic.
///
/// Called from the network's receive path; implementations must be cheap and
/// must not block.
pub trait PayloadHandler: Send + Sync {
    /// Handles a single received payload.
    fn handle(&self, sender: NodeId, payload: &[u8]);
}

/// The consumed network collaborator.
pub trait NetworkService: Send + Sync {
    /// Broadcasts a payload on a gossip topic.
    fn broadcast(&self, topic: Topic, payload: Vec<u8>);

    /// Asks the network to fetch the object with the given hash from peers of
    /// the owning shard.  Responses arrive on [`Topic::Objects`].
    fn request_by_hash(&self, shard: ShardId, hash: Digest);

    /// Registers a receive callback for a topic.
    fn register_handler(&self, topic: Topic, handler: Arc<dyn PayloadHandler>);

    /// Returns the number of currently connected peers.
    fn connected_peer_count(&self) -> usize;
}
