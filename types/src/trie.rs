//! Merkle state-trie nodes and in-memory snapshots.
//!
//! Nodes are content-addressed: a node's identifier is the digest of its
//! canonical encoding, so child references are digests and a fully resolved
//! trie is self-verifying.

use std::collections::{BTreeMap, HashSet};

use datasize::DataSize;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shardnet_hashing::Digest;

use crate::content_digest;

/// The number of children of a branch node (one per hex nibble).
pub const BRANCH_WIDTH: usize = 16;

/// A single node of a Merkle state trie.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub enum TrieNode {
    /// A terminal node holding a serialized account.
    Leaf {
        /// Remaining key path below the parent.
        path: Vec<u8>,
        /// Serialized account state.
        value: Vec<u8>,
    },
    /// A node compressing a shared key path down to a single child.
    Extension {
        /// The compressed key path.
        path: Vec<u8>,
        /// The single child node.
        child: Digest,
    },
    /// A node with up to [`BRANCH_WIDTH`] children, indexed by nibble.
    Branch {
        /// Child references; `None` for absent nibbles.
        children: [Option<Digest>; BRANCH_WIDTH],
    },
}

impl TrieNode {
    /// Returns the content hash identifying this node.
    pub fn node_hash(&self) -> Digest {
        content_digest(self)
    }

    /// Returns the hashes of all child nodes referenced by this node.
    pub fn children(&self) -> Vec<Digest> {
        match self {
            TrieNode::Leaf { .. } => Vec::new(),
            TrieNode::Extension { child, .. } => vec![*child],
            TrieNode::Branch { children } => children.iter().flatten().copied().collect(),
        }
    }
}

/// An error found while verifying a [`TrieSnapshot`].
#[derive(Debug, Error)]
pub enum TrieVerifyError {
    /// The root node is not part of the snapshot.
    #[error("snapshot is missing its root node {root:?}")]
    MissingRoot {
        /// The requested root hash.
        root: Digest,
    },
    /// A node referenced a child that is not part of the snapshot.
    #[error("node {parent:?} references missing child {child:?}")]
    MissingChild {
        /// The referencing node.
        parent: Digest,
        /// The absent child.
        child: Digest,
    },
    /// A stored node's recomputed hash differs from the key it is stored
    /// under.
    #[error("node stored under {stored:?} hashes to {computed:?}")]
    HashMismatch {
        /// The key the node is stored under.
        stored: Digest,
        /// The recomputed content hash.
        computed: Digest,
    },
}

/// An in-memory reconstruction of a Merkle trie rooted at a specific hash.
///
/// Only ever handed to callers after [`TrieSnapshot::verify`] has passed; a
/// snapshot failing verification is discarded by the syncer.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub struct TrieSnapshot {
    root: Digest,
    nodes: BTreeMap<Digest, TrieNode>,
}

impl TrieSnapshot {
    /// Creates a snapshot from a root hash and the set of materialized nodes.
    pub fn new(root: Digest, nodes: BTreeMap<Digest, TrieNode>) -> TrieSnapshot {
        TrieSnapshot { root, nodes }
    }

    /// Creates the snapshot of an empty trie (all-zeros root).
    pub fn empty() -> TrieSnapshot {
        TrieSnapshot {
            root: Digest::default(),
            nodes: BTreeMap::new(),
        }
    }

    /// Returns the root hash the snapshot was built for.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Returns the node stored under the given hash.
    pub fn node(&self, hash: &Digest) -> Option<&TrieNode> {
        self.nodes.get(hash)
    }

    /// Returns the number of materialized nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the snapshot holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all `(hash, node)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &TrieNode)> {
        self.nodes.iter()
    }

    /// Verifies the snapshot against its root hash.
    ///
    /// Walks the trie from the root, recomputing every visited node's hash
    /// and checking that every referenced child is materialized.  A snapshot
    /// with the all-zeros root is the empty trie and trivially valid.
    pub fn verify(&self) -> Result<(), TrieVerifyError> {
        if self.root.is_zero() {
            return Ok(());
        }
        if !self.nodes.contains_key(&self.root) {
            return Err(TrieVerifyError::MissingRoot { root: self.root });
        }

        let mut visited: HashSet<Digest> = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(hash) = stack.pop() {
            if !visited.insert(hash) {
                continue;
            }
            let node = match self.nodes.get(&hash) {
                Some(node) => node,
                // Only reachable for children; the root was checked above.
                None => unreachable!("children are checked before being pushed"),
            };
            let computed = node.node_hash();
            if computed != hash {
                return Err(TrieVerifyError::HashMismatch {
                    stored: hash,
                    computed,
                });
            }
            for child in node.children() {
                if !self.nodes.contains_key(&child) {
                    return Err(TrieVerifyError::MissingChild {
                        parent: hash,
                        child,
                    });
                }
                stack.push(child);
            }
        }
        Ok(())
    }
}
