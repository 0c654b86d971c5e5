//! The tagged payload type the network boundary decodes gossip and response
//! bytes into.
//!
//! Decoding happens exactly once, at the edge; everything behind the boundary
//! matches on [`DecodedPayload`] instead of probing with runtime casts.

use std::fmt::{self, Display, Formatter};

use datasize::DataSize;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

use shardnet_hashing::Digest;

use crate::{AnchorBlock, MiniBlock, ShardHeader, TrieNode};

/// An identifier for the kind of object carried in a [`DecodedPayload`].
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize_repr, Deserialize_repr, Debug,
    DataSize,
)]
#[repr(u8)]
pub enum Tag {
    /// An epoch-start anchor block.
    AnchorBlock,
    /// A regular shard block header.
    ShardHeader,
    /// A cross-shard mini-block.
    MiniBlock,
    /// A state-trie node.
    TrieNode,
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Tag::AnchorBlock => write!(f, "anchor block"),
            Tag::ShardHeader => write!(f, "shard header"),
            Tag::MiniBlock => write!(f, "mini-block"),
            Tag::TrieNode => write!(f, "trie node"),
        }
    }
}

/// An error decoding network bytes into a [`DecodedPayload`].
#[derive(Debug, Error)]
#[error("could not decode payload: {0}")]
pub struct PayloadError(#[from] bincode::Error);

/// An object received from the network, decoded into its concrete shape.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug, DataSize)]
pub enum DecodedPayload {
    /// An epoch-start anchor block.
    AnchorBlock(AnchorBlock),
    /// A regular shard block header.
    ShardHeader(ShardHeader),
    /// A cross-shard mini-block.
    MiniBlock(MiniBlock),
    /// A state-trie node.
    TrieNode(TrieNode),
}

impl DecodedPayload {
    /// Decodes a payload from its wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<DecodedPayload, PayloadError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Encodes the payload into its wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        crate::serialize(self)
    }

    /// Returns the tag identifying the payload kind.
    pub fn tag(&self) -> Tag {
        match self {
            DecodedPayload::AnchorBlock(_) => Tag::AnchorBlock,
            DecodedPayload::ShardHeader(_) => Tag::ShardHeader,
            DecodedPayload::MiniBlock(_) => Tag::MiniBlock,
            DecodedPayload::TrieNode(_) => Tag::TrieNode,
        }
    }

    /// Returns the content hash of the carried object.
    ///
    /// This is the digest of the object itself, not of the payload envelope,
    /// so it matches the hash the object was requested under.
    pub fn content_hash(&self) -> Digest {
        match self {
            DecodedPayload::AnchorBlock(anchor) => *anchor.hash().inner(),
            DecodedPayload::ShardHeader(header) => *header.hash().inner(),
            DecodedPayload::MiniBlock(mini_block) => *mini_block.hash().inner(),
            DecodedPayload::TrieNode(node) => node.node_hash(),
        }
    }
}

impl Display for DecodedPayload {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} {}", self.tag(), self.content_hash())
    }
}

#[cfg(test)]
mod tests {
    use shardnet_hashing::Digest;

    use super::{DecodedPayload, Tag};
    use crate::{MiniBlock, ShardId};

    #[test]
    fn decode_round_trip_preserves_content_hash() {
        let mini_block = MiniBlock {
            sender_shard: ShardId::new(0),
            receiver_shard: ShardId::new(1),
            tx_hashes: vec![Digest::hash(b"tx")],
        };
        let expected_hash = *mini_block.hash().inner();
        let payload = DecodedPayload::MiniBlock(mini_block);
        assert_eq!(payload.tag(), Tag::MiniBlock);
        assert_eq!(payload.content_hash(), expected_hash);

        let decoded = DecodedPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(decoded.content_hash(), expected_hash);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(DecodedPayload::decode(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
