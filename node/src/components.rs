//! Components of the bootstrap subsystem.
//!
//! The [`bootstrapper`](crate::components::bootstrapper) orchestrates the
//! rest: the anchor locator confirms the epoch's anchor block, the header,
//! trie and pending-block syncers resolve everything the anchor references
//! (all through the shared object [`resolver`](crate::components::resolver)),
//! the assignment resolver re-derives the validator-to-shard mapping, and the
//! hand-off writer persists the assembled bundle.

pub mod anchor_locator;
pub mod assignment;
pub mod bootstrapper;
pub mod handoff;
pub mod header_sync;
pub mod metrics;
pub mod pending_blocks;
pub mod resolver;
pub mod trie_sync;
