//! # Shardnet bootstrap subsystem
//!
//! Everything a late-joining shardnet node needs to catch up with the running
//! network: locating the current epoch's anchor block by peer quorum, syncing
//! the headers, state tries and pending cross-shard mini-blocks it references,
//! re-deriving the validator-to-shard assignment, and handing the assembled
//! state off to persistent storage.
//!
//! ## Structure
//!
//! The [`components::bootstrapper::Bootstrapper`] is the entry point; it owns
//! the other components and drives one of three bootstrap paths (genesis,
//! resume from storage, full network sync) to completion.  The network and
//! storage engines are consumed behind the [`network::NetworkService`] and
//! [`storage::KeyValueStore`] traits.

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]

pub mod components;
pub mod config;
pub mod logging;
pub mod network;
pub mod pool;
pub mod storage;
#[cfg(test)]
pub(crate) mod testing;
pub mod utils;

pub use components::bootstrapper::{BootstrapError, BootstrapPath, BootstrapTarget, Bootstrapper};
pub use config::BootstrapConfig;
