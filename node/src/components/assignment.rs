//! Validator-assignment resolver.
//!
//! A bootstrap cannot trust a downloaded validator-to-shard mapping, so the
//! assignment for the target epoch is re-derived locally from the data the
//! preceding components verified: the genesis validator sets and the current
//! and previous anchor blocks.  The shuffle itself is consensus-defined and
//! consumed behind the [`ValidatorShuffler`] trait.

use thiserror::Error;
use tracing::info;

use shardnet_types::{AnchorBlock, EpochAssignment, EpochId, GenesisConfig, ShardId, ValidatorKey};

/// Error produced by a [`ValidatorShuffler`] implementation.
#[derive(Debug, Error)]
#[error("shuffling failed: {0}")]
pub struct ShuffleError(pub String);

/// The consensus-defined deterministic shuffle deriving an epoch's
/// validator-to-shard assignment.
///
/// Implementations must be pure functions of their inputs: every honest node
/// derives the identical assignment from the same anchors.
pub trait ValidatorShuffler: Send + Sync {
    /// Derives the assignment for the epoch started by `current`.
    fn derive_assignment(
        &self,
        genesis: &GenesisConfig,
        current: &AnchorBlock,
        previous: &AnchorBlock,
    ) -> Result<EpochAssignment, ShuffleError>;
}

/// Error returned by [`resolve_assignment`].
#[derive(Debug, Error)]
pub enum AssignmentError {
    /// The shuffler rejected its inputs.
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),
    /// The shuffler produced an assignment for a different epoch.
    #[error("derived assignment is for {derived}, expected {expected}")]
    EpochMismatch { expected: EpochId, derived: EpochId },
}

/// The outcome of resolving the local node's place in an epoch.
#[derive(Clone, Debug)]
pub struct NodeShardAssignment {
    /// The full derived assignment for the epoch.
    pub assignment: EpochAssignment,
    /// The shard this node will sync and join.
    pub own_shard: ShardId,
    /// `true` if the node's key is absent from the assignment and it joins
    /// `own_shard` as an observer instead.
    pub shuffled_out: bool,
}

/// Derives the target epoch's assignment and locates the local key in it.
///
/// A key absent from the derived assignment does not fail the bootstrap: the
/// node continues as an observer of the configured destination shard.
pub fn resolve_assignment(
    shuffler: &dyn ValidatorShuffler,
    genesis: &GenesisConfig,
    current: &AnchorBlock,
    previous: &AnchorBlock,
    own_key: &ValidatorKey,
    observer_destination: ShardId,
) -> Result<NodeShardAssignment, AssignmentError> {
    let assignment = shuffler.derive_assignment(genesis, current, previous)?;
    if assignment.epoch != current.epoch {
        return Err(AssignmentError::EpochMismatch {
            expected: current.epoch,
            derived: assignment.epoch,
        });
    }

    match assignment.shard_of(own_key) {
        Some(own_shard) => {
            info!(key = %own_key, %own_shard, epoch = %assignment.epoch, "validator assigned");
            Ok(NodeShardAssignment {
                assignment,
                own_shard,
                shuffled_out: false,
            })
        }
        None => {
            info!(
                key = %own_key,
                destination = %observer_destination,
                epoch = %assignment.epoch,
                "key not in the epoch's assignment, joining as observer"
            );
            Ok(NodeShardAssignment {
                assignment,
                own_shard: observer_destination,
                shuffled_out: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::testing::{self, RotatingShuffler};

    #[test]
    fn assigned_key_gets_its_shard() {
        let mut rng = StdRng::seed_from_u64(0x5109);
        let genesis = testing::sample_genesis(&mut rng, 2, 3);
        let fixture = testing::sample_epoch(&mut rng, EpochId::new(3), 2);
        let shuffler = RotatingShuffler;

        let expected = shuffler
            .derive_assignment(&genesis, &fixture.anchor, &fixture.prev_anchor)
            .unwrap();
        let own_key = expected.eligible[&ShardId::new(1)][0];

        let resolved = resolve_assignment(
            &shuffler,
            &genesis,
            &fixture.anchor,
            &fixture.prev_anchor,
            &own_key,
            ShardId::new(0),
        )
        .expect("shuffle succeeds");
        assert_eq!(resolved.own_shard, ShardId::new(1));
        assert!(!resolved.shuffled_out);
        assert_eq!(resolved.assignment, expected);
    }

    #[test]
    fn shuffled_out_key_becomes_an_observer() {
        let mut rng = StdRng::seed_from_u64(0x510A);
        let genesis = testing::sample_genesis(&mut rng, 2, 3);
        let fixture = testing::sample_epoch(&mut rng, EpochId::new(3), 2);

        let unknown_key = ValidatorKey::new([0xEE; ValidatorKey::LENGTH]);
        let resolved = resolve_assignment(
            &RotatingShuffler,
            &genesis,
            &fixture.anchor,
            &fixture.prev_anchor,
            &unknown_key,
            ShardId::new(1),
        )
        .expect("shuffle succeeds even for unknown keys");
        assert_eq!(resolved.own_shard, ShardId::new(1));
        assert!(resolved.shuffled_out);
    }

    #[test]
    fn wrong_epoch_from_the_shuffler_is_rejected() {
        struct WrongEpochShuffler;
        impl ValidatorShuffler for WrongEpochShuffler {
            fn derive_assignment(
                &self,
                genesis: &GenesisConfig,
                _current: &AnchorBlock,
                _previous: &AnchorBlock,
            ) -> Result<EpochAssignment, ShuffleError> {
                Ok(genesis.initial_assignment())
            }
        }

        let mut rng = StdRng::seed_from_u64(0x510B);
        let genesis = testing::sample_genesis(&mut rng, 2, 3);
        let fixture = testing::sample_epoch(&mut rng, EpochId::new(3), 2);
        let own_key = genesis.validators[&ShardId::new(0)][0];

        let error = resolve_assignment(
            &WrongEpochShuffler,
            &genesis,
            &fixture.anchor,
            &fixture.prev_anchor,
            &own_key,
            ShardId::new(0),
        )
        .expect_err("assignment is for epoch 0, not 3");
        assert!(matches!(error, AssignmentError::EpochMismatch { .. }));
    }
}
