// Content-corruption deviations: additional or transposed shards with
// exactly one axis of correctness deliberately broken, every other axis
// kept valid so tests isolate a single validation rule.

use async_trait::async_trait;
use futures::future::try_join;
use log::{debug, warn};

use fray_common::{
    crypto::Signature,
    shard::{compute_commitment, DataShard},
};

use crate::{
    mutator::{mutate_shard, ShardOverrides},
    net::{BroadcastArtifact, PeerBroadcaster},
};

use super::{DeviationStrategy, SlotArtifacts, SlotContext, SlotOutcome, StrategyError};

/// Inject one additional shard for index 0 alongside the legitimate set.
///
/// By default every axis of the extra shard that gossip inspects is valid:
/// index in range, commitment matching its own blob, proposer signature
/// over the shard. Gossip then provisionally accepts it, the legitimate
/// index-0 shard is ignored per the first-seen ordering rule, and block
/// import fails against the header's commitments root, losing the slot.
///
/// `incorrect_commitment` breaks the commitment axis only; the signature
/// still verifies, so the outcome is the same missed slot.
///
/// `incorrect_signature` breaks the signature axis only, which gossip
/// checks up front: the extra shard is dropped and the legitimate one
/// delivered. Expected-missed stays false for this variant, but the case
/// is known-flaky: a client may disconnect and ban the sending peer for
/// the invalid signature, preventing delivery of the legitimate shards
/// over the same session. The uncertainty is preserved here rather than
/// resolved either way.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtraShard {
    /// Broadcast the header before any shard
    pub broadcast_block_first: bool,
    /// Broadcast the extra shard before the legitimate ones
    pub broadcast_extra_first: bool,
    /// Break the commitment axis of the extra shard
    pub incorrect_commitment: bool,
    /// Break the signature axis of the extra shard
    pub incorrect_signature: bool,
}

impl ExtraShard {
    fn build_extra(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
    ) -> Result<DataShard, StrategyError> {
        let extra_blob = format!("extra shard {}", ctx.slot).into_bytes();

        let mut overrides = ShardOverrides {
            blob: Some(extra_blob.clone()),
            ..Default::default()
        };

        if self.incorrect_commitment {
            // A commitment over different bytes: mismatches the blob while
            // the re-derived signature still verifies
            overrides.commitment = Some(compute_commitment(b"not the blob"));
        }

        if self.incorrect_signature {
            // Corrupt the first byte of a properly derived signature
            let valid = mutate_shard(&artifacts.shards[0], &overrides, &ctx.proposer)?;
            let mut bytes = *valid.get_signature().as_bytes();
            bytes[0] ^= 0xff;
            overrides.signature = Some(Signature::from_bytes(bytes));
        }

        Ok(mutate_shard(&artifacts.shards[0], &overrides, &ctx.proposer)?)
    }
}

#[async_trait]
impl DeviationStrategy for ExtraShard {
    fn name(&self) -> &'static str {
        "extra-shard"
    }

    fn describe(&self) -> String {
        format!(
            "Broadcasts one additional index-0 shard to every peer \
             (commitment broken: {}, signature broken: {}, block first: {}, extra first: {})",
            self.incorrect_commitment,
            self.incorrect_signature,
            self.broadcast_block_first,
            self.broadcast_extra_first
        )
    }

    fn causes_missed_slots(&self) -> bool {
        // An extra shard whose signature verifies is provisionally accepted
        // ahead of the legitimate one; a bad signature is dropped at
        // gossip, and an extra shard arriving late loses the first-seen
        // race to the legitimate one
        self.broadcast_extra_first && !self.incorrect_signature
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        let extra = self.build_extra(ctx, artifacts)?;
        debug!("slot {}: injecting extra shard {}", ctx.slot, extra);

        if self.broadcast_block_first {
            broadcaster
                .broadcast(
                    BroadcastArtifact::Header(artifacts.header.clone()),
                    &ctx.peers,
                )
                .await?;
        }

        if self.broadcast_extra_first {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(extra.clone()), &ctx.peers)
                .await?;
        }

        for shard in &artifacts.shards {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard.clone()), &ctx.peers)
                .await?;
        }

        if !self.broadcast_extra_first {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(extra), &ctx.peers)
                .await?;
        }

        if !self.broadcast_block_first {
            broadcaster
                .broadcast(
                    BroadcastArtifact::Header(artifacts.header.clone()),
                    &ctx.peers,
                )
                .await?;
        }

        Ok(if self.causes_missed_slots() {
            SlotOutcome::SlotLost
        } else {
            SlotOutcome::Normal
        })
    }
}

/// Broadcast conflicting but independently valid shards for the same index
/// to disjoint peer subsets.
///
/// One subset sees a validly signed shard with different content first,
/// the other sees the legitimate set. No gossip rule is violated on either
/// side and at least one subset imports the block, so the network
/// reconciles and the slot is not lost.
#[derive(Clone, Copy, Debug)]
pub struct ConflictingShards {
    /// Fraction of the peer set receiving the conflicting shard first
    pub split_fraction: f64,
}

impl Default for ConflictingShards {
    fn default() -> Self {
        Self { split_fraction: 0.5 }
    }
}

#[async_trait]
impl DeviationStrategy for ConflictingShards {
    fn name(&self) -> &'static str {
        "conflicting-shards"
    }

    fn describe(&self) -> String {
        "Broadcasts conflicting, independently valid shards for the same index \
         to disjoint peer subsets"
            .to_string()
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        let conflicting = mutate_shard(
            &artifacts.shards[0],
            &ShardOverrides {
                blob: Some(format!("conflicting shard {}", ctx.slot).into_bytes()),
                ..Default::default()
            },
            &ctx.proposer,
        )?;

        let (poisoned_peers, clean_peers) = ctx.peers.split_fraction(self.split_fraction);
        debug!(
            "slot {}: conflicting shard to {} peers, clean set to {}",
            ctx.slot,
            poisoned_peers.len(),
            clean_peers.len()
        );

        broadcaster
            .broadcast(
                BroadcastArtifact::Header(artifacts.header.clone()),
                &ctx.peers,
            )
            .await?;

        // The poisoned subset locks in the conflicting shard first; both
        // sends may be in flight at once
        try_join(
            broadcaster.broadcast(BroadcastArtifact::Shard(conflicting), &poisoned_peers),
            broadcaster.broadcast(
                BroadcastArtifact::Shard(artifacts.shards[0].clone()),
                &clean_peers,
            ),
        )
        .await?;

        // Everyone receives the rest of the legitimate set
        for shard in &artifacts.shards {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard.clone()), &ctx.peers)
                .await?;
        }

        Ok(SlotOutcome::Normal)
    }
}

/// Transpose the indices of the first two shards.
///
/// Signatures are re-derived for the swapped indices, so gossip accepts
/// both shards and the inclusion proof is the only broken axis; import
/// fails everywhere and the slot is lost.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwappedShardIndices;

#[async_trait]
impl DeviationStrategy for SwappedShardIndices {
    fn name(&self) -> &'static str {
        "swapped-shard-indices"
    }

    fn describe(&self) -> String {
        "Broadcasts the legitimate shard set with the first two indices transposed \
         (signatures re-derived, inclusion proofs left stale)"
            .to_string()
    }

    fn causes_missed_slots(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        if artifacts.shards.len() < 2 {
            warn!(
                "slot {}: fewer than two shards, nothing to transpose",
                ctx.slot
            );
            super::broadcast_canonical(ctx, artifacts, broadcaster).await?;
            return Ok(SlotOutcome::Normal);
        }

        broadcaster
            .broadcast(
                BroadcastArtifact::Header(artifacts.header.clone()),
                &ctx.peers,
            )
            .await?;

        for (position, shard) in artifacts.shards.iter().enumerate() {
            let swapped_index = match position {
                0 => 1u8,
                1 => 0u8,
                _ => position as u8,
            };

            let shard = if swapped_index != shard.get_index() {
                mutate_shard(
                    shard,
                    &ShardOverrides {
                        index: Some(swapped_index),
                        ..Default::default()
                    },
                    &ctx.proposer,
                )?
            } else {
                shard.clone()
            };

            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard), &ctx.peers)
                .await?;
        }

        Ok(SlotOutcome::SlotLost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::RecordingBroadcaster;
    use crate::strategy::test_support::*;
    use fray_common::shard::ShardError;

    fn shards_of(broadcaster: &RecordingBroadcaster) -> Vec<DataShard> {
        broadcaster
            .records()
            .into_iter()
            .filter_map(|r| match r.artifact {
                BroadcastArtifact::Shard(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extra_shard_all_axes_valid() {
        let ctx = context(6, 4);
        let artifacts = artifacts(6, 2);
        let broadcaster = RecordingBroadcaster::new();

        let action = ExtraShard {
            broadcast_block_first: true,
            broadcast_extra_first: true,
            ..Default::default()
        };
        let outcome = action.execute(&ctx, &artifacts, &broadcaster).await.unwrap();
        assert_eq!(outcome, SlotOutcome::SlotLost);
        assert!(action.causes_missed_slots());

        let records = broadcaster.records();
        assert_eq!(records[0].artifact.kind(), "header");
        // Extra shard travels before the legitimate ones
        assert_eq!(records[1].artifact.kind(), "shard");

        let shards = shards_of(&broadcaster);
        let extra = &shards[0];
        assert_eq!(extra.get_index(), 0);
        // Gossip axes valid: commitment matches its blob and the
        // signature verifies; only the inclusion proof is stale
        assert_eq!(
            *extra.get_commitment(),
            compute_commitment(extra.get_blob())
        );
        assert!(matches!(
            extra.verify(&proposer().public_key()),
            Err(ShardError::InvalidInclusionProof)
        ));
    }

    #[tokio::test]
    async fn test_extra_shard_incorrect_commitment() {
        let ctx = context(6, 4);
        let artifacts = artifacts(6, 2);
        let broadcaster = RecordingBroadcaster::new();

        let action = ExtraShard {
            broadcast_block_first: true,
            broadcast_extra_first: true,
            incorrect_commitment: true,
            ..Default::default()
        };
        assert!(action.causes_missed_slots());
        action.execute(&ctx, &artifacts, &broadcaster).await.unwrap();

        let extra = &shards_of(&broadcaster)[0];
        assert!(matches!(
            extra.verify(&proposer().public_key()),
            Err(ShardError::CommitmentMismatch)
        ));

        // The signature axis stays valid: it covers the broken commitment
        let message = DataShard::signing_bytes(
            extra.get_index(),
            extra.get_commitment(),
            &extra.get_header().header_root(),
        );
        assert!(proposer()
            .public_key()
            .verify(&message, extra.get_signature())
            .is_ok());
    }

    #[tokio::test]
    async fn test_extra_shard_incorrect_signature_is_not_expected_to_miss() {
        let ctx = context(6, 4);
        let artifacts = artifacts(6, 2);
        let broadcaster = RecordingBroadcaster::new();

        let action = ExtraShard {
            broadcast_block_first: true,
            broadcast_extra_first: true,
            incorrect_signature: true,
            ..Default::default()
        };
        assert!(!action.causes_missed_slots());

        let outcome = action.execute(&ctx, &artifacts, &broadcaster).await.unwrap();
        assert_eq!(outcome, SlotOutcome::Normal);

        let extra = &shards_of(&broadcaster)[0];
        assert!(matches!(
            extra.verify(&proposer().public_key()),
            Err(ShardError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_conflicting_shards_keep_one_subset_clean() {
        let ctx = context(6, 6);
        let artifacts = artifacts(6, 2);
        let broadcaster = RecordingBroadcaster::new();

        let outcome = ConflictingShards::default()
            .execute(&ctx, &artifacts, &broadcaster)
            .await
            .unwrap();
        assert_eq!(outcome, SlotOutcome::Normal);

        // Clean subset: first index-0 shard seen is the legitimate one
        let clean_peer = crate::net::PeerId(5);
        let first_shard = broadcaster
            .records_for(&clean_peer)
            .into_iter()
            .find_map(|r| match r.artifact {
                BroadcastArtifact::Shard(s) if s.get_index() == 0 => Some(s),
                _ => None,
            })
            .unwrap();
        assert!(first_shard.verify(&proposer().public_key()).is_ok());

        // Poisoned subset: first index-0 shard seen conflicts
        let poisoned_peer = crate::net::PeerId(0);
        let first_shard = broadcaster
            .records_for(&poisoned_peer)
            .into_iter()
            .find_map(|r| match r.artifact {
                BroadcastArtifact::Shard(s) if s.get_index() == 0 => Some(s),
                _ => None,
            })
            .unwrap();
        assert!(first_shard.verify(&proposer().public_key()).is_err());
    }

    #[tokio::test]
    async fn test_swapped_indices_break_only_the_proof() {
        let ctx = context(6, 4);
        let artifacts = artifacts(6, 2);
        let broadcaster = RecordingBroadcaster::new();

        let outcome = SwappedShardIndices
            .execute(&ctx, &artifacts, &broadcaster)
            .await
            .unwrap();
        assert_eq!(outcome, SlotOutcome::SlotLost);

        let shards = shards_of(&broadcaster);
        assert_eq!(shards[0].get_index(), 1);
        assert_eq!(shards[1].get_index(), 0);

        for shard in &shards[..2] {
            assert!(matches!(
                shard.verify(&proposer().public_key()),
                Err(ShardError::InvalidInclusionProof)
            ));
        }
    }
}
