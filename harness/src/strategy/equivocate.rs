// Equivocation deviations: two header variants for the same slot and
// proposer, each delivered to a disjoint peer subset.

use async_trait::async_trait;
use futures::future::try_join;
use log::debug;

use fray_common::shard::build_shard_set;

use crate::{
    mutator::{mutate_header, HeaderOverrides},
    net::{BroadcastArtifact, PeerBroadcaster},
};

use super::{variant_tag, DeviationStrategy, SlotArtifacts, SlotContext, SlotOutcome, StrategyError};

/// Sign two headers for the same slot that differ only in graffiti and
/// broadcast each to a disjoint peer subset.
///
/// With `shards_follow_variant`, the variant subset also receives a shard
/// set rebuilt against the variant header, so the mismatched reference
/// travels in the header; otherwise the shards keep referencing the
/// canonical header and the mismatch travels in the shards.
///
/// No single gossip rule is violated on either side, so the network is
/// expected to reconcile without losing the slot.
#[derive(Clone, Copy, Debug)]
pub struct EquivocatingHeaders {
    /// Fraction of the peer set receiving the canonical header
    pub split_fraction: f64,
    /// Rebind the variant subset's shards to the variant header
    pub shards_follow_variant: bool,
}

impl Default for EquivocatingHeaders {
    fn default() -> Self {
        Self {
            split_fraction: 0.5,
            shards_follow_variant: false,
        }
    }
}

#[async_trait]
impl DeviationStrategy for EquivocatingHeaders {
    fn name(&self) -> &'static str {
        "equivocating-headers"
    }

    fn describe(&self) -> String {
        format!(
            "Broadcasts two validly signed header variants for the same slot \
             (differing only in graffiti) to disjoint peer subsets; \
             variant shards rebound: {}",
            self.shards_follow_variant
        )
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        let variant = mutate_header(
            &artifacts.header,
            &HeaderOverrides::graffiti(variant_tag(ctx.slot)),
            &ctx.proposer,
        )?;
        debug_assert!(variant.is_equivocation_of(&artifacts.header));

        let (canonical_peers, variant_peers) = ctx.peers.split_fraction(self.split_fraction);
        debug!(
            "slot {}: equivocating across {} / {} peers",
            ctx.slot,
            canonical_peers.len(),
            variant_peers.len()
        );

        // Both header variants leave concurrently; the broadcaster must
        // tolerate overlapping in-flight sends to disjoint subsets
        try_join(
            broadcaster.broadcast(
                BroadcastArtifact::Header(artifacts.header.clone()),
                &canonical_peers,
            ),
            broadcaster.broadcast(BroadcastArtifact::Header(variant.clone()), &variant_peers),
        )
        .await?;

        // Canonical shards for the canonical subset
        for shard in &artifacts.shards {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard.clone()), &canonical_peers)
                .await?;
        }

        if self.shards_follow_variant {
            // Rebuild the shard set against the variant header so its
            // subset sees an internally consistent block
            let mut template = variant.get_header().clone();
            template.shard_commitments_root = fray_common::crypto::Hash::zero();
            let (_, variant_shards) =
                build_shard_set(template, artifacts.blobs.clone(), &ctx.proposer)?;

            for shard in variant_shards {
                broadcaster
                    .broadcast(BroadcastArtifact::Shard(shard), &variant_peers)
                    .await?;
            }
        } else {
            for shard in &artifacts.shards {
                broadcaster
                    .broadcast(BroadcastArtifact::Shard(shard.clone()), &variant_peers)
                    .await?;
            }
        }

        Ok(SlotOutcome::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{PeerId, RecordingBroadcaster};
    use crate::strategy::test_support::*;

    #[tokio::test]
    async fn test_each_subset_sees_exactly_one_header() {
        let ctx = context(4, 6);
        let artifacts = artifacts(4, 1);
        let broadcaster = RecordingBroadcaster::new();

        EquivocatingHeaders::default()
            .execute(&ctx, &artifacts, &broadcaster)
            .await
            .unwrap();

        for peer in ctx.peers.iter() {
            let headers: Vec<_> = broadcaster
                .records_for(peer)
                .into_iter()
                .filter(|r| r.artifact.kind() == "header")
                .collect();
            assert_eq!(headers.len(), 1, "peer {} saw {} headers", peer, headers.len());
        }
    }

    #[tokio::test]
    async fn test_variants_equivocate() {
        let ctx = context(4, 6);
        let artifacts = artifacts(4, 1);
        let broadcaster = RecordingBroadcaster::new();

        EquivocatingHeaders::default()
            .execute(&ctx, &artifacts, &broadcaster)
            .await
            .unwrap();

        let headers: Vec<_> = broadcaster
            .records()
            .into_iter()
            .filter_map(|r| match r.artifact {
                BroadcastArtifact::Header(h) => Some(h),
                _ => None,
            })
            .collect();

        assert_eq!(headers.len(), 2);
        assert!(headers[0].is_equivocation_of(&headers[1]));

        let proposer_key = proposer().public_key();
        for header in &headers {
            assert!(header.verify_signature(&proposer_key));
        }
    }

    #[tokio::test]
    async fn test_rebound_shards_verify_against_variant() {
        let ctx = context(4, 6);
        let artifacts = artifacts(4, 2);
        let broadcaster = RecordingBroadcaster::new();

        EquivocatingHeaders {
            split_fraction: 0.5,
            shards_follow_variant: true,
        }
        .execute(&ctx, &artifacts, &broadcaster)
        .await
        .unwrap();

        // The variant subset's shards must be internally consistent
        let variant_peer = PeerId(5);
        let key = proposer().public_key();
        for record in broadcaster.records_for(&variant_peer) {
            if let BroadcastArtifact::Shard(shard) = record.artifact {
                shard.verify(&key).unwrap();
            }
        }
    }
}
