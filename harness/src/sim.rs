//! In-process simulated client pool.
//!
//! Stands in for the network under test when scenarios run without real
//! clients. Each simulated peer applies the documented acceptance rules:
//!
//! - Gossip layer: the first header seen for a slot wins; a shard is
//!   provisionally accepted if its index is in range and its proposer
//!   signature verifies, and only the first shard per index is kept;
//!   later shards for the same index are ignored per the ordering rule.
//! - Import: at the end of a slot a peer imports the block iff it holds a
//!   header and, for every expected index, a fully valid shard (all four
//!   axes) bound to that same header.
//!
//! The slot is produced when at least one peer imports; conflicting views
//! reconcile through whichever subset held a valid set.

use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, trace};
use parking_lot::Mutex;

use fray_common::{
    block::{SignedSlotHeader, Slot},
    config::MAX_SHARDS_PER_BLOCK,
    crypto::PublicKey,
    shard::DataShard,
};

use crate::{
    net::{BroadcastArtifact, BroadcastError, PeerBroadcaster, PeerId, PeerSet},
    observer::{NetworkObserver, ObserveError, SlotObservation},
};

#[derive(Default)]
struct PeerView {
    header: Option<SignedSlotHeader>,
    shards: HashMap<u8, DataShard>,
}

impl PeerView {
    fn imports(&self, proposer: &PublicKey, expected_shards: usize) -> bool {
        let Some(header) = &self.header else {
            return false;
        };
        let header_root = header.header_root();

        (0..expected_shards as u8).all(|index| {
            self.shards.get(&index).is_some_and(|shard| {
                shard.verify(proposer).is_ok()
                    && shard.get_header().header_root() == header_root
            })
        })
    }
}

/// Simulated pool of peers, usable as both the broadcaster and the
/// network observer of a scenario run.
pub struct SimulatedClientPool {
    proposer: PublicKey,
    expected_shards: usize,
    peer_count: u64,
    views: Mutex<HashMap<PeerId, PeerView>>,
}

impl SimulatedClientPool {
    pub fn new(peer_count: u64, proposer: PublicKey, expected_shards: usize) -> Self {
        Self {
            proposer,
            expected_shards,
            peer_count,
            views: Mutex::new(HashMap::new()),
        }
    }

    pub fn peers(&self) -> PeerSet {
        PeerSet::all(self.peer_count)
    }

    /// Gossip-layer acceptance: index in range and proposer signature
    /// valid. Commitment and inclusion proof are only checked at import.
    fn gossip_accepts(&self, shard: &DataShard) -> bool {
        if shard.get_index() >= MAX_SHARDS_PER_BLOCK {
            return false;
        }

        let message = DataShard::signing_bytes(
            shard.get_index(),
            shard.get_commitment(),
            &shard.get_header().header_root(),
        );
        self.proposer.verify(&message, shard.get_signature()).is_ok()
    }
}

#[async_trait]
impl PeerBroadcaster for SimulatedClientPool {
    async fn broadcast(
        &self,
        artifact: BroadcastArtifact,
        peers: &PeerSet,
    ) -> Result<(), BroadcastError> {
        if peers.is_empty() {
            return Err(BroadcastError::EmptyPeerSet);
        }

        let mut views = self.views.lock();
        for peer in peers.iter() {
            let view = views.entry(*peer).or_default();

            match &artifact {
                BroadcastArtifact::Header(header) => {
                    // First header seen for the slot wins
                    if view.header.is_none() {
                        view.header = Some(header.clone());
                    }
                }
                BroadcastArtifact::Shard(shard) => {
                    if !self.gossip_accepts(shard) {
                        trace!("{}: gossip dropped {}", peer, shard);
                        continue;
                    }
                    // First accepted shard per index wins; later ones are
                    // ignored per the ordering rule
                    view.shards.entry(shard.get_index()).or_insert_with(|| shard.clone());
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl NetworkObserver for SimulatedClientPool {
    async fn observe(&self, slot: Slot) -> Result<SlotObservation, ObserveError> {
        let mut views = self.views.lock();

        let produced = views
            .values()
            .any(|view| view.imports(&self.proposer, self.expected_shards));

        debug!(
            "slot {}: {} ({} peer views)",
            slot,
            if produced { "produced" } else { "missed" },
            views.len()
        );

        // Views are per-slot; the next slot starts clean
        views.clear();

        Ok(if produced {
            SlotObservation::produced()
        } else {
            SlotObservation::missed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{artifacts, context, proposer};
    use crate::strategy::{broadcast_canonical, DeviationStrategy, ExtraShard};

    fn pool(peer_count: u64, expected_shards: usize) -> SimulatedClientPool {
        SimulatedClientPool::new(peer_count, proposer().public_key(), expected_shards)
    }

    #[tokio::test]
    async fn test_canonical_broadcast_produces_slot() {
        let pool = pool(4, 2);
        let ctx = context(1, 4);
        let artifacts = artifacts(1, 2);

        broadcast_canonical(&ctx, &artifacts, &pool).await.unwrap();
        let observation = pool.observe(1).await.unwrap();
        assert!(observation.produced);
    }

    #[tokio::test]
    async fn test_missing_shard_misses_slot() {
        let pool = pool(4, 2);
        let ctx = context(1, 4);
        let artifacts = artifacts(1, 2);

        pool.broadcast(
            BroadcastArtifact::Header(artifacts.header.clone()),
            &ctx.peers,
        )
        .await
        .unwrap();
        pool.broadcast(
            BroadcastArtifact::Shard(artifacts.shards[0].clone()),
            &ctx.peers,
        )
        .await
        .unwrap();

        assert!(!pool.observe(1).await.unwrap().produced);
    }

    #[tokio::test]
    async fn test_views_reset_between_slots() {
        let pool = pool(4, 2);
        let ctx = context(1, 4);
        let artifacts = artifacts(1, 2);

        broadcast_canonical(&ctx, &artifacts, &pool).await.unwrap();
        assert!(pool.observe(1).await.unwrap().produced);

        // Nothing broadcast for the next slot
        assert!(!pool.observe(2).await.unwrap().produced);
    }

    #[tokio::test]
    async fn test_first_seen_shard_blocks_legitimate_one() {
        let pool = pool(4, 2);
        let ctx = context(2, 4);
        let artifacts = artifacts(2, 2);

        // A validly signed extra shard arrives first; the legitimate
        // index-0 shard is ignored and import fails on the stale proof
        ExtraShard {
            broadcast_block_first: true,
            broadcast_extra_first: true,
            ..Default::default()
        }
        .execute(&ctx, &artifacts, &pool)
        .await
        .unwrap();

        assert!(!pool.observe(2).await.unwrap().produced);
    }

    #[tokio::test]
    async fn test_invalid_signature_shard_dropped_at_gossip() {
        let pool = pool(4, 2);
        let ctx = context(2, 4);
        let artifacts = artifacts(2, 2);

        ExtraShard {
            broadcast_block_first: true,
            broadcast_extra_first: true,
            incorrect_signature: true,
            ..Default::default()
        }
        .execute(&ctx, &artifacts, &pool)
        .await
        .unwrap();

        // The bad extra shard never occupied index 0, so the legitimate
        // set imports
        assert!(pool.observe(2).await.unwrap().produced);
    }
}
