//! Deviation strategies: pluggable units of adversarial behavior.
//!
//! A strategy is constructed once per scenario, invoked once per scheduled
//! slot, and never mutated concurrently. `execute` is pure with respect to
//! global state aside from the network it broadcasts into; it reports
//! whether the slot should be considered lost so the controller can
//! correlate against liveness accounting.

mod corrupt;
mod equivocate;
mod reorder;

pub use corrupt::{ConflictingShards, ExtraShard, SwappedShardIndices};
pub use equivocate::EquivocatingHeaders;
pub use reorder::{ShardGossipDelay, ShardsBeforeBlock};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use fray_common::{
    block::{SignedSlotHeader, Slot, SlotHeader},
    config::GRAFFITI_SIZE,
    crypto::{Hash, KeyPair},
    payload::ExecutionPayload,
    serializer::Serializer,
    shard::{build_shard_set, DataShard, ShardError},
    transaction::Transaction,
};

use crate::{
    clock::Clock,
    mutator::MutationError,
    net::{BroadcastArtifact, BroadcastError, PeerBroadcaster, PeerSet},
};

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Artifact mutation failed: {0}")]
    Mutation(#[from] MutationError),

    #[error("Shard construction failed: {0}")]
    Shard(#[from] ShardError),
}

/// What the strategy expects the network to make of the slot it just
/// disturbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The network should still produce a canonical block
    Normal,
    /// The disturbance is expected to cost the slot
    SlotLost,
}

/// Per-slot execution context handed to a strategy.
pub struct SlotContext {
    pub slot: Slot,
    /// Proposer credential for the slot; the harness proxies the proposer,
    /// so strategies can produce validly signed variants
    pub proposer: KeyPair,
    /// The full peer set of the network under test
    pub peers: PeerSet,
    pub clock: Arc<dyn Clock>,
    /// Wall-clock budget of one slot; any in-slot delay must end before it
    pub slot_budget: Duration,
}

/// The baseline artifacts of one slot, all mutually consistent.
pub struct SlotArtifacts {
    pub payload: ExecutionPayload,
    pub header: SignedSlotHeader,
    pub shards: Vec<DataShard>,
    /// The raw blobs the shards were built from
    pub blobs: Vec<Vec<u8>>,
}

impl SlotArtifacts {
    /// Deterministically build the canonical artifacts for a slot.
    ///
    /// The same (slot, parent, proposer, blob count) always produces the
    /// same bytes, so scenario runs are reproducible.
    pub fn build(
        slot: Slot,
        parent_hash: Hash,
        proposer: &KeyPair,
        blobs_per_slot: usize,
    ) -> Result<Self, StrategyError> {
        let mut tx = Transaction::new(
            slot,
            21_000,
            100,
            proposer.public_key(),
            None,
            1_000,
            slot.to_be_bytes().to_vec(),
            None,
        );
        tx.sign_with(proposer);

        let payload = ExecutionPayload::new(
            parent_hash.clone(),
            proposer.public_key(),
            fray_common::crypto::hash(&[slot.to_be_bytes().as_slice(), b"state"].concat()),
            fray_common::crypto::hash(&[slot.to_be_bytes().as_slice(), b"receipts"].concat()),
            [0u8; fray_common::config::LOGS_BLOOM_SIZE],
            fray_common::crypto::hash(&slot.to_be_bytes()),
            slot,
            30_000_000,
            21_000,
            1_700_000_000 + slot * 12,
            b"fray".to_vec(),
            7,
            vec![tx.to_bytes()],
        )
        .map_err(MutationError::Decode)?;

        let blobs: Vec<Vec<u8>> = (0..blobs_per_slot)
            .map(|i| format!("shard {slot}:{i} data").into_bytes())
            .collect();

        let header = SlotHeader::new(
            slot,
            proposer.public_key().key_id().as_bytes()[0] as u64,
            parent_hash,
            payload.get_state_root().clone(),
            payload.get_block_hash().clone(),
            Hash::zero(),
            [0u8; GRAFFITI_SIZE],
        );

        let (header, shards) = build_shard_set(header, blobs.clone(), proposer)?;

        Ok(Self {
            payload,
            header,
            shards,
            blobs,
        })
    }

    pub fn header_root(&self) -> Hash {
        self.header.header_root()
    }
}

/// A polymorphic unit of adversarial behavior.
#[async_trait]
pub trait DeviationStrategy: Send + Sync {
    /// Short identifier used in logs and scenario names.
    fn name(&self) -> &'static str;

    /// Human-readable description of the behavior, used for reporting.
    fn describe(&self) -> String;

    /// Whether the behavior is expected to cost slots. The controller
    /// refuses frequencies below 2 for such strategies so the network
    /// never faces back-to-back losses.
    fn causes_missed_slots(&self) -> bool {
        false
    }

    /// Largest in-slot delay the strategy will suspend for; validated
    /// against the slot budget at configuration time.
    fn max_broadcast_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Execute the deviation for one slot.
    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError>;
}

/// Broadcast the canonical artifacts in protocol order: header first, then
/// shards by index. This is what the harness does on non-scheduled slots.
pub async fn broadcast_canonical(
    ctx: &SlotContext,
    artifacts: &SlotArtifacts,
    broadcaster: &dyn PeerBroadcaster,
) -> Result<(), BroadcastError> {
    broadcaster
        .broadcast(
            BroadcastArtifact::Header(artifacts.header.clone()),
            &ctx.peers,
        )
        .await?;

    for shard in &artifacts.shards {
        broadcaster
            .broadcast(BroadcastArtifact::Shard(shard.clone()), &ctx.peers)
            .await?;
    }

    Ok(())
}

/// Derive a deterministic 32-byte tag for a slot, used as variant graffiti.
pub(crate) fn variant_tag(slot: Slot) -> [u8; GRAFFITI_SIZE] {
    fray_common::crypto::hash(&[b"variant".as_slice(), &slot.to_be_bytes()].concat()).to_bytes()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::SystemClock;

    pub fn proposer() -> KeyPair {
        KeyPair::from_secret_bytes(&[40u8; 32])
    }

    pub fn context(slot: Slot, peer_count: u64) -> SlotContext {
        SlotContext {
            slot,
            proposer: proposer(),
            peers: PeerSet::all(peer_count),
            clock: Arc::new(SystemClock),
            slot_budget: Duration::from_secs(12),
        }
    }

    pub fn artifacts(slot: Slot, blobs: usize) -> SlotArtifacts {
        SlotArtifacts::build(slot, Hash::zero(), &proposer(), blobs).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::test_support::*;

    #[test]
    fn test_artifacts_are_deterministic() {
        let a = artifacts(3, 2);
        let b = artifacts(3, 2);

        assert_eq!(a.payload.get_block_hash(), b.payload.get_block_hash());
        assert_eq!(a.header_root(), b.header_root());
        assert_eq!(a.shards.len(), b.shards.len());
        for (x, y) in a.shards.iter().zip(&b.shards) {
            assert_eq!(x.to_bytes(), y.to_bytes());
        }
    }

    #[test]
    fn test_artifacts_are_mutually_consistent() {
        let artifacts = artifacts(7, 3);
        let key = proposer().public_key();

        assert!(artifacts.header.verify_signature(&key));
        assert_eq!(
            artifacts.header.get_header().get_payload_hash(),
            artifacts.payload.get_block_hash()
        );
        for shard in &artifacts.shards {
            shard.verify(&key).unwrap();
        }
    }

    #[tokio::test]
    async fn test_canonical_order_is_header_then_shards() {
        use crate::net::RecordingBroadcaster;

        let ctx = context(1, 4);
        let artifacts = artifacts(1, 2);
        let broadcaster = RecordingBroadcaster::new();

        broadcast_canonical(&ctx, &artifacts, &broadcaster)
            .await
            .unwrap();

        let records = broadcaster.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].artifact.kind(), "header");
        assert_eq!(records[1].artifact.kind(), "shard");
        assert_eq!(records[2].artifact.kind(), "shard");
    }
}
