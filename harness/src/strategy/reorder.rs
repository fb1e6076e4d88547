// Broadcast-ordering deviations: derived artifacts before their parent,
// or after it with an explicit delay.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::net::{BroadcastArtifact, PeerBroadcaster};

use super::{DeviationStrategy, SlotArtifacts, SlotContext, SlotOutcome, StrategyError};

/// Broadcast every shard before the block header.
///
/// Clients must be able to buffer shards for a block they have not seen
/// yet; chain health is expected to hold.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShardsBeforeBlock;

#[async_trait]
impl DeviationStrategy for ShardsBeforeBlock {
    fn name(&self) -> &'static str {
        "shards-before-block"
    }

    fn describe(&self) -> String {
        "Broadcasts all data shards to every peer before the block header they belong to"
            .to_string()
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        for shard in &artifacts.shards {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard.clone()), &ctx.peers)
                .await?;
        }

        broadcaster
            .broadcast(
                BroadcastArtifact::Header(artifacts.header.clone()),
                &ctx.peers,
            )
            .await?;

        debug!("slot {}: shards broadcast before header", ctx.slot);
        Ok(SlotOutcome::Normal)
    }
}

/// Broadcast the header first, then the shards after a fixed delay.
///
/// The delay must stay inside the slot budget; configuration validation
/// rejects anything else before the scenario starts.
#[derive(Clone, Copy, Debug)]
pub struct ShardGossipDelay {
    pub delay_ms: u64,
}

impl ShardGossipDelay {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

#[async_trait]
impl DeviationStrategy for ShardGossipDelay {
    fn name(&self) -> &'static str {
        "shard-gossip-delay"
    }

    fn describe(&self) -> String {
        format!(
            "Broadcasts the block header, waits {} ms, then broadcasts the data shards",
            self.delay_ms
        )
    }

    fn max_broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    async fn execute(
        &self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> Result<SlotOutcome, StrategyError> {
        broadcaster
            .broadcast(
                BroadcastArtifact::Header(artifacts.header.clone()),
                &ctx.peers,
            )
            .await?;

        ctx.clock.sleep(Duration::from_millis(self.delay_ms)).await;
        debug!("slot {}: delayed shards by {} ms", ctx.slot, self.delay_ms);

        for shard in &artifacts.shards {
            broadcaster
                .broadcast(BroadcastArtifact::Shard(shard.clone()), &ctx.peers)
                .await?;
        }

        Ok(SlotOutcome::Normal)
    }
}
