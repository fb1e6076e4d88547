//! Runs the built-in shard-gossip scenario suite against the in-process
//! simulated client pool and prints a pass/fail summary.
//!
//! ```bash
//! RUST_LOG=info cargo run --example run_scenarios
//! ```

use std::sync::Arc;
use std::time::Duration;

use fray_harness::prelude::*;

fn suite() -> anyhow::Result<ScenarioRegistry> {
    let network = NetworkConfig {
        peer_count: 6,
        blobs_per_slot: 2,
        ..NetworkConfig::default()
    };
    let budget = LivenessBudget::bounded(3, 8);

    let mut registry = ScenarioRegistry::new();

    registry.register(
        Scenario::new("shard-gossiping-sanity", network.clone())
            .with_description("Sanity run verifying the harness relay keeps the chain healthy")
            .with_budget(budget),
    )?;

    registry.register(
        Scenario::new("shard-gossiping-before-block", network.clone())
            .with_description("Chain health where the shards are gossiped before the block")
            .with_strategy(Arc::new(ShardsBeforeBlock))
            .with_budget(budget),
    )?;

    registry.register(
        Scenario::new("shard-gossiping-delay", network.clone())
            .with_description("Chain health where the shards trail the block by 500 ms")
            .with_strategy(Arc::new(ShardGossipDelay::new(500)))
            .with_budget(budget),
    )?;

    registry.register(
        Scenario::new("shard-gossiping-extra-shard", network.clone())
            .with_description("An always-present extra shard ahead of the legitimate one")
            .with_strategy(Arc::new(ExtraShard {
                broadcast_block_first: true,
                broadcast_extra_first: true,
                ..Default::default()
            }))
            .with_frequency(4)
            .with_budget(budget),
    )?;

    registry.register(
        Scenario::new("shard-gossiping-conflicting-shards", network)
            .with_description("Conflicting but independently valid shards to disjoint subsets")
            .with_strategy(Arc::new(ConflictingShards::default()))
            .with_budget(budget),
    )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let registry = suite()?;
    let names: Vec<String> = registry.names().map(String::from).collect();

    let mut failures = 0;
    for name in names {
        let scenario = registry.get(&name).expect("registered above");
        let network = NetworkConfig {
            peer_count: 6,
            blobs_per_slot: 2,
            ..NetworkConfig::default()
        };

        let pool = Arc::new(SimulatedClientPool::new(
            network.peer_count,
            network.proposer().public_key(),
            network.blobs_per_slot,
        ));
        let collaborators = Collaborators {
            broadcaster: pool.clone(),
            observer: pool,
            round_clock: Box::new(ScriptedRoundClock::new(
                0,
                scenario.budget().observation_slots,
            )),
            clock: Arc::new(SystemClock),
        };

        let result = registry
            .run(&name, collaborators, Duration::from_secs(600))
            .await?;

        println!(
            "{:<42} {:?} (missed {} slots)",
            result.scenario, result.status, result.missed_slots
        );
        for line in &result.diagnostics {
            println!("    {}", line);
        }
        if !result.passed() {
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} scenario(s) failed", failures);
    }
    Ok(())
}
