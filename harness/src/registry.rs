//! Scenario registry and execution.
//!
//! The registry is an explicitly constructed value passed into the run
//! entry point (no process-wide singleton), so scenario execution is
//! testable in isolation and parallelizable across scenarios. Each
//! scenario binds a network configuration, an optional deviation strategy,
//! and a declared liveness envelope.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fray_common::{
    block::Slot,
    config::{
        DEFAULT_MAX_MISSED_SLOTS, DEFAULT_WAIT_EPOCHS, SLOTS_PER_EPOCH, SLOT_DURATION_MS,
    },
    crypto::{Hash, KeyPair},
};

use crate::{
    clock::Clock,
    controller::{ConfigError, InjectionController, SlotAction, validate_config},
    net::{PeerBroadcaster, PeerSet},
    observer::{NetworkObserver, ObserveError, RoundClock},
    strategy::{DeviationStrategy, SlotArtifacts, SlotContext},
    verifier::{LivenessBudget, LivenessVerifier},
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Scenario '{0}' is already registered")]
    Duplicate(String),

    #[error("Unknown scenario '{0}'")]
    Unknown(String),

    #[error("Invalid configuration for scenario '{name}': {source}")]
    InvalidConfig {
        name: String,
        #[source]
        source: ConfigError,
    },

    #[error("Network observation failed: {0}")]
    Observer(#[from] ObserveError),
}

/// Static description of the network a scenario runs against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub peer_count: u64,
    pub blobs_per_slot: usize,
    pub slot_duration_ms: u64,
    /// Slot at which the behavior under test begins; the observation
    /// window opens here
    pub transition_slot: Slot,
    /// Seed of the proposer credential the harness proxies
    pub proposer_seed: [u8; 32],
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_count: 4,
            blobs_per_slot: 2,
            slot_duration_ms: SLOT_DURATION_MS,
            transition_slot: 0,
            proposer_seed: [42u8; 32],
        }
    }
}

impl NetworkConfig {
    pub fn slot_budget(&self) -> Duration {
        Duration::from_millis(self.slot_duration_ms)
    }

    pub fn proposer(&self) -> KeyPair {
        KeyPair::from_secret_bytes(&self.proposer_seed)
    }
}

/// One named conformance scenario.
pub struct Scenario {
    name: String,
    description: String,
    network: NetworkConfig,
    strategy: Option<Arc<dyn DeviationStrategy>>,
    frequency: u64,
    budget: LivenessBudget,
}

impl Scenario {
    pub fn new(name: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            network,
            strategy: None,
            frequency: 1,
            budget: LivenessBudget::bounded(
                DEFAULT_MAX_MISSED_SLOTS,
                DEFAULT_WAIT_EPOCHS * SLOTS_PER_EPOCH,
            ),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach the deviation strategy.
    ///
    /// A strategy declared to cost slots is automatically spaced to every
    /// second slot so the network never faces back-to-back losses; use
    /// [`Scenario::with_frequency`] afterwards to widen the spacing.
    pub fn with_strategy(mut self, strategy: Arc<dyn DeviationStrategy>) -> Self {
        self.frequency = if strategy.causes_missed_slots() { 2 } else { 1 };
        self.strategy = Some(strategy);
        self
    }

    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_budget(mut self, budget: LivenessBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget(&self) -> &LivenessBudget {
        &self.budget
    }

    pub fn strategy(&self) -> Option<&Arc<dyn DeviationStrategy>> {
        self.strategy.as_ref()
    }

    /// Full description: the scenario text plus the deviation behavior.
    pub fn describe(&self) -> String {
        match &self.strategy {
            Some(strategy) => format!(
                "{}\nDeviation behavior: {}",
                self.description,
                strategy.describe()
            ),
            None => self.description.clone(),
        }
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        validate_config(
            self.strategy.as_deref(),
            self.frequency,
            self.network.slot_budget(),
        )
        .map_err(|source| ScenarioError::InvalidConfig {
            name: self.name.clone(),
            source,
        })
    }
}

/// External collaborators a scenario run needs.
pub struct Collaborators {
    pub broadcaster: Arc<dyn PeerBroadcaster>,
    pub observer: Arc<dyn NetworkObserver>,
    pub round_clock: Box<dyn RoundClock>,
    pub clock: Arc<dyn Clock>,
}

/// Final status of a scenario run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// The run was cancelled or the round clock ended before the
    /// observation window completed; never reported as passed
    Inconclusive,
}

/// Outcome of one scenario run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub status: ScenarioStatus,
    pub missed_slots: u64,
    /// Description of the active deviation strategy, for reporting
    pub strategy: String,
    pub diagnostics: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    /// JSON rendering for report pipelines.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Insertion-ordered collection of scenarios.
#[derive(Default)]
pub struct ScenarioRegistry {
    scenarios: IndexMap<String, Scenario>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario, rejecting duplicates and invalid
    /// configurations up front.
    pub fn register(&mut self, scenario: Scenario) -> Result<(), ScenarioError> {
        scenario.validate()?;

        if self.scenarios.contains_key(scenario.name()) {
            return Err(ScenarioError::Duplicate(scenario.name().to_string()));
        }

        info!("registered scenario '{}'", scenario.name());
        self.scenarios.insert(scenario.name().to_string(), scenario);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Run one scenario to completion or until the deadline expires.
    ///
    /// The run is bound to `timeout`: on expiry the pending slot's
    /// strategy execution is aborted and the result is inconclusive,
    /// never silently passed.
    pub async fn run(
        &self,
        name: &str,
        mut collaborators: Collaborators,
        timeout: Duration,
    ) -> Result<ScenarioResult, ScenarioError> {
        let scenario = self
            .scenarios
            .get(name)
            .ok_or_else(|| ScenarioError::Unknown(name.to_string()))?;

        let strategy_description = scenario
            .strategy
            .as_ref()
            .map(|s| s.describe())
            .unwrap_or_else(|| "none".to_string());

        let mut controller = InjectionController::new(
            scenario.strategy.clone(),
            scenario.frequency,
            scenario.network.slot_budget(),
        )
        .map_err(|source| ScenarioError::InvalidConfig {
            name: name.to_string(),
            source,
        })?;

        let mut verifier =
            LivenessVerifier::new(scenario.budget, scenario.network.transition_slot);
        let proposer = scenario.network.proposer();
        let peers = PeerSet::all(scenario.network.peer_count);
        let mut diagnostics = Vec::new();
        let mut parent_hash = Hash::zero();

        info!("running scenario '{}': {}", name, scenario.describe());

        // Pin<Box<dyn Future>> is Unpin, so the boxed sleep can be polled
        // by reference across loop iterations
        let mut deadline = collaborators.clock.sleep(timeout);

        loop {
            let slot = tokio::select! {
                _ = &mut deadline => {
                    warn!("scenario '{}' hit its deadline", name);
                    diagnostics.push("deadline expired before the observation window completed".to_string());
                    return Ok(ScenarioResult {
                        scenario: name.to_string(),
                        status: ScenarioStatus::Inconclusive,
                        missed_slots: verifier.missed_slots(),
                        strategy: strategy_description,
                        diagnostics,
                    });
                }
                slot = collaborators.round_clock.next_slot() => slot,
            };

            let Some(slot) = slot else {
                diagnostics
                    .push("round clock ended before the observation window completed".to_string());
                return Ok(ScenarioResult {
                    scenario: name.to_string(),
                    status: ScenarioStatus::Inconclusive,
                    missed_slots: verifier.missed_slots(),
                    strategy: strategy_description,
                    diagnostics,
                });
            };

            let ctx = SlotContext {
                slot,
                proposer: proposer.clone(),
                peers: peers.clone(),
                clock: collaborators.clock.clone(),
                slot_budget: scenario.network.slot_budget(),
            };

            let artifacts = match SlotArtifacts::build(
                slot,
                parent_hash.clone(),
                &proposer,
                scenario.network.blobs_per_slot,
            ) {
                Ok(artifacts) => artifacts,
                Err(err) => {
                    diagnostics.push(format!("slot {}: artifact construction failed: {}", slot, err));
                    return Ok(ScenarioResult {
                        scenario: name.to_string(),
                        status: ScenarioStatus::Failed,
                        missed_slots: verifier.missed_slots(),
                        strategy: strategy_description,
                        diagnostics,
                    });
                }
            };

            // The slot's work runs under the same deadline: a strategy
            // suspended mid-slot is aborted, never awaited past the run
            let broadcaster = collaborators.broadcaster.clone();
            let observer = collaborators.observer.clone();
            let slot_work = tokio::select! {
                _ = &mut deadline => None,
                result = async {
                    let action = controller
                        .on_slot(&ctx, &artifacts, broadcaster.as_ref())
                        .await
                        .action
                        .clone();
                    let observation = observer.observe(slot).await;
                    (action, observation)
                } => Some(result),
            };

            let Some((action, observation)) = slot_work else {
                warn!("scenario '{}' hit its deadline mid-slot", name);
                diagnostics.push(format!(
                    "deadline expired during slot {}; pending strategy execution aborted",
                    slot
                ));
                return Ok(ScenarioResult {
                    scenario: name.to_string(),
                    status: ScenarioStatus::Inconclusive,
                    missed_slots: verifier.missed_slots(),
                    strategy: strategy_description,
                    diagnostics,
                });
            };

            if let SlotAction::Failed(reason) = &action {
                // Not retried; the network simply saw nothing this slot and
                // the observer will report it missed, so budget accounting
                // still runs
                diagnostics.push(format!("slot {}: {}", slot, reason));
            }

            let observation = observation?;
            if observation.produced {
                parent_hash = artifacts.payload.get_block_hash().clone();
            }

            if slot >= verifier.window_start() {
                if let Err(err) = verifier.record(slot, &observation) {
                    diagnostics.push(err.to_string());
                    return Ok(ScenarioResult {
                        scenario: name.to_string(),
                        status: ScenarioStatus::Failed,
                        missed_slots: verifier.missed_slots(),
                        strategy: strategy_description,
                        diagnostics,
                    });
                }
            }

            if verifier.is_complete() {
                break;
            }
        }

        match verifier.finish() {
            Ok(stats) => {
                info!(
                    "scenario '{}' passed: {} missed of {} observed slots",
                    name, stats.missed_slots, stats.observed_slots
                );
                Ok(ScenarioResult {
                    scenario: name.to_string(),
                    status: ScenarioStatus::Passed,
                    missed_slots: stats.missed_slots,
                    strategy: strategy_description,
                    diagnostics,
                })
            }
            Err(err) => {
                diagnostics.push(err.to_string());
                Ok(ScenarioResult {
                    scenario: name.to_string(),
                    status: ScenarioStatus::Failed,
                    missed_slots: verifier.missed_slots(),
                    strategy: strategy_description,
                    diagnostics,
                })
            }
        }
    }
}
