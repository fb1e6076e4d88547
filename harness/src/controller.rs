//! Scheduled fault-injection controller.
//!
//! One controller drives one scenario: `Idle -> Armed -> Executing -> Idle`
//! on a per-slot cadence. On every slot boundary the controller either
//! executes the scenario's deviation strategy (when the slot matches the
//! configured frequency) or relays the canonical artifacts untouched.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use thiserror::Error;

use fray_common::block::Slot;

use crate::{
    net::PeerBroadcaster,
    strategy::{broadcast_canonical, DeviationStrategy, SlotArtifacts, SlotContext, SlotOutcome},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Deviation frequency must be at least 1")]
    ZeroFrequency,

    #[error(
        "Strategy '{strategy}' induces slot loss; frequency {frequency} would allow \
         back-to-back losses and stall the network (need at least 2)"
    )]
    ConsecutiveLossRisk {
        strategy: &'static str,
        frequency: u64,
    },

    #[error(
        "Strategy delay of {delay_ms} ms does not fit the slot budget of {budget_ms} ms"
    )]
    DelayExceedsSlotBudget { delay_ms: u64, budget_ms: u64 },
}

/// Validate a scenario's injection configuration.
///
/// Called before the scenario starts; a violation here is a setup bug and
/// always fatal, never a runtime condition.
pub fn validate_config(
    strategy: Option<&dyn DeviationStrategy>,
    frequency: u64,
    slot_budget: Duration,
) -> Result<(), ConfigError> {
    if frequency == 0 {
        return Err(ConfigError::ZeroFrequency);
    }

    if let Some(strategy) = strategy {
        if strategy.causes_missed_slots() && frequency < 2 {
            return Err(ConfigError::ConsecutiveLossRisk {
                strategy: strategy.name(),
                frequency,
            });
        }

        let delay = strategy.max_broadcast_delay();
        if delay >= slot_budget {
            return Err(ConfigError::DelayExceedsSlotBudget {
                delay_ms: delay.as_millis() as u64,
                budget_ms: slot_budget.as_millis() as u64,
            });
        }
    }

    Ok(())
}

/// Controller state, advanced once per slot boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Armed,
    Executing,
}

/// What the controller did with one slot.
#[derive(Clone, Debug)]
pub enum SlotAction {
    /// The strategy ran and returned its expected outcome
    Executed(SlotOutcome),
    /// The canonical artifacts were relayed untouched
    Relayed,
    /// The strategy or relay failed; the error is recorded, not retried
    Failed(String),
}

/// Per-slot record kept for diagnostics and outcome correlation.
#[derive(Clone, Debug)]
pub struct SlotRecord {
    pub slot: Slot,
    pub action: SlotAction,
}

/// Drives one deviation strategy on a per-slot cadence.
pub struct InjectionController {
    strategy: Option<Arc<dyn DeviationStrategy>>,
    frequency: u64,
    state: ControllerState,
    records: Vec<SlotRecord>,
}

impl InjectionController {
    /// Build a controller after validating the configuration.
    pub fn new(
        strategy: Option<Arc<dyn DeviationStrategy>>,
        frequency: u64,
        slot_budget: Duration,
    ) -> Result<Self, ConfigError> {
        validate_config(strategy.as_deref(), frequency, slot_budget)?;

        if let Some(strategy) = &strategy {
            info!(
                "armed strategy '{}' every {} slot(s): {}",
                strategy.name(),
                frequency,
                strategy.describe()
            );
        }

        Ok(Self {
            strategy,
            frequency,
            state: ControllerState::Idle,
            records: Vec::new(),
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn records(&self) -> &[SlotRecord] {
        &self.records
    }

    /// Whether the strategy fires on the given slot.
    pub fn triggers_on(&self, slot: Slot) -> bool {
        self.strategy.is_some() && slot % self.frequency == 0
    }

    /// Handle one slot boundary.
    ///
    /// Invoked synchronously once per slot by the external round clock; a
    /// failed strategy execution is surfaced in the record, never retried.
    pub async fn on_slot(
        &mut self,
        ctx: &SlotContext,
        artifacts: &SlotArtifacts,
        broadcaster: &dyn PeerBroadcaster,
    ) -> &SlotRecord {
        self.state = ControllerState::Armed;

        let action = if self.triggers_on(ctx.slot) {
            self.state = ControllerState::Executing;
            let strategy = self
                .strategy
                .as_ref()
                .expect("triggers_on implies a strategy");

            debug!("slot {}: executing '{}'", ctx.slot, strategy.name());
            match strategy.execute(ctx, artifacts, broadcaster).await {
                Ok(outcome) => SlotAction::Executed(outcome),
                Err(err) => {
                    error!("slot {}: strategy '{}' failed: {}", ctx.slot, strategy.name(), err);
                    SlotAction::Failed(err.to_string())
                }
            }
        } else {
            match broadcast_canonical(ctx, artifacts, broadcaster).await {
                Ok(()) => SlotAction::Relayed,
                Err(err) => {
                    error!("slot {}: canonical relay failed: {}", ctx.slot, err);
                    SlotAction::Failed(err.to_string())
                }
            }
        };

        self.state = ControllerState::Idle;
        self.records.push(SlotRecord {
            slot: ctx.slot,
            action,
        });
        self.records.last().expect("record just pushed")
    }
}
