//! Liveness budget verifier.
//!
//! Consumes per-slot observations over a declared window and fails fast
//! when the missed-slot count exceeds the budget: a live network process
//! cannot be rewound, so there is nothing to retry. Circuit-breaker
//! scenarios additionally assert that the protective mechanism disengages
//! the watched feature after a lower threshold of misses and re-engages it
//! after a declared cooldown.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fray_common::block::Slot;

use crate::observer::SlotObservation;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error(
        "Missed-slot budget exceeded: observed {observed} missed slots, \
         allowed {allowed}, window [{window_start}, {window_end})"
    )]
    BudgetExceeded {
        observed: u64,
        allowed: u64,
        window_start: Slot,
        window_end: Slot,
    },

    #[error(
        "Circuit breaker never engaged: {missed} slots were missed but the \
         feature was still enabled at the end of the window"
    )]
    BreakerNeverEngaged { missed: u64 },

    #[error(
        "Circuit breaker engaged at slot {engaged_at} but the feature did \
         not come back after the {cooldown_slots}-slot cooldown"
    )]
    BreakerNeverRecovered {
        engaged_at: Slot,
        cooldown_slots: u64,
    },

    #[error("Observation for slot {observed} arrived out of order (expected {expected})")]
    OutOfOrderObservation { observed: Slot, expected: Slot },
}

/// Expected circuit-breaker behavior, asserted on top of the missed-slot
/// bound.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerBudget {
    /// Missed-slot count that must trip the breaker
    pub engage_threshold: u64,
    /// Slots after engagement within which the feature must come back
    pub cooldown_slots: u64,
}

/// Declared liveness envelope for one scenario.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LivenessBudget {
    /// Maximum tolerated missed slots inside the observation window
    pub max_missed_slots: u64,
    /// Length of the observation window in slots, starting at the
    /// scenario's behavioral transition point
    pub observation_slots: u64,
    /// Present when the scenario watches a protective mechanism
    pub circuit_breaker: Option<CircuitBreakerBudget>,
}

impl LivenessBudget {
    pub fn bounded(max_missed_slots: u64, observation_slots: u64) -> Self {
        Self {
            max_missed_slots,
            observation_slots,
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerBudget) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BreakerPhase {
    /// Waiting for the miss count to cross the threshold and the feature
    /// to report disabled
    AwaitingEngage,
    /// Feature reported disabled; counting down the cooldown
    Engaged { engaged_at: Slot },
    /// Feature came back after the cooldown
    Recovered,
}

/// Final statistics of a completed verification window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_start: Slot,
    pub window_end: Slot,
    pub observed_slots: u64,
    pub missed_slots: u64,
}

/// Accumulates slot observations against a [`LivenessBudget`].
pub struct LivenessVerifier {
    budget: LivenessBudget,
    window_start: Slot,
    next_slot: Slot,
    missed: u64,
    breaker: BreakerPhase,
}

impl LivenessVerifier {
    /// Start a verification window at the given slot.
    pub fn new(budget: LivenessBudget, window_start: Slot) -> Self {
        Self {
            budget,
            window_start,
            next_slot: window_start,
            missed: 0,
            breaker: BreakerPhase::AwaitingEngage,
        }
    }

    pub fn missed_slots(&self) -> u64 {
        self.missed
    }

    pub fn window_start(&self) -> Slot {
        self.window_start
    }

    fn window_end(&self) -> Slot {
        self.window_start + self.budget.observation_slots
    }

    /// Whether every slot of the window has been observed.
    pub fn is_complete(&self) -> bool {
        self.next_slot >= self.window_end()
    }

    /// Record one slot observation.
    ///
    /// Fails fast the moment the budget is exceeded; the caller must treat
    /// any error as terminal for the scenario.
    pub fn record(
        &mut self,
        slot: Slot,
        observation: &SlotObservation,
    ) -> Result<(), VerifierError> {
        if slot != self.next_slot {
            return Err(VerifierError::OutOfOrderObservation {
                observed: slot,
                expected: self.next_slot,
            });
        }
        self.next_slot += 1;

        if !observation.produced {
            self.missed += 1;
            warn!(
                "slot {} missed ({}/{} budget used)",
                slot, self.missed, self.budget.max_missed_slots
            );

            if self.missed > self.budget.max_missed_slots {
                return Err(VerifierError::BudgetExceeded {
                    observed: self.missed,
                    allowed: self.budget.max_missed_slots,
                    window_start: self.window_start,
                    window_end: self.window_end(),
                });
            }
        } else {
            debug!("slot {} produced", slot);
        }

        if self.budget.circuit_breaker.is_some() {
            self.track_breaker(slot, observation);
        }

        Ok(())
    }

    fn track_breaker(&mut self, slot: Slot, observation: &SlotObservation) {
        let breaker = self
            .budget
            .circuit_breaker
            .expect("caller checked presence");

        match (self.breaker, observation.feature_enabled) {
            (BreakerPhase::AwaitingEngage, Some(false))
                if self.missed >= breaker.engage_threshold =>
            {
                info!(
                    "circuit breaker engaged at slot {} after {} missed slots",
                    slot, self.missed
                );
                self.breaker = BreakerPhase::Engaged { engaged_at: slot };
            }
            // Re-enablement only counts once the declared cooldown has
            // elapsed; an earlier flap is not a recovery
            (BreakerPhase::Engaged { engaged_at }, Some(true))
                if slot >= engaged_at + breaker.cooldown_slots =>
            {
                info!(
                    "circuit breaker recovered at slot {} ({} slots after engaging)",
                    slot,
                    slot - engaged_at
                );
                self.breaker = BreakerPhase::Recovered;
            }
            _ => {}
        }
    }

    /// Close the window and produce the verdict.
    pub fn finish(&self) -> Result<WindowStats, VerifierError> {
        if let Some(breaker) = self.budget.circuit_breaker {
            match self.breaker {
                BreakerPhase::AwaitingEngage => {
                    return Err(VerifierError::BreakerNeverEngaged {
                        missed: self.missed,
                    });
                }
                BreakerPhase::Engaged { engaged_at } => {
                    return Err(VerifierError::BreakerNeverRecovered {
                        engaged_at,
                        cooldown_slots: breaker.cooldown_slots,
                    });
                }
                BreakerPhase::Recovered => {}
            }
        }

        Ok(WindowStats {
            window_start: self.window_start,
            window_end: self.window_end(),
            observed_slots: self.next_slot - self.window_start,
            missed_slots: self.missed,
        })
    }
}
