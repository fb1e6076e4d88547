// Slot pacing and network observation collaborators.
//
// The network drives slots as an ongoing external process; the harness is
// invoked once per slot boundary and asks the observer afterwards whether
// the network produced a canonical block for that slot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use fray_common::block::Slot;

use crate::clock::Clock;

#[derive(Debug, Error)]
pub enum ObserveError {
    #[error("No observation available for slot {0}")]
    MissingObservation(Slot),
}

/// What the network did with one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotObservation {
    /// Whether a canonical block was produced for the slot
    pub produced: bool,
    /// State of the protected feature, when the scenario watches one
    pub feature_enabled: Option<bool>,
}

impl SlotObservation {
    pub fn produced() -> Self {
        Self {
            produced: true,
            feature_enabled: None,
        }
    }

    pub fn missed() -> Self {
        Self {
            produced: false,
            feature_enabled: None,
        }
    }

    pub fn with_feature(mut self, enabled: bool) -> Self {
        self.feature_enabled = Some(enabled);
        self
    }
}

/// Emits slot boundaries with a monotonically increasing slot index.
#[async_trait]
pub trait RoundClock: Send {
    /// The next slot boundary, or `None` when the run is over.
    async fn next_slot(&mut self) -> Option<Slot>;
}

/// Supplies the per-slot produced/missed verdict.
#[async_trait]
pub trait NetworkObserver: Send + Sync {
    async fn observe(&self, slot: Slot) -> Result<SlotObservation, ObserveError>;
}

/// Round clock that yields a fixed range of slots without pacing.
pub struct ScriptedRoundClock {
    next: Slot,
    end: Slot,
}

impl ScriptedRoundClock {
    /// Yields slots `start..end`.
    pub fn new(start: Slot, end: Slot) -> Self {
        Self { next: start, end }
    }
}

#[async_trait]
impl RoundClock for ScriptedRoundClock {
    async fn next_slot(&mut self) -> Option<Slot> {
        if self.next >= self.end {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        Some(slot)
    }
}

/// Round clock paced by the injected wall clock, one slot per duration.
pub struct IntervalRoundClock {
    clock: Arc<dyn Clock>,
    slot_duration: Duration,
    next: Slot,
}

impl IntervalRoundClock {
    pub fn new(clock: Arc<dyn Clock>, slot_duration: Duration, start: Slot) -> Self {
        Self {
            clock,
            slot_duration,
            next: start,
        }
    }
}

#[async_trait]
impl RoundClock for IntervalRoundClock {
    async fn next_slot(&mut self) -> Option<Slot> {
        // The first slot fires immediately, later ones after a full period
        if self.next > 0 {
            self.clock.sleep(self.slot_duration).await;
        }
        let slot = self.next;
        self.next += 1;
        Some(slot)
    }
}

/// Observer that replays a pre-scripted sequence of observations.
pub struct ScriptedObserver {
    observations: Mutex<VecDeque<SlotObservation>>,
}

impl ScriptedObserver {
    pub fn new(observations: Vec<SlotObservation>) -> Self {
        Self {
            observations: Mutex::new(observations.into()),
        }
    }
}

#[async_trait]
impl NetworkObserver for ScriptedObserver {
    async fn observe(&self, slot: Slot) -> Result<SlotObservation, ObserveError> {
        self.observations
            .lock()
            .pop_front()
            .ok_or(ObserveError::MissingObservation(slot))
    }
}
