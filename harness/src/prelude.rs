//! Convenient re-exports for common usage.

pub use std::sync::Arc;
pub use std::time::Duration;

pub use crate::clock::{Clock, PausedClock, SystemClock};
pub use crate::controller::{ConfigError, InjectionController};
pub use crate::mutator::{
    mutate_header, mutate_payload, mutate_shard, mutate_transaction, HeaderOverrides,
    MutationError, PayloadOverrides, ShardOverrides, TransactionOverrides,
};
pub use crate::net::{
    BroadcastArtifact, BroadcastError, PeerBroadcaster, PeerId, PeerSet, RecordingBroadcaster,
};
pub use crate::observer::{
    IntervalRoundClock, NetworkObserver, RoundClock, ScriptedObserver, ScriptedRoundClock,
    SlotObservation,
};
pub use crate::registry::{
    Collaborators, NetworkConfig, Scenario, ScenarioRegistry, ScenarioResult, ScenarioStatus,
};
pub use crate::sim::SimulatedClientPool;
pub use crate::strategy::{
    ConflictingShards, DeviationStrategy, EquivocatingHeaders, ExtraShard, ShardGossipDelay,
    ShardsBeforeBlock, SlotArtifacts, SlotContext, SlotOutcome, SwappedShardIndices,
};
pub use crate::verifier::{
    CircuitBreakerBudget, LivenessBudget, LivenessVerifier, VerifierError,
};

pub use fray_common::{
    block::{SignedSlotHeader, Slot, SlotHeader},
    crypto::{Hash, KeyPair, PublicKey},
    payload::ExecutionPayload,
    shard::{build_shard_set, DataShard},
    transaction::Transaction,
};
