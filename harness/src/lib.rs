//! # Fray Harness
//!
//! Conformance-testing harness for blockchain network participants. Proves
//! that clients behave correctly when the network delivers
//! protocol-valid-but-adversarial artifacts: equivocating headers,
//! mis-ordered or mis-indexed data shards, delayed broadcasts, and
//! execution payloads with individually corrupted fields.
//!
//! ## Architecture Overview
//!
//! - **Mutator**: deterministic reconstruction of derived fields (content
//!   roots, hashes, signatures) after a targeted field override
//! - **Deviation strategies**: pluggable units of adversarial behavior
//! - **Injection controller**: drives one strategy per configured slot
//!   cadence
//! - **Liveness verifier**: bounds missed slots over an observation
//!   window, with optional circuit-breaker assertions
//! - **Scenario registry**: binds network config, strategy and liveness
//!   envelope to named scenarios and runs them under a deadline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fray_harness::prelude::*;
//!
//! let mut registry = ScenarioRegistry::new();
//! registry.register(
//!     Scenario::new("blob-gossip-delay", NetworkConfig::default())
//!         .with_strategy(Arc::new(ShardGossipDelay::new(500))),
//! )?;
//!
//! let result = registry.run("blob-gossip-delay", collaborators, timeout).await?;
//! assert!(result.passed());
//! ```
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: mutation and artifact construction are pure;
//!    identical inputs give byte-identical outputs
//! 2. **Explicit state**: the registry is a value, never a global
//! 3. **Fail fast**: budget violations and setup bugs abort immediately;
//!    single-slot broadcast failures are recorded and evaluation continues

pub mod clock;
pub mod controller;
pub mod mutator;
pub mod net;
pub mod observer;
pub mod registry;
pub mod sim;
pub mod strategy;
pub mod verifier;

pub mod prelude;

pub use clock::{Clock, PausedClock, SystemClock};
pub use registry::{Scenario, ScenarioRegistry, ScenarioResult, ScenarioStatus};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
