//! # Whale intelligence pipeline
//!
//! Turns validated flows for one token into whale crossings, wallet signals
//! and a token phase with a severity rank.
//!
//! ## Architecture
//!
//! **Key Principle:** one `TokenState` per token, owned by one `TokenEngine`.
//! Detectors are stateless apart from their thresholds and receive the token
//! state by `&mut` reference. Every append is paired with its cap, so memory
//! stays bounded however long a session runs.
//!
//! Per flow:
//! 1. `ingestion` validates the raw record into a `FlowEvent`
//! 2. `windows` updates the wallet's 5m/15m rolling sums and minute buckets
//! 3. `whale` emits latched threshold crossings
//! 4. `density` and `aggregator` (over `signals`) react to each crossing
//! 5. `silence` updates direction-aware silence marks
//! 6. `state_machine` moves the token phase, ranked by `severity`
//!
//! Snapshots add a `patterns` verdict read from the same state.
//!
//! Time comes from `clock` only. In replay mode it is the latest chain
//! timestamp, which makes a replay of the same flows byte-for-byte identical.
//!
//! ## Module Organization
//!
//! - `types` - Flow, whale, signal and transition records
//! - `config` - Thresholds, caps and runtime settings from `WHALEFLOW_*` env vars
//! - `error` - Validation and configuration errors
//! - `wallet` / `state` - Per-wallet and per-token state, LRU wallet map
//! - `engine` - Per-token processing context
//! - `patterns` - Wave trend, capital and exhaustion verdicts for display
//! - `event_buffer` - Bounded human-readable event lines
//! - `runtime` - Router and per-token workers

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod density;
pub mod engine;
pub mod episode;
pub mod error;
pub mod event_buffer;
pub mod ingestion;
pub mod patterns;
pub mod runtime;
pub mod severity;
pub mod signals;
pub mod silence;
pub mod state;
pub mod state_machine;
pub mod types;
pub mod wallet;
pub mod whale;
pub mod windows;

// Re-export commonly used types
pub use clock::ChainTimeClock;
pub use config::{Caps, EngineConfig, RuntimeConfig, SessionLogLevel, Thresholds};
pub use engine::{EngineStats, TokenEngine, TokenSnapshot};
pub use error::{ConfigError, FlowValidationError};
pub use event_buffer::EventBuffer;
pub use ingestion::FlowValidator;
pub use patterns::{CapitalVerdict, ExhaustionLabel, PatternVerdict, WaveTrend};
pub use runtime::{run_router, RouterReport, RouterSettings, TokenUpdate};
pub use silence::SilentMetrics;
pub use types::{
    Direction, FlowEvent, FlowOutcome, Severity, SignalKind, StateTransitionEvent, TokenPhase,
    TransitionTrigger, WalletSignalEvent, WhaleEvent, WhaleKind,
};
