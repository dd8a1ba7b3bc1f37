//! whaleflow - real-time whale situational awareness for a single on-chain token
//!
//! The crate turns a stream of normalized SOL flows for one token into:
//! - latched whale threshold crossings per wallet
//! - wallet behaviour signals (timing, coordination, persistence, exhaustion)
//! - one coarse token phase (9-state machine) annotated with a severity rank S1-S5
//!
//! Layout:
//! - `pipeline` - the analytical engine plus the multi-token runtime
//! - `session` - append-only JSONL session log and replay
//! - `source` - tail reader for the upstream adapter's flow file


pub mod pipeline;
pub mod session;
pub mod source;

pub use pipeline::{
    EngineConfig, FlowEvent, FlowOutcome, StateTransitionEvent, TokenEngine, TokenPhase,
    WalletSignalEvent,
};
