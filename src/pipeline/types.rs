//! Shared event records for the whale pipeline
//!
//! Input: `FlowEvent` (validated SOL flow for one token)
//! Internal: `WhaleEvent` (latched threshold crossing)
//! Output: `WalletSignalEvent`, `StateTransitionEvent`, collected per flow in `FlowOutcome`
//!
//! Every record is immutable once built and serializes to a flat JSON object so the
//! session log can persist it and replay can read it back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a flow relative to the tracked token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }

    /// Exact match on the wire token; anything else is rejected upstream.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "buy" => Some(Direction::Buy),
            "sell" => Some(Direction::Sell),
            _ => None,
        }
    }
}

/// Validated flow for one wallet and one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub wallet: String,
    pub timestamp: i64,
    pub direction: Direction,
    pub amount_sol: f64,
    pub signature: String,
    pub token: String,
}

impl FlowEvent {
    pub fn is_buy(&self) -> bool {
        matches!(self.direction, Direction::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self.direction, Direction::Sell)
    }
}

/// Which whale threshold a wallet crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhaleKind {
    #[serde(rename = "WHALE_TX")]
    SingleTx,
    #[serde(rename = "WHALE_CUM_5M")]
    Cumulative5m,
    #[serde(rename = "WHALE_CUM_15M")]
    Cumulative15m,
}

impl WhaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhaleKind::SingleTx => "WHALE_TX",
            WhaleKind::Cumulative5m => "WHALE_CUM_5M",
            WhaleKind::Cumulative15m => "WHALE_CUM_15M",
        }
    }
}

/// Latched threshold crossing. At most one per (wallet, kind) for the wallet's tracked life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleEvent {
    pub wallet: String,
    pub timestamp: i64,
    pub kind: WhaleKind,
    /// Single flow size for `SingleTx`, current window sum for cumulative kinds
    pub amount_sol: f64,
    pub threshold: f64,
    pub token: String,
    pub direction: Direction,
}

/// Wallet behaviour signal names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Timing,
    Coordination,
    Persistence,
    Exhaustion,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Timing => "TIMING",
            SignalKind::Coordination => "COORDINATION",
            SignalKind::Persistence => "PERSISTENCE",
            SignalKind::Exhaustion => "EXHAUSTION",
        }
    }
}

/// Net side of the whale events inside the coordination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationDirection {
    Buy,
    Sell,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingDetail {
    pub is_early: bool,
    /// `None` when the token birth was unknown at check time
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seconds_after_birth: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationDetail {
    /// True distinct-wallet count, including the triggering wallet
    pub wallet_count: usize,
    /// Other wallets in the window, capped
    pub sample_wallets: Vec<String>,
    pub window_secs: i64,
    pub direction: CoordinationDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceDetail {
    pub bucket_count: usize,
    pub span_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustionDetail {
    pub silent_count: usize,
    pub eligible_count: usize,
    /// Silent / eligible, rounded to two decimals
    pub disengagement_pct: f64,
    /// Non-early wallets were active inside the replacement lookback
    pub replacement: bool,
}

/// Per-signal detail; only fired signals are populated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalDetails {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timing: Option<TimingDetail>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub coordination: Option<CoordinationDetail>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub persistence: Option<PersistenceDetail>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exhaustion: Option<ExhaustionDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSignalEvent {
    pub token: String,
    /// `None` for token-level signals (exhaustion)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wallet: Option<String>,
    pub timestamp: i64,
    pub signals: Vec<SignalKind>,
    pub details: SignalDetails,
}

impl WalletSignalEvent {
    /// Fold the signals of a later whale event from the same flow into this one.
    pub fn merge(&mut self, other: WalletSignalEvent) {
        for signal in other.signals {
            if !self.signals.contains(&signal) {
                self.signals.push(signal);
            }
        }
        self.signals.sort();

        let details = other.details;
        if details.timing.is_some() {
            self.details.timing = details.timing;
        }
        if details.coordination.is_some() {
            self.details.coordination = details.coordination;
        }
        if details.persistence.is_some() {
            self.details.persistence = details.persistence;
        }
        if details.exhaustion.is_some() {
            self.details.exhaustion = details.exhaustion;
        }
    }

    pub fn has(&self, signal: SignalKind) -> bool {
        self.signals.contains(&signal)
    }
}

/// Ordinal rank attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    S1,
    S2,
    S3,
    S4,
    S5,
}

impl Severity {
    pub fn rank(&self) -> u8 {
        match self {
            Severity::S1 => 1,
            Severity::S2 => 2,
            Severity::S3 => 3,
            Severity::S4 => 4,
            Severity::S5 => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::S1 => "S1",
            Severity::S2 => "S2",
            Severity::S3 => "S3",
            Severity::S4 => "S4",
            Severity::S5 => "S5",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse token phase. `Quiet` is both the initial and the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPhase {
    #[default]
    Quiet,
    Ignition,
    CoordinationSpike,
    EarlyPhase,
    PersistenceConfirmed,
    ParticipationExpansion,
    PressurePeaking,
    ExhaustionDetected,
    Dissipation,
}

impl TokenPhase {
    pub const ALL: [TokenPhase; 9] = [
        TokenPhase::Quiet,
        TokenPhase::Ignition,
        TokenPhase::CoordinationSpike,
        TokenPhase::EarlyPhase,
        TokenPhase::PersistenceConfirmed,
        TokenPhase::ParticipationExpansion,
        TokenPhase::PressurePeaking,
        TokenPhase::ExhaustionDetected,
        TokenPhase::Dissipation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPhase::Quiet => "QUIET",
            TokenPhase::Ignition => "IGNITION",
            TokenPhase::CoordinationSpike => "COORDINATION_SPIKE",
            TokenPhase::EarlyPhase => "EARLY_PHASE",
            TokenPhase::PersistenceConfirmed => "PERSISTENCE_CONFIRMED",
            TokenPhase::ParticipationExpansion => "PARTICIPATION_EXPANSION",
            TokenPhase::PressurePeaking => "PRESSURE_PEAKING",
            TokenPhase::ExhaustionDetected => "EXHAUSTION_DETECTED",
            TokenPhase::Dissipation => "DISSIPATION",
        }
    }
}

impl fmt::Display for TokenPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// Whale silence reached the episode end threshold
    EpisodeSilence,
    NewEpisode,
    /// Whale activity resumed inside the current episode
    Reignition,
    CoordinatedEarlyWallets,
    SustainedCoordination,
    PersistentWallets,
    NewWalletsActive,
    DensityPeak,
    EarlyCohortSilent,
    ActivityCollapsed,
    WhaleBurstReversal,
    SuddenReactivation,
}

impl TransitionTrigger {
    pub fn is_new_episode(&self) -> bool {
        matches!(self, TransitionTrigger::NewEpisode)
    }

    pub fn is_reversal(&self) -> bool {
        matches!(
            self,
            TransitionTrigger::WhaleBurstReversal | TransitionTrigger::SuddenReactivation
        )
    }
}

/// Structured numbers behind a transition; unset fields are omitted on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionDetails {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub early_wallet_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub coordinated_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub persistent_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_wallet_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub whale_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub active_wallet_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub silence_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exhaustion: Option<ExhaustionDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sample_wallets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransitionEvent {
    pub token: String,
    pub timestamp: i64,
    pub episode_id: u64,
    pub from: TokenPhase,
    pub to: TokenPhase,
    pub trigger: TransitionTrigger,
    pub details: TransitionDetails,
    /// Absent for transitions into `Quiet`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity: Option<Severity>,
}

/// Everything one processed flow or tick produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOutcome {
    pub whales: Vec<WhaleEvent>,
    pub signal: Option<WalletSignalEvent>,
    /// Token-level exhaustion signal, rate-limited per episode
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exhaustion: Option<WalletSignalEvent>,
    pub transition: Option<StateTransitionEvent>,
}

impl FlowOutcome {
    pub fn is_empty(&self) -> bool {
        self.whales.is_empty()
            && self.signal.is_none()
            && self.exhaustion.is_none()
            && self.transition.is_none()
    }
}
