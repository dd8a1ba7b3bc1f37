//! Token engine: the per-token processing context
//!
//! ```text
//! FlowEvent
//!     ↓
//! TokenEngine::process_flow()
//!     ↓
//! out-of-order guard ─ ChainTimeClock::observe ─ birth
//!     ↓
//! WalletMap::checkout
//!     ↓
//! SilenceTracker::on_wallet_trade
//!     ↓
//! TimeWindowManager::add → WhaleDetector::check
//!     ↓                         ↓ (per whale)
//!     ↓               DensityTracker::add → SignalAggregator::process
//!     ↓
//! WalletMap::checkin (evicted wallets pruned)
//!     ↓
//! SilenceTracker::on_token_activity → SignalAggregator::signal_exhaustion
//!     ↓
//! TokenStateMachine::evaluate → SilenceTracker::on_transition
//!     ↓
//! FlowOutcome
//! ```
//!
//! One engine owns exactly one `TokenState`. Nothing here blocks or performs
//! I/O; the runtime decides where outcomes go.

use super::aggregator::{exhaustion_detail, SignalAggregator};
use super::clock::ChainTimeClock;
use super::config::EngineConfig;
use super::density::Density;
use super::patterns::{analyze, PatternVerdict};
use super::silence::{SilenceTracker, SilentMetrics};
use super::state::{TokenState, WaveRecord};
use super::state_machine::TokenStateMachine;
use super::types::{
    ExhaustionDetail, FlowEvent, FlowOutcome, Severity, StateTransitionEvent, TokenPhase,
    WalletSignalEvent,
};
use super::whale::WhaleDetector;
use super::windows::TimeWindowManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Counters since the engine was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub flows_processed: u64,
    pub flows_foreign: u64,
    pub flows_out_of_order: u64,
    pub whale_events: u64,
    pub signal_events: u64,
    pub transitions: u64,
    pub wallets_evicted: u64,
}

/// Point-in-time view of one token, for consumers and session logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub token: String,
    pub timestamp: i64,
    pub phase: TokenPhase,
    pub previous_phase: Option<TokenPhase>,
    pub seconds_in_phase: i64,
    pub last_severity: Option<Severity>,
    pub episode_id: u64,
    pub episode_start: Option<i64>,
    pub wave: u32,
    pub wave_history: Vec<WaveRecord>,
    pub birth: Option<i64>,
    pub tracked_wallets: usize,
    pub early_wallets: usize,
    pub whale_density: usize,
    pub buy_whale_density: usize,
    pub sell_whale_density: usize,
    pub episode_max_density: f64,
    pub last_whale_ts: Option<i64>,
    pub exhaustion: ExhaustionDetail,
    pub buy_sol: f64,
    pub sell_sol: f64,
    pub net_flow_sol: f64,
    pub sell_ratio: f64,
    pub silent: SilentMetrics,
    pub verdict: PatternVerdict,
}

pub struct TokenEngine {
    config: Arc<EngineConfig>,
    state: TokenState,
    clock: ChainTimeClock,
    windows: TimeWindowManager,
    whale: WhaleDetector,
    aggregator: SignalAggregator,
    silence: SilenceTracker,
    fsm: TokenStateMachine,
    stats: EngineStats,
}

impl TokenEngine {
    pub fn new(token: impl Into<String>, config: Arc<EngineConfig>, clock: ChainTimeClock) -> Self {
        let token = token.into();
        log::info!(
            "🚀 Tracking {} ({} clock)",
            token,
            if clock.is_replay() { "replay" } else { "live" }
        );

        Self {
            state: TokenState::new(token, &config),
            windows: TimeWindowManager::from_caps(&config.caps),
            whale: WhaleDetector::from_thresholds(&config.thresholds),
            aggregator: SignalAggregator::from_config(&config.thresholds, &config.caps),
            silence: SilenceTracker::from_thresholds(&config.thresholds),
            fsm: TokenStateMachine::new(&config),
            stats: EngineStats::default(),
            config,
            clock,
        }
    }

    /// Engine with a replay clock: time only advances with observed flows
    pub fn replay(token: impl Into<String>, config: Arc<EngineConfig>) -> Self {
        Self::new(token, config, ChainTimeClock::replay())
    }

    pub fn token(&self) -> &str {
        &self.state.token
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Run one validated flow through the pipeline
    pub fn process_flow(&mut self, flow: &FlowEvent) -> FlowOutcome {
        if flow.token != self.state.token {
            log::warn!(
                "⚠️  Ignoring flow {} for {} in {} engine",
                flow.signature,
                flow.token,
                self.state.token
            );
            self.stats.flows_foreign += 1;
            return FlowOutcome::default();
        }

        if let Some(last_seen) = self
            .state
            .wallets
            .get(&flow.wallet)
            .filter(|wallet| wallet.activity_count > 0)
            .map(|wallet| wallet.last_seen)
        {
            if flow.timestamp < last_seen {
                log::debug!(
                    "Dropping out-of-order flow {} for {}: {} < {}",
                    flow.signature,
                    flow.wallet,
                    flow.timestamp,
                    last_seen
                );
                self.stats.flows_out_of_order += 1;
                return FlowOutcome::default();
            }
        }

        self.clock.observe(flow.timestamp);
        let now = self.clock.now();
        if self.state.birth.is_none() {
            self.state.birth = Some(flow.timestamp);
            log::info!("🐣 {} birth at {}", self.state.token, flow.timestamp);
        }

        let mut wallet = self.state.wallets.checkout(&flow.wallet);
        self.silence.on_wallet_trade(&mut wallet, flow);
        self.windows.add(&mut wallet, flow);
        self.state.flow_totals.record(flow);

        let whales = self.whale.check(&mut wallet, flow);
        let mut signal: Option<WalletSignalEvent> = None;
        for event in &whales {
            self.fsm.density().add(&mut self.state, event);
            if let Some(fired) = self.aggregator.process(event, &mut wallet, &mut self.state, now) {
                match signal.as_mut() {
                    Some(merged) => merged.merge(fired),
                    None => signal = Some(fired),
                }
            }
        }

        let evicted = self.state.wallets.checkin(wallet);
        if !evicted.is_empty() {
            log::debug!("LRU evicted {} wallet(s) from {}", evicted.len(), self.state.token);
            self.stats.wallets_evicted += evicted.len() as u64;
            self.state.forget_wallets(&evicted);
        }

        self.silence.on_token_activity(&mut self.state, now);
        let exhaustion = self.check_exhaustion(now);
        let transition = self.evaluate(now);

        self.stats.flows_processed += 1;
        self.stats.whale_events += whales.len() as u64;
        if signal.is_some() {
            self.stats.signal_events += 1;
        }
        self.count(&exhaustion, &transition);

        FlowOutcome {
            whales,
            signal,
            exhaustion,
            transition,
        }
    }

    /// Re-run the time-driven checks without a flow, at the clock's current time
    pub fn tick(&mut self) -> FlowOutcome {
        let now = self.clock.now();
        let exhaustion = self.check_exhaustion(now);
        let transition = self.evaluate(now);
        self.count(&exhaustion, &transition);

        FlowOutcome {
            exhaustion,
            transition,
            ..FlowOutcome::default()
        }
    }

    fn evaluate(&mut self, now: i64) -> Option<StateTransitionEvent> {
        let transition = self.fsm.evaluate(&mut self.state, &self.aggregator, now)?;
        self.silence.on_transition(&mut self.state, transition.to, now);
        Some(transition)
    }

    /// Token-level exhaustion only means something inside an active episode
    fn check_exhaustion(&mut self, now: i64) -> Option<WalletSignalEvent> {
        if self.state.current_state == TokenPhase::Quiet {
            return None;
        }
        self.aggregator.signal_exhaustion(&mut self.state, now)
    }

    fn count(
        &mut self,
        exhaustion: &Option<WalletSignalEvent>,
        transition: &Option<StateTransitionEvent>,
    ) {
        if exhaustion.is_some() {
            self.stats.signal_events += 1;
        }
        if transition.is_some() {
            self.stats.transitions += 1;
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        let now = self.clock.now();
        let state = &self.state;
        let density = self.fsm.density();
        let Density {
            wallet_count: whale_density,
            ..
        } = density.current_density(state, now);

        TokenSnapshot {
            token: state.token.clone(),
            timestamp: now,
            phase: state.current_state,
            previous_phase: state.previous_state,
            seconds_in_phase: state.seconds_in_state(now),
            last_severity: self.fsm.last_severity(),
            episode_id: state.episode_id,
            episode_start: state.episode_start,
            wave: state.wave.index,
            wave_history: state.wave.history.iter().cloned().collect(),
            birth: state.birth,
            tracked_wallets: state.wallets.len(),
            early_wallets: state.early_wallets.len(),
            whale_density,
            buy_whale_density: density.buy_density(state, now).wallet_count,
            sell_whale_density: density.sell_density(state, now).wallet_count,
            episode_max_density: state.episode_max_density,
            last_whale_ts: state.last_whale_ts,
            exhaustion: exhaustion_detail(&self.aggregator.exhaustion_stats(state, now)),
            buy_sol: state.flow_totals.buy_sol,
            sell_sol: state.flow_totals.sell_sol,
            net_flow_sol: state.flow_totals.net_flow_sol(),
            sell_ratio: state.flow_totals.sell_ratio(),
            silent: self.silence.metrics(state),
            verdict: analyze(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::patterns::{CapitalVerdict, ExhaustionLabel};
    use crate::pipeline::types::{Direction, SignalKind, WhaleKind};
    use crate::pipeline::wallet::SilencePattern;
    use std::sync::atomic::{AtomicI64, Ordering};

    const TOKEN: &str = "TokenMint1111111111111111111111111111111111";

    fn make_flow(wallet: &str, timestamp: i64, direction: Direction, amount_sol: f64) -> FlowEvent {
        FlowEvent {
            wallet: wallet.to_string(),
            timestamp,
            direction,
            amount_sol,
            signature: format!("{}-{}-{}", wallet, timestamp, amount_sol),
            token: TOKEN.to_string(),
        }
    }

    fn replay_engine() -> TokenEngine {
        TokenEngine::replay(TOKEN, Arc::new(EngineConfig::default()))
    }

    #[test]
    fn test_first_whale_ignites() {
        let mut engine = replay_engine();
        let outcome = engine.process_flow(&make_flow("A", 1000, Direction::Buy, 12.0));

        assert_eq!(outcome.whales.len(), 1);
        assert_eq!(outcome.whales[0].kind, WhaleKind::SingleTx);
        assert!(outcome.signal.as_ref().unwrap().has(SignalKind::Timing));

        let transition = outcome.transition.unwrap();
        assert_eq!(transition.to, TokenPhase::Ignition);
        assert_eq!(transition.episode_id, 1);
        assert_eq!(transition.severity, Some(Severity::S1));
        assert_eq!(engine.state().birth, Some(1000));
    }

    #[test]
    fn test_small_flows_produce_empty_outcomes() {
        let mut engine = replay_engine();
        for i in 0..5 {
            let outcome = engine.process_flow(&make_flow("A", 1000 + i, Direction::Buy, 1.0));
            assert!(outcome.is_empty());
        }
        assert_eq!(engine.stats().flows_processed, 5);
        assert_eq!(engine.state().current_state, TokenPhase::Quiet);
    }

    #[test]
    fn test_foreign_token_ignored() {
        let mut engine = replay_engine();
        let mut flow = make_flow("A", 1000, Direction::Buy, 50.0);
        flow.token = "OtherMint".to_string();

        assert!(engine.process_flow(&flow).is_empty());
        assert_eq!(engine.stats().flows_foreign, 1);
        assert!(engine.state().wallets.is_empty());
        assert_eq!(engine.state().birth, None);
    }

    #[test]
    fn test_out_of_order_wallet_flow_dropped() {
        let mut engine = replay_engine();
        engine.process_flow(&make_flow("A", 1000, Direction::Buy, 1.0));
        let outcome = engine.process_flow(&make_flow("A", 990, Direction::Buy, 30.0));

        assert!(outcome.is_empty());
        assert_eq!(engine.stats().flows_out_of_order, 1);
        let wallet = engine.state().wallets.get("A").unwrap();
        assert_eq!(wallet.activity_count, 1);
        assert_eq!(wallet.last_seen, 1000);

        // Another wallet at an older chain time is still accepted
        let outcome = engine.process_flow(&make_flow("B", 995, Direction::Buy, 1.0));
        assert!(outcome.is_empty());
        assert_eq!(engine.stats().flows_processed, 2);
    }

    #[test]
    fn test_multiple_whale_events_merge_into_one_signal() {
        let mut engine = replay_engine();
        // 30 SOL crosses single-tx and 5m-cumulative at once
        let outcome = engine.process_flow(&make_flow("A", 1000, Direction::Buy, 30.0));

        assert_eq!(outcome.whales.len(), 2);
        assert_eq!(outcome.whales[0].kind, WhaleKind::SingleTx);
        assert_eq!(outcome.whales[1].kind, WhaleKind::Cumulative5m);
        let signal = outcome.signal.unwrap();
        assert_eq!(signal.signals, vec![SignalKind::Timing]);
        assert_eq!(engine.state().density_log.len(), 2);
    }

    #[test]
    fn test_wallet_cap_holds_across_flows() {
        let mut engine = replay_engine();
        let cap = engine.config().caps.max_active_wallets;

        for i in 0..cap + 10 {
            let wallet = format!("{:0>44}", i);
            engine.process_flow(&make_flow(&wallet, 1000 + i as i64, Direction::Buy, 0.5));
            assert!(engine.state().wallets.len() <= cap);
        }

        assert_eq!(engine.state().wallets.len(), cap);
        assert_eq!(engine.stats().wallets_evicted, 10);
        assert!(!engine.state().wallets.contains(&format!("{:0>44}", 0)));
        assert!(engine.state().wallets.contains(&format!("{:0>44}", cap + 9)));
    }

    #[test]
    fn test_evicted_early_wallet_leaves_early_set() {
        let mut config = EngineConfig::default();
        config.caps.max_active_wallets = 2;
        let mut engine = TokenEngine::replay(TOKEN, Arc::new(config));

        engine.process_flow(&make_flow("A", 1000, Direction::Buy, 12.0));
        assert!(engine.state().is_early("A"));

        engine.process_flow(&make_flow("B", 1001, Direction::Buy, 1.0));
        engine.process_flow(&make_flow("C", 1002, Direction::Buy, 1.0));
        assert!(!engine.state().wallets.contains("A"));
        assert!(!engine.state().is_early("A"));
    }

    #[test]
    fn test_tick_with_live_clock_reaches_quiet() {
        let wall = Arc::new(AtomicI64::new(1000));
        let wall_fn = wall.clone();
        let clock = ChainTimeClock::with_wall_clock(
            false,
            Box::new(move || wall_fn.load(Ordering::SeqCst)),
        );
        let mut engine = TokenEngine::new(TOKEN, Arc::new(EngineConfig::default()), clock);

        engine.process_flow(&make_flow("A", 1000, Direction::Buy, 12.0));
        assert_eq!(engine.state().current_state, TokenPhase::Ignition);

        wall.store(1599, Ordering::SeqCst);
        assert!(engine.tick().transition.is_none());

        wall.store(1600, Ordering::SeqCst);
        let transition = engine.tick().transition.unwrap();
        assert_eq!(transition.to, TokenPhase::Quiet);
        assert_eq!(transition.severity, None);
        assert_eq!(engine.stats().transitions, 2);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut engine = replay_engine();
        engine.process_flow(&make_flow("A", 1000, Direction::Buy, 12.0));
        engine.process_flow(&make_flow("B", 1010, Direction::Sell, 4.0));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.token, TOKEN);
        assert_eq!(snapshot.timestamp, 1010);
        assert_eq!(snapshot.phase, TokenPhase::Ignition);
        assert_eq!(snapshot.previous_phase, Some(TokenPhase::Quiet));
        assert_eq!(snapshot.seconds_in_phase, 10);
        assert_eq!(snapshot.last_severity, Some(Severity::S1));
        assert_eq!(snapshot.episode_id, 1);
        assert_eq!(snapshot.tracked_wallets, 2);
        assert_eq!(snapshot.early_wallets, 1);
        assert_eq!(snapshot.whale_density, 1);
        assert_eq!(snapshot.buy_whale_density, 1);
        assert_eq!(snapshot.sell_whale_density, 0);
        assert!((snapshot.net_flow_sol - 8.0).abs() < 1e-9);
        assert!((snapshot.sell_ratio - 0.25).abs() < 1e-9);
        assert_eq!(snapshot.silent.total_count, 2);
        assert_eq!(snapshot.silent.silent_count, 0);
        assert_eq!(snapshot.verdict.capital, CapitalVerdict::InflowStrong);
        assert_eq!(snapshot.verdict.wave_trend_detail, "1 wallets (wave 1)");
    }

    #[test]
    fn test_silence_marks_flow_through_engine() {
        let mut engine = replay_engine();
        engine.process_flow(&make_flow("A", 1000, Direction::Buy, 12.0));
        engine.process_flow(&make_flow("B", 1010, Direction::Buy, 1.0));

        // A idle for more than the cohort window while B keeps trading
        engine.process_flow(&make_flow("B", 1200, Direction::Buy, 1.0));
        let a = engine.state().wallets.get("A").unwrap();
        assert_eq!(a.silence.unwrap().pattern, SilencePattern::CohortComparison);
        assert_eq!(engine.snapshot().silent.silent_count, 1);
        assert_eq!(engine.snapshot().verdict.exhaustion_label, ExhaustionLabel::Critical);

        // Selling does not bring A back, buying does
        engine.process_flow(&make_flow("A", 1210, Direction::Sell, 1.0));
        assert!(engine.state().wallets.get("A").unwrap().is_silent());
        engine.process_flow(&make_flow("A", 1220, Direction::Buy, 1.0));
        assert!(!engine.state().wallets.get("A").unwrap().is_silent());
        assert_eq!(engine.snapshot().verdict.exhaustion_label, ExhaustionLabel::None);
    }
}
