//! Token phase state machine
//!
//! ```text
//! QUIET → IGNITION → COORDINATION_SPIKE → EARLY_PHASE → PERSISTENCE_CONFIRMED
//!       → PARTICIPATION_EXPANSION → PRESSURE_PEAKING → EXHAUSTION_DETECTED
//!       → DISSIPATION → QUIET
//!
//! reverse: EXHAUSTION_DETECTED → PARTICIPATION_EXPANSION  (whale burst)
//!          DISSIPATION → IGNITION                         (reactivation)
//! ```
//!
//! Evaluation order:
//! 1. Episode boundary. Long whale silence forces QUIET from any other phase.
//! 2. The forward guard of the current phase.
//! 3. The reverse guard, for EXHAUSTION_DETECTED and DISSIPATION only.
//!
//! At most one transition per evaluation. Every transition is ranked by the
//! severity calculator before it is returned.

use super::aggregator::SignalAggregator;
use super::config::EngineConfig;
use super::density::DensityTracker;
use super::episode::EpisodeTracker;
use super::severity::SeverityCalculator;
use super::state::TokenState;
use super::types::{
    Severity, StateTransitionEvent, TokenPhase, TransitionDetails, TransitionTrigger,
};

type Candidate = (TokenPhase, TransitionTrigger, TransitionDetails);

/// Phase guard thresholds
#[derive(Debug, Clone)]
struct Guards {
    spike_min_early_wallets: usize,
    early_phase_min_secs: i64,
    persistence_confirmed_min_wallets: usize,
    expansion_lookback_secs: i64,
    pressure_min_whales: usize,
    dissipation_lookback_secs: i64,
    dissipation_min_active: usize,
    reversal_lookback_secs: i64,
    reversal_min_whales: usize,
    episode_end_silence_secs: i64,
    max_sample_wallets: usize,
}

pub struct TokenStateMachine {
    guards: Guards,
    episodes: EpisodeTracker,
    density: DensityTracker,
    severity: SeverityCalculator,
}

impl TokenStateMachine {
    pub fn new(config: &EngineConfig) -> Self {
        let t = &config.thresholds;
        Self {
            guards: Guards {
                spike_min_early_wallets: t.spike_min_early_wallets,
                early_phase_min_secs: t.early_phase_min_secs,
                persistence_confirmed_min_wallets: t.persistence_confirmed_min_wallets,
                expansion_lookback_secs: t.expansion_lookback_secs,
                pressure_min_whales: t.pressure_min_whales,
                dissipation_lookback_secs: t.dissipation_lookback_secs,
                dissipation_min_active: t.dissipation_min_active,
                reversal_lookback_secs: t.reversal_lookback_secs,
                reversal_min_whales: t.reversal_min_whales,
                episode_end_silence_secs: t.episode_end_silence_secs,
                max_sample_wallets: config.caps.max_sample_wallets,
            },
            episodes: EpisodeTracker::from_config(t, &config.caps),
            density: DensityTracker::from_config(t, &config.caps),
            severity: SeverityCalculator::new(),
        }
    }

    pub fn density(&self) -> &DensityTracker {
        &self.density
    }

    pub fn episodes(&self) -> &EpisodeTracker {
        &self.episodes
    }

    pub fn last_severity(&self) -> Option<Severity> {
        self.severity.last_severity()
    }

    pub fn evaluate(
        &mut self,
        state: &mut TokenState,
        aggregator: &SignalAggregator,
        now: i64,
    ) -> Option<StateTransitionEvent> {
        state.now = Some(now);

        if state.current_state != TokenPhase::Quiet && self.episodes.check_boundary(state, now) {
            let details = TransitionDetails {
                silence_secs: self.episodes.whale_silence_secs(state, now),
                ..TransitionDetails::default()
            };
            return Some(self.apply(
                state,
                (TokenPhase::Quiet, TransitionTrigger::EpisodeSilence, details),
                now,
            ));
        }

        let forward = match state.current_state {
            TokenPhase::Quiet => self.check_ignition(state, now),
            TokenPhase::Ignition => self.check_coordination_spike(state),
            TokenPhase::CoordinationSpike => self.check_early_phase(state, now),
            TokenPhase::EarlyPhase => self.check_persistence_confirmed(state, aggregator),
            TokenPhase::PersistenceConfirmed => self.check_participation_expansion(state, now),
            TokenPhase::ParticipationExpansion => self.check_pressure_peaking(state, now),
            TokenPhase::PressurePeaking => self.check_exhaustion_detected(state, aggregator, now),
            TokenPhase::ExhaustionDetected => self.check_dissipation(state, now),
            // DISSIPATION leaves forward only through the episode boundary
            TokenPhase::Dissipation => None,
        };

        let candidate = forward.or_else(|| match state.current_state {
            TokenPhase::ExhaustionDetected => self.check_whale_burst_reversal(state, now),
            TokenPhase::Dissipation => self.check_reactivation(state, now),
            _ => None,
        })?;

        Some(self.apply(state, candidate, now))
    }

    /// Any whale since QUIET was entered, and not already stale
    fn check_ignition(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let last_whale = state.last_whale_ts?;
        if state.state_changed_at.is_some_and(|changed| last_whale < changed) {
            return None;
        }
        if now - last_whale >= self.guards.episode_end_silence_secs {
            return None;
        }

        let trigger = if state.episode_id > 0 && self.episodes.check_reignition(state, now) {
            TransitionTrigger::Reignition
        } else {
            TransitionTrigger::NewEpisode
        };

        let details = TransitionDetails {
            early_wallet_count: Some(state.early_wallets.len()),
            ..TransitionDetails::default()
        };
        Some((TokenPhase::Ignition, trigger, details))
    }

    fn check_coordination_spike(&self, state: &TokenState) -> Option<Candidate> {
        let active_early = self.active_early_wallets(state);
        if active_early.len() < self.guards.spike_min_early_wallets {
            return None;
        }

        let details = TransitionDetails {
            coordinated_count: Some(active_early.len()),
            early_wallet_count: Some(active_early.len()),
            sample_wallets: self.sample(active_early),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::CoordinationSpike,
            TransitionTrigger::CoordinatedEarlyWallets,
            details,
        ))
    }

    fn check_early_phase(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let duration = state.seconds_in_state(now);
        if duration < self.guards.early_phase_min_secs {
            return None;
        }

        let details = TransitionDetails {
            duration_secs: Some(duration),
            early_wallet_count: Some(self.active_early_wallets(state).len()),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::EarlyPhase,
            TransitionTrigger::SustainedCoordination,
            details,
        ))
    }

    fn check_persistence_confirmed(
        &self,
        state: &TokenState,
        aggregator: &SignalAggregator,
    ) -> Option<Candidate> {
        let persistent: Vec<&str> = state
            .wallets
            .values()
            .filter(|wallet| aggregator.detector().check_persistence(wallet))
            .map(|wallet| wallet.address.as_str())
            .collect();
        if persistent.len() < self.guards.persistence_confirmed_min_wallets {
            return None;
        }

        let details = TransitionDetails {
            persistent_count: Some(persistent.len()),
            sample_wallets: self.sample(persistent),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::PersistenceConfirmed,
            TransitionTrigger::PersistentWallets,
            details,
        ))
    }

    fn check_participation_expansion(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let newcomers: Vec<&str> = state
            .wallets
            .values()
            .filter(|wallet| {
                !state.is_early(&wallet.address)
                    && wallet.is_active_within(now, self.guards.expansion_lookback_secs)
            })
            .map(|wallet| wallet.address.as_str())
            .collect();
        if newcomers.is_empty() {
            return None;
        }

        let details = TransitionDetails {
            new_wallet_count: Some(newcomers.len()),
            sample_wallets: self.sample(newcomers),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::ParticipationExpansion,
            TransitionTrigger::NewWalletsActive,
            details,
        ))
    }

    fn check_pressure_peaking(&self, state: &mut TokenState, now: i64) -> Option<Candidate> {
        let density = self.density.current_density(state, now);
        if density.wallet_count < self.guards.pressure_min_whales {
            return None;
        }
        if !self.density.is_episode_max(state, density.rate) {
            return None;
        }

        let details = TransitionDetails {
            whale_count: Some(density.wallet_count),
            density: Some(density.rate),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::PressurePeaking,
            TransitionTrigger::DensityPeak,
            details,
        ))
    }

    fn check_exhaustion_detected(
        &self,
        state: &TokenState,
        aggregator: &SignalAggregator,
        now: i64,
    ) -> Option<Candidate> {
        let event = aggregator.check_exhaustion(state, now)?;
        let details = TransitionDetails {
            exhaustion: event.details.exhaustion,
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::ExhaustionDetected,
            TransitionTrigger::EarlyCohortSilent,
            details,
        ))
    }

    fn check_dissipation(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let active = state
            .wallets
            .values()
            .filter(|wallet| wallet.is_active_within(now, self.guards.dissipation_lookback_secs))
            .count();
        if active >= self.guards.dissipation_min_active {
            return None;
        }

        let details = TransitionDetails {
            active_wallet_count: Some(active),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::Dissipation,
            TransitionTrigger::ActivityCollapsed,
            details,
        ))
    }

    fn check_whale_burst_reversal(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let burst = self
            .density
            .distinct_whales_within(state, now, self.guards.reversal_lookback_secs);
        if burst < self.guards.reversal_min_whales {
            return None;
        }

        let details = TransitionDetails {
            whale_count: Some(burst),
            ..TransitionDetails::default()
        };
        Some((
            TokenPhase::ParticipationExpansion,
            TransitionTrigger::WhaleBurstReversal,
            details,
        ))
    }

    fn check_reactivation(&self, state: &TokenState, now: i64) -> Option<Candidate> {
        let last_whale = state.last_whale_ts?;
        if state.state_changed_at.is_some_and(|changed| last_whale < changed) {
            return None;
        }
        if now - last_whale >= self.guards.reversal_lookback_secs {
            return None;
        }

        let trigger = if self.episodes.check_reignition(state, now) {
            TransitionTrigger::SuddenReactivation
        } else {
            TransitionTrigger::NewEpisode
        };

        let details = TransitionDetails {
            early_wallet_count: Some(state.early_wallets.len()),
            ..TransitionDetails::default()
        };
        Some((TokenPhase::Ignition, trigger, details))
    }

    /// Execute a transition: episode/wave side effects, phase update, severity
    fn apply(
        &mut self,
        state: &mut TokenState,
        (to, trigger, details): Candidate,
        now: i64,
    ) -> StateTransitionEvent {
        match trigger {
            TransitionTrigger::NewEpisode => self.episodes.start_new(state, now),
            TransitionTrigger::SuddenReactivation => self.episodes.advance_wave(state, now),
            _ => {}
        }

        if let Some(exhaustion) = &details.exhaustion {
            state.wave.peak_disengagement =
                state.wave.peak_disengagement.max(exhaustion.disengagement_pct);
        }

        let from = state.current_state;
        state.previous_state = Some(from);
        state.current_state = to;
        state.state_changed_at = Some(now);

        let severity = self.severity.calculate(to, trigger, &details);

        log::info!(
            "📊 {} episode {}: {} -> {} [{}] ({:?})",
            state.token,
            state.episode_id,
            from,
            to,
            severity.map_or("-", |s| s.as_str()),
            trigger
        );

        StateTransitionEvent {
            token: state.token.clone(),
            timestamp: now,
            episode_id: state.episode_id,
            from,
            to,
            trigger,
            details,
            severity,
        }
    }

    /// Early wallets in the map that were active in the current episode, sorted
    fn active_early_wallets<'a>(&self, state: &'a TokenState) -> Vec<&'a str> {
        let episode_start = state.episode_start.unwrap_or(i64::MIN);
        let mut wallets: Vec<&str> = state
            .wallets
            .values()
            .filter(|wallet| {
                state.is_early(&wallet.address)
                    && wallet.activity_count > 0
                    && wallet.last_seen >= episode_start
            })
            .map(|wallet| wallet.address.as_str())
            .collect();
        wallets.sort_unstable();
        wallets
    }

    fn sample(&self, mut wallets: Vec<&str>) -> Vec<String> {
        wallets.sort_unstable();
        wallets
            .into_iter()
            .take(self.guards.max_sample_wallets)
            .map(str::to_string)
            .collect()
    }
}
