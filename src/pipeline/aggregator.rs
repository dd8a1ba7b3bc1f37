//! Signal aggregation per whale event
//!
//! Runs the wallet rules for one whale event and folds whatever fired into a
//! single `WalletSignalEvent` with bounded sample lists.

use super::config::{Caps, Thresholds};
use super::signals::{ExhaustionResult, WalletSignalDetector};
use super::state::TokenState;
use super::types::{
    CoordinationDetail, ExhaustionDetail, PersistenceDetail, SignalDetails, SignalKind,
    TimingDetail, WalletSignalEvent, WhaleEvent,
};
use super::wallet::WalletState;

/// Float slack when comparing disengagement against the repeat step
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    detector: WalletSignalDetector,
    max_sample_wallets: usize,
    exhaustion_signal_step: f64,
}

impl SignalAggregator {
    pub fn from_config(thresholds: &Thresholds, caps: &Caps) -> Self {
        Self {
            detector: WalletSignalDetector::from_config(thresholds, caps),
            max_sample_wallets: caps.max_sample_wallets,
            exhaustion_signal_step: thresholds.exhaustion_signal_step,
        }
    }

    pub fn detector(&self) -> &WalletSignalDetector {
        &self.detector
    }

    /// Run timing (once per wallet), coordination and persistence for one whale event.
    ///
    /// Returns `None` when no rule fired.
    pub fn process(
        &self,
        whale: &WhaleEvent,
        wallet: &mut WalletState,
        state: &mut TokenState,
        now: i64,
    ) -> Option<WalletSignalEvent> {
        let mut signals = Vec::new();
        let mut details = SignalDetails::default();

        if !wallet.timing_checked {
            wallet.timing_checked = true;
            let timing = self.detector.check_timing(wallet, state.birth);
            if timing.is_early {
                state.early_wallets.insert(wallet.address.clone());
                state.wave.early_wallets.insert(wallet.address.clone());
                signals.push(SignalKind::Timing);
                details.timing = Some(TimingDetail {
                    is_early: true,
                    seconds_after_birth: timing.seconds_after_birth,
                });
            }
        }

        self.detector.record_whale(state, whale);
        let coordination = self.detector.check_coordination(state, now);
        if coordination.coordinated {
            let wallet_count = coordination.wallets.len();
            let sample_wallets = coordination
                .wallets
                .into_iter()
                .filter(|address| *address != whale.wallet)
                .take(self.max_sample_wallets)
                .collect();

            signals.push(SignalKind::Coordination);
            details.coordination = Some(CoordinationDetail {
                wallet_count,
                sample_wallets,
                window_secs: self.detector.coordination_window_secs(),
                direction: coordination.direction,
            });
        }

        if self.detector.check_persistence(wallet) {
            signals.push(SignalKind::Persistence);
            details.persistence = Some(PersistenceDetail {
                bucket_count: wallet.minute_buckets.len(),
                span_secs: wallet.bucket_span_secs(),
            });
        }

        if signals.is_empty() {
            return None;
        }

        Some(WalletSignalEvent {
            token: state.token.clone(),
            wallet: Some(wallet.address.clone()),
            timestamp: whale.timestamp,
            signals,
            details,
        })
    }

    /// Raw exhaustion figures, whether or not the rule fired
    pub fn exhaustion_stats(&self, state: &TokenState, now: i64) -> ExhaustionResult {
        self.detector.check_exhaustion(state, now)
    }

    /// Token-level exhaustion event, only if the rule fired
    pub fn check_exhaustion(&self, state: &TokenState, now: i64) -> Option<WalletSignalEvent> {
        let result = self.detector.check_exhaustion(state, now);
        if !result.exhausted {
            return None;
        }

        Some(exhaustion_event(state, &result, now))
    }

    /// Token-level exhaustion event, rate-limited inside one episode
    ///
    /// Fires on the first crossing of the disengagement threshold, then again
    /// only once disengagement has grown by `exhaustion_signal_step` since the
    /// last event. The baseline resets when a new episode starts.
    pub fn signal_exhaustion(&self, state: &mut TokenState, now: i64) -> Option<WalletSignalEvent> {
        let result = self.detector.check_exhaustion(state, now);
        if !result.exhausted {
            return None;
        }

        if let Some(last) = state.last_exhaustion_signal {
            if result.disengagement + STEP_EPSILON < last + self.exhaustion_signal_step {
                return None;
            }
        }
        state.last_exhaustion_signal = Some(result.disengagement);

        log::info!(
            "🔕 {} early cohort {:.0}% silent ({}/{})",
            state.token,
            result.disengagement * 100.0,
            result.silent_count,
            result.eligible_count
        );
        Some(exhaustion_event(state, &result, now))
    }
}

fn exhaustion_event(state: &TokenState, result: &ExhaustionResult, now: i64) -> WalletSignalEvent {
    WalletSignalEvent {
        token: state.token.clone(),
        wallet: None,
        timestamp: now,
        signals: vec![SignalKind::Exhaustion],
        details: SignalDetails {
            exhaustion: Some(exhaustion_detail(result)),
            ..SignalDetails::default()
        },
    }
}

pub fn exhaustion_detail(result: &ExhaustionResult) -> ExhaustionDetail {
    ExhaustionDetail {
        silent_count: result.silent_count,
        eligible_count: result.eligible_count,
        disengagement_pct: (result.disengagement * 100.0).round() / 100.0,
        replacement: result.replacement,
    }
}
