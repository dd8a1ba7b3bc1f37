//! Event-driven silence marks on wallets
//!
//! Complements the time-based exhaustion rule with a direction-aware view:
//!
//! ```text
//! flow (buy)          → clears the trading wallet's mark
//! flow (any)          → COHORT_COMPARISON: wallets idle past the cohort window are marked,
//!                       recently active ones are cleared unless their last trade was a sell
//! → PRESSURE_PEAKING  → STOPPED_BEFORE_PEAK: every wallet not trading right now is marked
//! ```
//!
//! A wallet whose last action was a sell never leaves silence by recency
//! alone. Marks feed the pattern verdict and the silent metrics in snapshots;
//! the exhaustion signal itself stays on its own time-based rule.

use super::config::Thresholds;
use super::state::TokenState;
use super::types::{Direction, FlowEvent, TokenPhase};
use super::wallet::{SilenceMark, SilencePattern, WalletState};
use serde::{Deserialize, Serialize};

/// Silent wallets among those with any activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SilentMetrics {
    pub silent_count: usize,
    pub total_count: usize,
    pub silent_pct: f64,
}

#[derive(Debug, Clone)]
pub struct SilenceTracker {
    cohort_silence_secs: i64,
}

impl SilenceTracker {
    pub fn new(cohort_silence_secs: i64) -> Self {
        Self {
            cohort_silence_secs,
        }
    }

    pub fn from_thresholds(thresholds: &Thresholds) -> Self {
        Self::new(thresholds.cohort_silence_secs)
    }

    /// A buy brings the wallet back; a sell leaves the mark in place
    pub fn on_wallet_trade(&self, wallet: &mut WalletState, flow: &FlowEvent) {
        if flow.direction == Direction::Buy && wallet.silence.take().is_some() {
            log::debug!("{} re-engaged with a buy at {}", wallet.address, flow.timestamp);
        }
    }

    /// Cohort comparison after every accepted flow
    pub fn on_token_activity(&self, state: &mut TokenState, now: i64) {
        let cutoff = now - self.cohort_silence_secs;
        for wallet in state.wallets.values_mut() {
            if wallet.activity_count == 0 {
                continue;
            }

            if wallet.last_seen < cutoff {
                if wallet.silence.is_none() {
                    wallet.silence = Some(SilenceMark {
                        pattern: SilencePattern::CohortComparison,
                        since: now,
                    });
                }
            } else if wallet.silence.is_some() && wallet.last_direction != Some(Direction::Sell) {
                wallet.silence = None;
            }
        }
    }

    /// Entering PRESSURE_PEAKING marks every wallet that is not trading at `now`
    pub fn on_transition(&self, state: &mut TokenState, to: TokenPhase, now: i64) {
        if to != TokenPhase::PressurePeaking {
            return;
        }

        let mut marked = 0;
        for wallet in state.wallets.values_mut() {
            if wallet.activity_count > 0 && wallet.last_seen < now && wallet.silence.is_none() {
                wallet.silence = Some(SilenceMark {
                    pattern: SilencePattern::StoppedBeforePeak,
                    since: now,
                });
                marked += 1;
            }
        }
        if marked > 0 {
            log::debug!("{}: {} wallet(s) stopped before the peak", state.token, marked);
        }
    }

    pub fn metrics(&self, state: &TokenState) -> SilentMetrics {
        let (silent_count, total_count) = state
            .wallets
            .values()
            .filter(|wallet| wallet.activity_count > 0)
            .fold((0, 0), |(silent, total), wallet| {
                (silent + usize::from(wallet.is_silent()), total + 1)
            });

        SilentMetrics {
            silent_count,
            total_count,
            silent_pct: if total_count > 0 {
                silent_count as f64 / total_count as f64
            } else {
                0.0
            },
        }
    }
}
