//! Per-wallet state inside one token's processing context

use super::types::{Direction, WhaleKind};
use super::windows::RollingWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fired-once flags, one per whale kind. Never reset for the wallet's tracked life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WhaleLatches {
    pub single_tx: bool,
    pub cum_5m: bool,
    pub cum_15m: bool,
}

impl WhaleLatches {
    pub fn is_set(&self, kind: WhaleKind) -> bool {
        match kind {
            WhaleKind::SingleTx => self.single_tx,
            WhaleKind::Cumulative5m => self.cum_5m,
            WhaleKind::Cumulative15m => self.cum_15m,
        }
    }

    pub fn set(&mut self, kind: WhaleKind) {
        match kind {
            WhaleKind::SingleTx => self.single_tx = true,
            WhaleKind::Cumulative5m => self.cum_5m = true,
            WhaleKind::Cumulative15m => self.cum_15m = true,
        }
    }

    pub fn any(&self) -> bool {
        self.single_tx || self.cum_5m || self.cum_15m
    }
}

/// How a wallet came to be marked silent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SilencePattern {
    /// Inactive for longer than the cohort window while the token kept trading
    CohortComparison,
    /// Already inactive when the token reached PRESSURE_PEAKING
    StoppedBeforePeak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceMark {
    pub pattern: SilencePattern,
    pub since: i64,
}

#[derive(Debug, Clone)]
pub struct WalletState {
    pub address: String,

    pub window_5m: RollingWindow,
    pub window_15m: RollingWindow,

    /// Distinct `timestamp / 60` buckets with activity, oldest dropped past the cap
    pub minute_buckets: BTreeSet<i64>,

    pub first_seen: i64,
    pub last_seen: i64,
    pub activity_count: u64,

    pub latches: WhaleLatches,

    pub total_buy_sol: f64,
    pub total_sell_sol: f64,
    pub buy_count: u64,
    pub sell_count: u64,
    pub last_direction: Option<Direction>,

    pub is_early: bool,
    pub timing_checked: bool,

    /// Set by the silence tracker; only a buy clears it
    pub silence: Option<SilenceMark>,
}

impl WalletState {
    pub fn new(address: String, window_5m_secs: i64, window_15m_secs: i64) -> Self {
        Self {
            address,
            window_5m: RollingWindow::new(window_5m_secs),
            window_15m: RollingWindow::new(window_15m_secs),
            minute_buckets: BTreeSet::new(),
            first_seen: 0,
            last_seen: 0,
            activity_count: 0,
            latches: WhaleLatches::default(),
            total_buy_sol: 0.0,
            total_sell_sol: 0.0,
            buy_count: 0,
            sell_count: 0,
            last_direction: None,
            is_early: false,
            timing_checked: false,
            silence: None,
        }
    }

    /// Seen at least once and last seen strictly less than `lookback` seconds ago
    pub fn is_active_within(&self, now: i64, lookback_secs: i64) -> bool {
        self.activity_count > 0 && now - self.last_seen < lookback_secs
    }

    pub fn is_silent(&self) -> bool {
        self.silence.is_some()
    }

    pub fn net_flow_sol(&self) -> f64 {
        self.total_buy_sol - self.total_sell_sol
    }

    /// Span in seconds between the earliest and latest visited minute bucket
    pub fn bucket_span_secs(&self) -> i64 {
        match (self.minute_buckets.first(), self.minute_buckets.last()) {
            (Some(first), Some(last)) => (last - first) * 60,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latches_are_independent() {
        let mut latches = WhaleLatches::default();
        assert!(!latches.any());

        latches.set(WhaleKind::Cumulative5m);
        assert!(latches.is_set(WhaleKind::Cumulative5m));
        assert!(!latches.is_set(WhaleKind::SingleTx));
        assert!(!latches.is_set(WhaleKind::Cumulative15m));
        assert!(latches.any());
    }

    #[test]
    fn test_fresh_wallet_is_never_active() {
        let wallet = WalletState::new("W".repeat(44), 300, 900);
        assert!(!wallet.is_active_within(0, 300));
        assert_eq!(wallet.bucket_span_secs(), 0);
    }
}
