//! Wallet behaviour rules
//!
//! Four threshold rules, each auditable on its own:
//! - Timing: did the wallet show up within the early window after token birth
//! - Coordination: did enough distinct wallets whale inside a short window
//! - Persistence: does the wallet keep coming back over distinct minutes
//! - Exhaustion: has the early cohort gone quiet with nobody replacing it
//!
//! The detector holds only thresholds. All state lives on `WalletState` and
//! `TokenState` and is passed in by reference.

use super::config::{Caps, Thresholds};
use super::state::{TokenState, WhaleMark};
use super::types::{CoordinationDirection, Direction, WhaleEvent};
use super::wallet::WalletState;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct TimingResult {
    pub is_early: bool,
    pub seconds_after_birth: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationResult {
    pub coordinated: bool,
    /// Every distinct wallet in the window, sorted
    pub wallets: Vec<String>,
    pub direction: CoordinationDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustionResult {
    pub exhausted: bool,
    pub silent_count: usize,
    pub eligible_count: usize,
    /// Silent / eligible; 0.0 with no eligible wallets
    pub disengagement: f64,
    pub replacement: bool,
}

#[derive(Debug, Clone)]
pub struct WalletSignalDetector {
    early_window_secs: i64,
    coordination_window_secs: i64,
    coordination_min_wallets: usize,
    persistence_min_buckets: usize,
    persistence_max_gap_secs: i64,
    exhaustion_silence_secs: i64,
    exhaustion_disengagement: f64,
    replacement_lookback_secs: i64,
    max_buffer_entries: usize,
}

impl WalletSignalDetector {
    pub fn from_config(thresholds: &Thresholds, caps: &Caps) -> Self {
        Self {
            early_window_secs: thresholds.early_window_secs,
            coordination_window_secs: thresholds.coordination_window_secs,
            coordination_min_wallets: thresholds.coordination_min_wallets,
            persistence_min_buckets: thresholds.persistence_min_buckets,
            persistence_max_gap_secs: thresholds.persistence_max_gap_secs,
            exhaustion_silence_secs: thresholds.exhaustion_silence_secs,
            exhaustion_disengagement: thresholds.exhaustion_disengagement,
            replacement_lookback_secs: thresholds.replacement_lookback_secs,
            max_buffer_entries: caps.max_whale_log_entries,
        }
    }

    pub fn coordination_window_secs(&self) -> i64 {
        self.coordination_window_secs
    }

    /// Early iff first seen within the early window after birth.
    /// Unknown birth (mid-flight start) counts as early.
    pub fn check_timing(&self, wallet: &mut WalletState, birth: Option<i64>) -> TimingResult {
        let seconds_after_birth = birth.map(|b| wallet.first_seen - b);
        let is_early = seconds_after_birth.map_or(true, |delta| delta <= self.early_window_secs);

        if is_early {
            wallet.is_early = true;
        }

        TimingResult {
            is_early,
            seconds_after_birth,
        }
    }

    /// Append a whale event to the coordination buffer, enforcing the entry cap
    pub fn record_whale(&self, state: &mut TokenState, whale: &WhaleEvent) {
        state.coordination_buffer.push_back(WhaleMark {
            timestamp: whale.timestamp,
            wallet: whale.wallet.clone(),
            direction: whale.direction,
        });
        while state.coordination_buffer.len() > self.max_buffer_entries {
            state.coordination_buffer.pop_front();
        }
    }

    /// Expire buffer entries older than `now - window`, then count distinct wallets
    pub fn check_coordination(&self, state: &mut TokenState, now: i64) -> CoordinationResult {
        let cutoff = now - self.coordination_window_secs;
        while state
            .coordination_buffer
            .front()
            .is_some_and(|mark| mark.timestamp < cutoff)
        {
            state.coordination_buffer.pop_front();
        }

        let wallets: BTreeSet<&str> = state
            .coordination_buffer
            .iter()
            .map(|mark| mark.wallet.as_str())
            .collect();

        let buys = state
            .coordination_buffer
            .iter()
            .filter(|mark| mark.direction == Direction::Buy)
            .count();
        let direction = if buys == state.coordination_buffer.len() {
            CoordinationDirection::Buy
        } else if buys == 0 {
            CoordinationDirection::Sell
        } else {
            CoordinationDirection::Mixed
        };

        CoordinationResult {
            coordinated: wallets.len() >= self.coordination_min_wallets,
            wallets: wallets.into_iter().map(str::to_string).collect(),
            direction,
        }
    }

    /// Enough distinct minutes, all inside the maximum span
    pub fn check_persistence(&self, wallet: &WalletState) -> bool {
        wallet.minute_buckets.len() >= self.persistence_min_buckets
            && wallet.bucket_span_secs() <= self.persistence_max_gap_secs
    }

    /// Any non-early wallet active inside the replacement lookback
    pub fn has_replacement(&self, state: &TokenState, now: i64) -> bool {
        state.wallets.values().any(|wallet| {
            !state.is_early(&wallet.address)
                && wallet.is_active_within(now, self.replacement_lookback_secs)
        })
    }

    /// Token-level: fraction of eligible early wallets that went silent
    pub fn check_exhaustion(&self, state: &TokenState, now: i64) -> ExhaustionResult {
        let mut eligible_count = 0;
        let mut silent_count = 0;

        for wallet in state.wallets.values() {
            if !state.is_early(&wallet.address) {
                continue;
            }

            let anchor = state
                .episode_start
                .map_or(wallet.first_seen, |start| start.max(wallet.first_seen));
            if now - anchor <= self.exhaustion_silence_secs {
                continue;
            }
            eligible_count += 1;

            if now - wallet.last_seen > self.exhaustion_silence_secs {
                silent_count += 1;
            }
        }

        let replacement = self.has_replacement(state, now);

        if eligible_count == 0 {
            return ExhaustionResult {
                exhausted: false,
                silent_count,
                eligible_count,
                disengagement: 0.0,
                replacement,
            };
        }

        let disengagement = silent_count as f64 / eligible_count as f64;
        ExhaustionResult {
            exhausted: disengagement >= self.exhaustion_disengagement && !replacement,
            silent_count,
            eligible_count,
            disengagement,
            replacement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::EngineConfig;
    use crate::pipeline::types::WhaleKind;

    fn detector() -> WalletSignalDetector {
        let config = EngineConfig::default();
        WalletSignalDetector::from_config(&config.thresholds, &config.caps)
    }

    fn state() -> TokenState {
        TokenState::new("TOKEN", &EngineConfig::default())
    }

    fn whale(wallet: &str, ts: i64) -> WhaleEvent {
        WhaleEvent {
            wallet: wallet.to_string(),
            timestamp: ts,
            kind: WhaleKind::SingleTx,
            amount_sol: 12.0,
            threshold: 10.0,
            token: "TOKEN".to_string(),
            direction: Direction::Buy,
        }
    }

    /// Insert a wallet with the given activity and early flag
    fn seed_wallet(s: &mut TokenState, address: &str, first_seen: i64, last_seen: i64, early: bool) {
        let mut wallet = s.wallets.checkout(address);
        wallet.first_seen = first_seen;
        wallet.last_seen = last_seen;
        wallet.activity_count = 1;
        wallet.is_early = early;
        s.wallets.checkin(wallet);
        if early {
            s.early_wallets.insert(address.to_string());
        }
    }

    #[test]
    fn test_timing_early_and_late() {
        let d = detector();
        let mut wallet = WalletState::new("A".to_string(), 300, 900);

        wallet.first_seen = 1300;
        let result = d.check_timing(&mut wallet, Some(1000));
        assert!(result.is_early, "300s after birth is still early");
        assert_eq!(result.seconds_after_birth, Some(300));
        assert!(wallet.is_early);

        let mut late = WalletState::new("B".to_string(), 300, 900);
        late.first_seen = 1301;
        assert!(!d.check_timing(&mut late, Some(1000)).is_early);
        assert!(!late.is_early);
    }

    #[test]
    fn test_timing_unknown_birth_is_early() {
        let d = detector();
        let mut wallet = WalletState::new("A".to_string(), 300, 900);
        wallet.first_seen = 99_999;
        let result = d.check_timing(&mut wallet, None);
        assert!(result.is_early);
        assert_eq!(result.seconds_after_birth, None);
    }

    #[test]
    fn test_coordination_three_wallets_then_expiry() {
        let d = detector();
        let mut s = state();

        for (wallet, ts) in [("A", 0), ("B", 20), ("C", 40)] {
            d.record_whale(&mut s, &whale(wallet, ts));
        }
        let result = d.check_coordination(&mut s, 40);
        assert!(result.coordinated);
        assert_eq!(result.wallets, vec!["A", "B", "C"]);
        assert_eq!(result.direction, CoordinationDirection::Buy);

        // Unrelated whale well after the first three expired
        d.record_whale(&mut s, &whale("D", 300));
        let result = d.check_coordination(&mut s, 300);
        assert!(!result.coordinated);
        assert_eq!(result.wallets, vec!["D"]);
        assert_eq!(s.coordination_buffer.len(), 1);
    }

    #[test]
    fn test_coordination_counts_distinct_wallets() {
        let d = detector();
        let mut s = state();
        for ts in [0, 5, 10] {
            d.record_whale(&mut s, &whale("A", ts));
        }
        let mut sell = whale("B", 15);
        sell.direction = Direction::Sell;
        d.record_whale(&mut s, &sell);

        let result = d.check_coordination(&mut s, 15);
        assert!(!result.coordinated);
        assert_eq!(result.wallets.len(), 2);
        assert_eq!(result.direction, CoordinationDirection::Mixed);
    }

    #[test]
    fn test_persistence_rule() {
        let d = detector();
        let mut wallet = WalletState::new("A".to_string(), 300, 900);

        wallet.minute_buckets.insert(16);
        assert!(!d.check_persistence(&wallet), "single bucket");

        wallet.minute_buckets.insert(21);
        assert!(d.check_persistence(&wallet), "span of 300s is allowed");

        wallet.minute_buckets.insert(22);
        assert!(!d.check_persistence(&wallet), "span of 360s exceeds the gap");
    }

    #[test]
    fn test_exhaustion_zero_eligible_is_not_exhausted() {
        let d = detector();
        let mut s = state();
        s.episode_start = Some(1000);

        // Early wallets that arrived too recently to be eligible
        seed_wallet(&mut s, "A", 1000, 1000, true);
        seed_wallet(&mut s, "B", 1010, 1010, true);

        let result = d.check_exhaustion(&s, 1100);
        assert!(!result.exhausted);
        assert_eq!(result.eligible_count, 0);
        assert_eq!(result.disengagement, 0.0);

        // No wallets at all
        assert!(!d.check_exhaustion(&state(), 5000).exhausted);
    }

    #[test]
    fn test_exhaustion_fires_when_early_cohort_silent() {
        let d = detector();
        let mut s = state();
        s.episode_start = Some(1000);

        seed_wallet(&mut s, "A", 1000, 1010, true);
        seed_wallet(&mut s, "B", 1005, 1020, true);
        seed_wallet(&mut s, "C", 1010, 1200, true);

        // At 1250: all eligible, A and B silent (> 120s), C active
        let result = d.check_exhaustion(&s, 1250);
        assert_eq!(result.eligible_count, 3);
        assert_eq!(result.silent_count, 2);
        assert!(result.exhausted, "2/3 >= 0.60");
        assert!(!result.replacement);
    }

    #[test]
    fn test_exhaustion_blocked_by_replacement() {
        let d = detector();
        let mut s = state();
        s.episode_start = Some(1000);

        seed_wallet(&mut s, "A", 1000, 1010, true);
        seed_wallet(&mut s, "B", 1005, 1020, true);
        // Late wallet still trading inside the 300s lookback
        seed_wallet(&mut s, "N", 1400, 1450, false);

        let result = d.check_exhaustion(&s, 1500);
        assert_eq!(result.disengagement, 1.0);
        assert!(result.replacement);
        assert!(!result.exhausted);
    }

    #[test]
    fn test_exhaustion_anchor_uses_episode_start() {
        let d = detector();
        let mut s = state();
        // Wallet first seen long before the current episode started
        seed_wallet(&mut s, "A", 100, 100, true);
        s.episode_start = Some(5000);

        let result = d.check_exhaustion(&s, 5100);
        assert_eq!(result.eligible_count, 0, "anchored to episode start");

        let result = d.check_exhaustion(&s, 5121);
        assert_eq!(result.eligible_count, 1);
        assert!(result.exhausted);
    }
}
