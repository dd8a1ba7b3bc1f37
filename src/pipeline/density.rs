//! Whale density over a short trailing window
//!
//! Density is the number of distinct whale wallets in the window divided by the
//! window length. The episode maximum gates the PRESSURE_PEAKING transition.

use super::config::{Caps, Thresholds};
use super::state::{TokenState, WhaleMark};
use super::types::{Direction, WhaleEvent};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    pub wallet_count: usize,
    /// Distinct wallets per second of window
    pub rate: f64,
}

#[derive(Debug, Clone)]
pub struct DensityTracker {
    window_secs: i64,
    max_entries: usize,
}

impl DensityTracker {
    pub fn new(window_secs: i64, max_entries: usize) -> Self {
        Self {
            window_secs,
            max_entries,
        }
    }

    pub fn from_config(thresholds: &Thresholds, caps: &Caps) -> Self {
        Self::new(thresholds.density_window_secs, caps.max_whale_log_entries)
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// Record a whale event and advance the last/previous whale timestamps.
    ///
    /// Several whale events from one flow share a timestamp; the previous
    /// timestamp only shifts when time advances.
    pub fn add(&self, state: &mut TokenState, whale: &WhaleEvent) {
        let ts = whale.timestamp;
        match state.last_whale_ts {
            Some(last) if ts <= last => {}
            last => {
                state.prev_whale_ts = last;
                state.last_whale_ts = Some(ts);
            }
        }

        state.density_log.push_back(WhaleMark {
            timestamp: ts,
            wallet: whale.wallet.clone(),
            direction: whale.direction,
        });

        let cutoff = ts - self.window_secs;
        while state
            .density_log
            .front()
            .is_some_and(|mark| mark.timestamp < cutoff)
        {
            state.density_log.pop_front();
        }
        while state.density_log.len() > self.max_entries {
            state.density_log.pop_front();
        }
    }

    pub fn current_density(&self, state: &TokenState, now: i64) -> Density {
        self.density_where(state, now, |_| true)
    }

    pub fn buy_density(&self, state: &TokenState, now: i64) -> Density {
        self.density_where(state, now, |mark| mark.direction == Direction::Buy)
    }

    pub fn sell_density(&self, state: &TokenState, now: i64) -> Density {
        self.density_where(state, now, |mark| mark.direction == Direction::Sell)
    }

    /// Distinct whale wallets with a whale event strictly less than `lookback` seconds ago
    pub fn distinct_whales_within(&self, state: &TokenState, now: i64, lookback_secs: i64) -> usize {
        state
            .density_log
            .iter()
            .filter(|mark| now - mark.timestamp < lookback_secs)
            .map(|mark| mark.wallet.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// True only for a strictly greater density; the maximum is updated in that case
    pub fn is_episode_max(&self, state: &mut TokenState, candidate: f64) -> bool {
        if candidate > state.episode_max_density {
            state.episode_max_density = candidate;
            true
        } else {
            false
        }
    }

    fn density_where(
        &self,
        state: &TokenState,
        now: i64,
        keep: impl Fn(&WhaleMark) -> bool,
    ) -> Density {
        let cutoff = now - self.window_secs;
        let wallet_count = state
            .density_log
            .iter()
            .filter(|mark| mark.timestamp >= cutoff && keep(mark))
            .map(|mark| mark.wallet.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        Density {
            wallet_count,
            rate: wallet_count as f64 / self.window_secs as f64,
        }
    }
}
