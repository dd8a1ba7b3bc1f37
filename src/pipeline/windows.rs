//! Rolling time windows for per-wallet flow sums
//!
//! Each window keeps (timestamp, amount) entries in arrival order plus a running
//! sum, so `add` is amortized O(1): expiry pops from the front, append pushes to
//! the back. Entries at or before `now - horizon` are expired, which keeps the
//! sum equal to the total of entries with timestamp `> now - horizon`.

use super::config::Caps;
use super::types::{Direction, FlowEvent};
use super::wallet::WalletState;
use std::collections::VecDeque;

/// Sum of flow amounts over a fixed trailing horizon
#[derive(Debug, Clone)]
pub struct RollingWindow {
    horizon_secs: i64,
    entries: VecDeque<(i64, f64)>,
    sum: f64,
}

impl RollingWindow {
    pub fn new(horizon_secs: i64) -> Self {
        Self {
            horizon_secs,
            entries: VecDeque::new(),
            sum: 0.0,
        }
    }

    /// Drop entries with timestamp `<= now - horizon`
    pub fn expire(&mut self, now: i64) {
        let cutoff = now - self.horizon_secs;
        while let Some(&(ts, amount)) = self.entries.front() {
            if ts > cutoff {
                break;
            }
            self.entries.pop_front();
            self.sum -= amount;
        }

        // float drift after many subtractions
        if self.entries.is_empty() || self.sum < 0.0 {
            self.sum = 0.0;
        }
    }

    pub fn push(&mut self, ts: i64, amount: f64) {
        self.entries.push_back((ts, amount));
        self.sum += amount;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn horizon_secs(&self) -> i64 {
        self.horizon_secs
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i64, f64)> {
        self.entries.iter()
    }
}

/// Applies one flow to a wallet's windows, buckets and counters
#[derive(Debug, Clone)]
pub struct TimeWindowManager {
    max_minute_buckets: usize,
}

impl TimeWindowManager {
    pub fn new(max_minute_buckets: usize) -> Self {
        Self { max_minute_buckets }
    }

    pub fn from_caps(caps: &Caps) -> Self {
        Self::new(caps.max_minute_buckets)
    }

    /// Flows for one wallet must arrive in non-decreasing timestamp order.
    pub fn add(&self, wallet: &mut WalletState, flow: &FlowEvent) {
        let now = flow.timestamp;

        wallet.window_5m.expire(now);
        wallet.window_15m.expire(now);
        wallet.window_5m.push(now, flow.amount_sol);
        wallet.window_15m.push(now, flow.amount_sol);

        wallet.minute_buckets.insert(now.div_euclid(60));
        while wallet.minute_buckets.len() > self.max_minute_buckets {
            wallet.minute_buckets.pop_first();
        }

        if wallet.activity_count == 0 {
            wallet.first_seen = now;
        }
        wallet.last_seen = now;
        wallet.activity_count += 1;

        match flow.direction {
            Direction::Buy => {
                wallet.total_buy_sol += flow.amount_sol;
                wallet.buy_count += 1;
            }
            Direction::Sell => {
                wallet.total_sell_sol += flow.amount_sol;
                wallet.sell_count += 1;
            }
        }
        wallet.last_direction = Some(flow.direction);
    }
}
