//! Per-token state: the root of everything the engine mutates
//!
//! One `TokenState` exists per tracked token and is owned by exactly one
//! processing context. Detectors receive it by `&mut` reference; none of them
//! keep their own copy of wallet or token data between calls.
//!
//! Memory is bounded:
//! - `WalletMap` holds at most `max_active_wallets` entries, LRU eviction
//! - the density log and coordination buffer are time-expired and entry-capped
//! - wave history is capped
//! - evicted wallets are dropped from the early-wallet sets

use super::config::EngineConfig;
use super::types::{Direction, FlowEvent, TokenPhase};
use super::wallet::WalletState;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// Insertion-ordered wallet map with least-recently-used eviction
///
/// Order is oldest-touched first. A wallet is checked out while a flow is being
/// processed and checked back in at the most-recent end, so the wallet just
/// touched is never the eviction victim.
///
/// `shift_remove` keeps that order at O(n) per touch, bounded by `cap`.
#[derive(Debug, Clone)]
pub struct WalletMap {
    wallets: IndexMap<String, WalletState>,
    cap: usize,
    window_5m_secs: i64,
    window_15m_secs: i64,
}

impl WalletMap {
    pub fn new(cap: usize, window_5m_secs: i64, window_15m_secs: i64) -> Self {
        Self {
            wallets: IndexMap::with_capacity(cap.min(1024) + 1),
            cap,
            window_5m_secs,
            window_15m_secs,
        }
    }

    /// Remove the wallet for processing, or build a fresh one for a new address
    pub fn checkout(&mut self, address: &str) -> WalletState {
        self.wallets.shift_remove(address).unwrap_or_else(|| {
            WalletState::new(
                address.to_string(),
                self.window_5m_secs,
                self.window_15m_secs,
            )
        })
    }

    /// Reinsert as most recently used; returns addresses evicted to stay within the cap
    pub fn checkin(&mut self, wallet: WalletState) -> Vec<String> {
        self.wallets.insert(wallet.address.clone(), wallet);

        let mut evicted = Vec::new();
        while self.wallets.len() > self.cap {
            match self.wallets.shift_remove_index(0) {
                Some((address, _)) => evicted.push(address),
                None => break,
            }
        }
        evicted
    }

    pub fn get(&self, address: &str) -> Option<&WalletState> {
        self.wallets.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.wallets.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Oldest-touched first
    pub fn values(&self) -> impl Iterator<Item = &WalletState> {
        self.wallets.values()
    }

    /// Mutates in place without touching recency
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut WalletState> {
        self.wallets.values_mut()
    }
}

/// One whale event as remembered by the density log and coordination buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhaleMark {
    pub timestamp: i64,
    pub wallet: String,
    pub direction: Direction,
}

/// Closed wave inside an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub wave: u32,
    pub start: i64,
    pub end: i64,
    pub early_wallet_count: usize,
    pub peak_disengagement: f64,
}

/// Wave tracking, reset on every new episode
#[derive(Debug, Clone, Default)]
pub struct WaveState {
    /// 0 before the first episode, then 1-based
    pub index: u32,
    pub start: Option<i64>,
    pub early_wallets: BTreeSet<String>,
    pub history: VecDeque<WaveRecord>,
    pub peak_disengagement: f64,
}

/// Token-level directional totals across every accepted flow
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowTotals {
    pub buy_sol: f64,
    pub sell_sol: f64,
    pub buy_count: u64,
    pub sell_count: u64,
}

impl FlowTotals {
    pub fn record(&mut self, flow: &FlowEvent) {
        match flow.direction {
            Direction::Buy => {
                self.buy_sol += flow.amount_sol;
                self.buy_count += 1;
            }
            Direction::Sell => {
                self.sell_sol += flow.amount_sol;
                self.sell_count += 1;
            }
        }
    }

    pub fn net_flow_sol(&self) -> f64 {
        self.buy_sol - self.sell_sol
    }

    /// Sell share of total volume, 0.0 with no volume
    pub fn sell_ratio(&self) -> f64 {
        let total = self.buy_sol + self.sell_sol;
        if total > 0.0 {
            self.sell_sol / total
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenState {
    pub token: String,

    /// First observed flow
    pub birth: Option<i64>,

    pub episode_id: u64,
    /// Set whenever `episode_id > 0`
    pub episode_start: Option<i64>,

    pub wallets: WalletMap,
    pub early_wallets: BTreeSet<String>,

    pub current_state: TokenPhase,
    pub previous_state: Option<TokenPhase>,
    pub state_changed_at: Option<i64>,

    /// Whale marks inside the density window, oldest first
    pub density_log: VecDeque<WhaleMark>,
    pub episode_max_density: f64,

    /// Whale marks inside the coordination window, oldest first
    pub coordination_buffer: VecDeque<WhaleMark>,

    pub last_whale_ts: Option<i64>,
    pub prev_whale_ts: Option<i64>,

    pub wave: WaveState,
    pub flow_totals: FlowTotals,

    /// Disengagement at the last token-level exhaustion signal this episode
    pub last_exhaustion_signal: Option<f64>,

    /// Chain-aligned time of the last evaluation
    pub now: Option<i64>,
}

impl TokenState {
    pub fn new(token: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            token: token.into(),
            birth: None,
            episode_id: 0,
            episode_start: None,
            wallets: WalletMap::new(
                config.caps.max_active_wallets,
                config.thresholds.window_5min_secs,
                config.thresholds.window_15min_secs,
            ),
            early_wallets: BTreeSet::new(),
            current_state: TokenPhase::Quiet,
            previous_state: None,
            state_changed_at: None,
            density_log: VecDeque::new(),
            episode_max_density: 0.0,
            coordination_buffer: VecDeque::new(),
            last_whale_ts: None,
            prev_whale_ts: None,
            wave: WaveState::default(),
            flow_totals: FlowTotals::default(),
            last_exhaustion_signal: None,
            now: None,
        }
    }

    /// Drop evicted wallets from every address set that outlives the map entry
    pub fn forget_wallets(&mut self, evicted: &[String]) {
        for address in evicted {
            self.early_wallets.remove(address);
            self.wave.early_wallets.remove(address);
        }
    }

    pub fn is_early(&self, address: &str) -> bool {
        self.early_wallets.contains(address)
    }

    pub fn seconds_in_state(&self, now: i64) -> i64 {
        self.state_changed_at.map_or(0, |changed| now - changed)
    }
}
