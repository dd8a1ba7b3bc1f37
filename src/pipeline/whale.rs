//! Latched whale threshold detection
//!
//! Must run after `TimeWindowManager::add` has applied the same flow, since the
//! cumulative kinds read the freshly updated window sums.

use super::config::Thresholds;
use super::types::{FlowEvent, WhaleEvent, WhaleKind};
use super::wallet::WalletState;

#[derive(Debug, Clone)]
pub struct WhaleDetector {
    single_tx: f64,
    cum_5min: f64,
    cum_15min: f64,
}

impl WhaleDetector {
    pub fn new(single_tx: f64, cum_5min: f64, cum_15min: f64) -> Self {
        Self {
            single_tx,
            cum_5min,
            cum_15min,
        }
    }

    pub fn from_thresholds(thresholds: &Thresholds) -> Self {
        Self::new(
            thresholds.whale_single_tx,
            thresholds.whale_cum_5min,
            thresholds.whale_cum_15min,
        )
    }

    /// Emit one event per kind that is crossed now and was never crossed before.
    ///
    /// Order is single-tx, 5m cumulative, 15m cumulative. Only latch flags are mutated.
    pub fn check(&self, wallet: &mut WalletState, flow: &FlowEvent) -> Vec<WhaleEvent> {
        let candidates = [
            (WhaleKind::SingleTx, flow.amount_sol, self.single_tx),
            (WhaleKind::Cumulative5m, wallet.window_5m.sum(), self.cum_5min),
            (WhaleKind::Cumulative15m, wallet.window_15m.sum(), self.cum_15min),
        ];

        let mut events = Vec::new();
        for (kind, observed, threshold) in candidates {
            if observed < threshold || wallet.latches.is_set(kind) {
                continue;
            }
            wallet.latches.set(kind);

            log::debug!(
                "🐋 {} {} {:.2} SOL >= {:.2}",
                kind.as_str(),
                flow.wallet,
                observed,
                threshold
            );

            events.push(WhaleEvent {
                wallet: flow.wallet.clone(),
                timestamp: flow.timestamp,
                kind,
                amount_sol: observed,
                threshold,
                token: flow.token.clone(),
                direction: flow.direction,
            });
        }
        events
    }
}
