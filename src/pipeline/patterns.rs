//! Pattern verdict - compressed reading of a token's state
//!
//! Reads `TokenState` only: no detection and no mutation. Three verdicts:
//!
//! - **Wave trend**: early-cohort size per wave, last wave against the one before
//! - **Capital**: sell share of all SOL volume, in bands around 50%
//! - **Exhaustion label**: silence marks across the current wave's early cohort
//!
//! Each verdict carries a detail string with the numbers behind the label.

use super::state::TokenState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last wave below this share of the previous one counts as a collapse
const COLLAPSE_RATIO: f64 = 0.25;

/// Early wallets needed to call a first wave BUILDING
const FIRST_WAVE_BUILDING_MIN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaveTrend {
    InsufficientData,
    Building,
    Stable,
    Fading,
    Collapsing,
}

impl WaveTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveTrend::InsufficientData => "INSUFFICIENT_DATA",
            WaveTrend::Building => "BUILDING",
            WaveTrend::Stable => "STABLE",
            WaveTrend::Fading => "FADING",
            WaveTrend::Collapsing => "COLLAPSING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapitalVerdict {
    InflowStrong,
    InflowWeak,
    Neutral,
    OutflowWeak,
    OutflowStrong,
}

impl CapitalVerdict {
    /// Bands on the sell share of volume
    pub fn from_sell_ratio(sell_ratio: f64) -> Self {
        if sell_ratio > 0.65 {
            CapitalVerdict::OutflowStrong
        } else if sell_ratio > 0.55 {
            CapitalVerdict::OutflowWeak
        } else if sell_ratio < 0.35 {
            CapitalVerdict::InflowStrong
        } else if sell_ratio < 0.45 {
            CapitalVerdict::InflowWeak
        } else {
            CapitalVerdict::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapitalVerdict::InflowStrong => "INFLOW_STRONG",
            CapitalVerdict::InflowWeak => "INFLOW_WEAK",
            CapitalVerdict::Neutral => "NEUTRAL",
            CapitalVerdict::OutflowWeak => "OUTFLOW_WEAK",
            CapitalVerdict::OutflowStrong => "OUTFLOW_STRONG",
        }
    }
}

/// Graduated reading of the wave cohort's silent share
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExhaustionLabel {
    None,
    Early,
    Significant,
    Severe,
    Critical,
}

impl ExhaustionLabel {
    pub fn from_silent_pct(pct: f64) -> Self {
        if pct >= 0.85 {
            ExhaustionLabel::Critical
        } else if pct >= 0.70 {
            ExhaustionLabel::Severe
        } else if pct >= 0.50 {
            ExhaustionLabel::Significant
        } else if pct >= 0.30 {
            ExhaustionLabel::Early
        } else {
            ExhaustionLabel::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustionLabel::None => "NONE",
            ExhaustionLabel::Early => "EARLY",
            ExhaustionLabel::Significant => "SIGNIFICANT",
            ExhaustionLabel::Severe => "SEVERE",
            ExhaustionLabel::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternVerdict {
    pub wave_trend: WaveTrend,
    pub wave_trend_detail: String,
    pub capital: CapitalVerdict,
    pub capital_detail: String,
    pub exhaustion_label: ExhaustionLabel,
    /// Rounded to two decimals
    pub exhaustion_pct: f64,
    pub exhaustion_detail: String,
}

impl fmt::Display for PatternVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "waves {} [{}] | capital {} [{}] | exhaustion {} [{}]",
            self.wave_trend.as_str(),
            self.wave_trend_detail,
            self.capital.as_str(),
            self.capital_detail,
            self.exhaustion_label.as_str(),
            self.exhaustion_detail
        )
    }
}

pub fn analyze(state: &TokenState) -> PatternVerdict {
    let (wave_trend, wave_trend_detail) = wave_trend(state);
    let (capital, capital_detail) = capital(state);
    let (exhaustion_label, exhaustion_pct, exhaustion_detail) = exhaustion(state);

    PatternVerdict {
        wave_trend,
        wave_trend_detail,
        capital,
        capital_detail,
        exhaustion_label,
        exhaustion_pct,
        exhaustion_detail,
    }
}

fn wave_trend(state: &TokenState) -> (WaveTrend, String) {
    let wave = &state.wave;
    let current = wave.early_wallets.len();
    let sequence: Vec<usize> = wave
        .history
        .iter()
        .map(|record| record.early_wallet_count)
        .chain(std::iter::once(current))
        .collect();

    let &[.., second_last, last] = sequence.as_slice() else {
        let trend = if current >= FIRST_WAVE_BUILDING_MIN {
            WaveTrend::Building
        } else {
            WaveTrend::InsufficientData
        };
        return (trend, format!("{} wallets (wave {})", current, wave.index));
    };

    let trend = if last == 0 || (second_last > 0 && (last as f64) < second_last as f64 * COLLAPSE_RATIO)
    {
        WaveTrend::Collapsing
    } else if last < second_last {
        WaveTrend::Fading
    } else if last == second_last {
        WaveTrend::Stable
    } else {
        WaveTrend::Building
    };

    let arc = sequence
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("→");
    let plural = if wave.index > 1 { "s" } else { "" };
    (trend, format!("{} ({} wave{})", arc, wave.index, plural))
}

fn capital(state: &TokenState) -> (CapitalVerdict, String) {
    let totals = &state.flow_totals;
    if totals.buy_count + totals.sell_count == 0 {
        return (CapitalVerdict::Neutral, "no transactions yet".to_string());
    }

    let sell_ratio = totals.sell_ratio();
    let net = totals.net_flow_sol();
    let sign = if net >= 0.0 { "+" } else { "" };
    let detail = format!(
        "{}{:.1} SOL | {}B / {}S ({}% buy / {}% sell)",
        sign,
        net,
        totals.buy_count,
        totals.sell_count,
        ((1.0 - sell_ratio) * 100.0) as u32,
        (sell_ratio * 100.0) as u32
    );
    (CapitalVerdict::from_sell_ratio(sell_ratio), detail)
}

fn exhaustion(state: &TokenState) -> (ExhaustionLabel, f64, String) {
    let cohort = &state.wave.early_wallets;
    if cohort.is_empty() {
        return (ExhaustionLabel::None, 0.0, "no early cohort yet".to_string());
    }

    let silent = cohort
        .iter()
        .filter(|address| state.wallets.get(address).is_some_and(|w| w.is_silent()))
        .count();
    let pct = silent as f64 / cohort.len() as f64;

    let detail = format!(
        "{}/{} wave {} early wallets silent ({}%)",
        silent,
        cohort.len(),
        state.wave.index,
        (pct * 100.0) as u32
    );
    (
        ExhaustionLabel::from_silent_pct(pct),
        (pct * 100.0).round() / 100.0,
        detail,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::EngineConfig;
    use crate::pipeline::state::WaveRecord;
    use crate::pipeline::types::{Direction, FlowEvent};
    use crate::pipeline::wallet::{SilenceMark, SilencePattern};

    fn state() -> TokenState {
        TokenState::new("TOKEN", &EngineConfig::default())
    }

    fn closed_wave(wave: u32, early_wallet_count: usize) -> WaveRecord {
        WaveRecord {
            wave,
            start: 0,
            end: 0,
            early_wallet_count,
            peak_disengagement: 0.0,
        }
    }

    fn with_cohort(state: &mut TokenState, wave: u32, history: &[usize], current: usize) {
        state.wave.index = wave;
        state.wave.history = history
            .iter()
            .enumerate()
            .map(|(i, count)| closed_wave(i as u32 + 1, *count))
            .collect();
        state.wave.early_wallets = (0..current).map(|i| format!("W{}", i)).collect();
    }

    fn record(state: &mut TokenState, direction: Direction, amount_sol: f64) {
        state.flow_totals.record(&FlowEvent {
            wallet: "W".repeat(44),
            timestamp: 1000,
            direction,
            amount_sol,
            signature: "sig".to_string(),
            token: "TOKEN".to_string(),
        });
    }

    #[test]
    fn test_first_wave_trend() {
        let mut s = state();
        let verdict = analyze(&s);
        assert_eq!(verdict.wave_trend, WaveTrend::InsufficientData);
        assert_eq!(verdict.wave_trend_detail, "0 wallets (wave 0)");

        with_cohort(&mut s, 1, &[], 3);
        let verdict = analyze(&s);
        assert_eq!(verdict.wave_trend, WaveTrend::Building);
        assert_eq!(verdict.wave_trend_detail, "3 wallets (wave 1)");
    }

    #[test]
    fn test_wave_trend_compares_last_two_waves() {
        let cases = [
            (&[10, 8][..], 8, WaveTrend::Stable),
            (&[10][..], 12, WaveTrend::Building),
            (&[10][..], 4, WaveTrend::Fading),
            (&[10][..], 2, WaveTrend::Collapsing),
            (&[10][..], 0, WaveTrend::Collapsing),
        ];
        for (history, current, expected) in cases {
            let mut s = state();
            with_cohort(&mut s, history.len() as u32 + 1, history, current);
            assert_eq!(analyze(&s).wave_trend, expected, "{:?} -> {}", history, current);
        }

        let mut s = state();
        with_cohort(&mut s, 3, &[174, 67], 18);
        assert_eq!(analyze(&s).wave_trend_detail, "174→67→18 (3 waves)");
    }

    #[test]
    fn test_capital_bands() {
        let mut s = state();
        let verdict = analyze(&s);
        assert_eq!(verdict.capital, CapitalVerdict::Neutral);
        assert_eq!(verdict.capital_detail, "no transactions yet");

        record(&mut s, Direction::Buy, 30.0);
        record(&mut s, Direction::Sell, 70.0);
        let verdict = analyze(&s);
        assert_eq!(verdict.capital, CapitalVerdict::OutflowStrong);
        assert_eq!(verdict.capital_detail, "-40.0 SOL | 1B / 1S (30% buy / 70% sell)");

        assert_eq!(CapitalVerdict::from_sell_ratio(0.60), CapitalVerdict::OutflowWeak);
        assert_eq!(CapitalVerdict::from_sell_ratio(0.50), CapitalVerdict::Neutral);
        assert_eq!(CapitalVerdict::from_sell_ratio(0.40), CapitalVerdict::InflowWeak);
        assert_eq!(CapitalVerdict::from_sell_ratio(0.20), CapitalVerdict::InflowStrong);
    }

    #[test]
    fn test_exhaustion_label_reads_silence_marks() {
        let mut s = state();
        let verdict = analyze(&s);
        assert_eq!(verdict.exhaustion_label, ExhaustionLabel::None);
        assert_eq!(verdict.exhaustion_detail, "no early cohort yet");

        with_cohort(&mut s, 2, &[5], 4);
        for i in 0..4 {
            let mut wallet = s.wallets.checkout(&format!("W{}", i));
            wallet.activity_count = 1;
            if i < 3 {
                wallet.silence = Some(SilenceMark {
                    pattern: SilencePattern::CohortComparison,
                    since: 1000,
                });
            }
            s.wallets.checkin(wallet);
        }

        let verdict = analyze(&s);
        assert_eq!(verdict.exhaustion_label, ExhaustionLabel::Severe);
        assert_eq!(verdict.exhaustion_pct, 0.75);
        assert_eq!(verdict.exhaustion_detail, "3/4 wave 2 early wallets silent (75%)");
    }

    #[test]
    fn test_exhaustion_label_thresholds() {
        assert_eq!(ExhaustionLabel::from_silent_pct(0.29), ExhaustionLabel::None);
        assert_eq!(ExhaustionLabel::from_silent_pct(0.30), ExhaustionLabel::Early);
        assert_eq!(ExhaustionLabel::from_silent_pct(0.60), ExhaustionLabel::Significant);
        assert_eq!(ExhaustionLabel::from_silent_pct(0.70), ExhaustionLabel::Severe);
        assert_eq!(ExhaustionLabel::from_silent_pct(0.90), ExhaustionLabel::Critical);
    }
}
