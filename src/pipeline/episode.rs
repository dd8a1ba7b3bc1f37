//! Episode boundaries and waves
//!
//! An episode is a stretch of whale activity bounded by long silences. Inside
//! one episode, each same-episode reactivation opens a new wave.

use super::config::{Caps, Thresholds};
use super::state::{TokenState, WaveRecord, WaveState};

#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    end_silence_secs: i64,
    reignition_gap_secs: i64,
    max_wave_history: usize,
}

impl EpisodeTracker {
    pub fn new(end_silence_secs: i64, reignition_gap_secs: i64, max_wave_history: usize) -> Self {
        Self {
            end_silence_secs,
            reignition_gap_secs,
            max_wave_history,
        }
    }

    pub fn from_config(thresholds: &Thresholds, caps: &Caps) -> Self {
        Self::new(
            thresholds.episode_end_silence_secs,
            thresholds.reignition_gap_secs,
            caps.max_wave_history,
        )
    }

    /// Seconds since the later of the previous and last whale timestamps
    pub fn whale_silence_secs(&self, state: &TokenState, now: i64) -> Option<i64> {
        let reference = state.last_whale_ts.into_iter().chain(state.prev_whale_ts).max()?;
        Some(now - reference)
    }

    /// The episode is over once whale silence reaches the end threshold.
    /// No whale ever seen means there is nothing to end.
    pub fn check_boundary(&self, state: &TokenState, now: i64) -> bool {
        self.whale_silence_secs(state, now)
            .is_some_and(|silence| silence >= self.end_silence_secs)
    }

    pub fn start_new(&self, state: &mut TokenState, now: i64) {
        state.episode_id += 1;
        state.episode_start = Some(now);
        state.episode_max_density = 0.0;
        state.density_log.clear();
        state.last_exhaustion_signal = None;
        state.wave = WaveState {
            index: 1,
            start: Some(now),
            ..WaveState::default()
        };

        log::info!(
            "🔄 {} episode {} started at {}",
            state.token,
            state.episode_id,
            now
        );
    }

    /// True when the gap since the previous whale is short enough to stay in
    /// the current episode. False means a new episode must be started.
    pub fn check_reignition(&self, state: &TokenState, now: i64) -> bool {
        match state.prev_whale_ts {
            Some(prev) => now - prev < self.reignition_gap_secs,
            None => false,
        }
    }

    /// Close the current wave into history and open the next one
    pub fn advance_wave(&self, state: &mut TokenState, now: i64) {
        let wave = &mut state.wave;
        wave.history.push_back(WaveRecord {
            wave: wave.index,
            start: wave.start.unwrap_or(now),
            end: now,
            early_wallet_count: wave.early_wallets.len(),
            peak_disengagement: wave.peak_disengagement,
        });
        while wave.history.len() > self.max_wave_history {
            wave.history.pop_front();
        }

        wave.index += 1;
        wave.start = Some(now);
        wave.early_wallets.clear();
        wave.peak_disengagement = 0.0;

        log::debug!(
            "🌊 {} episode {} wave {} opened at {}",
            state.token,
            state.episode_id,
            wave.index,
            now
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::EngineConfig;
    use crate::pipeline::state::WhaleMark;
    use crate::pipeline::types::Direction;

    fn tracker() -> EpisodeTracker {
        EpisodeTracker::new(600, 450, 2)
    }

    fn state() -> TokenState {
        TokenState::new("TOKEN", &EngineConfig::default())
    }

    #[test]
    fn test_boundary_requires_a_whale() {
        assert!(!tracker().check_boundary(&state(), 1_000_000));
    }

    #[test]
    fn test_boundary_uses_later_whale_timestamp() {
        let mut s = state();
        s.prev_whale_ts = Some(1000);
        s.last_whale_ts = Some(1500);

        assert!(!tracker().check_boundary(&s, 2099));
        assert!(tracker().check_boundary(&s, 2100));
    }

    #[test]
    fn test_start_new_resets_episode_scope() {
        let t = tracker();
        let mut s = state();
        s.episode_max_density = 0.5;
        s.density_log.push_back(WhaleMark {
            timestamp: 900,
            wallet: "A".to_string(),
            direction: Direction::Buy,
        });
        s.wave.early_wallets.insert("A".to_string());
        s.wave.index = 3;

        t.start_new(&mut s, 1000);
        assert_eq!(s.episode_id, 1);
        assert_eq!(s.episode_start, Some(1000));
        assert_eq!(s.episode_max_density, 0.0);
        assert!(s.density_log.is_empty());
        assert_eq!(s.wave.index, 1);
        assert_eq!(s.wave.start, Some(1000));
        assert!(s.wave.early_wallets.is_empty());

        t.start_new(&mut s, 2000);
        assert_eq!(s.episode_id, 2);
        assert_eq!(s.episode_start, Some(2000));
    }

    #[test]
    fn test_reignition_gap() {
        let t = tracker();
        let mut s = state();
        assert!(!t.check_reignition(&s, 1000), "no previous whale");

        s.prev_whale_ts = Some(1000);
        s.last_whale_ts = Some(1400);
        assert!(t.check_reignition(&s, 1400));
        assert!(!t.check_reignition(&s, 1450));
    }

    #[test]
    fn test_advance_wave_archives_and_caps_history() {
        let t = tracker();
        let mut s = state();
        t.start_new(&mut s, 1000);
        s.wave.early_wallets.insert("A".to_string());
        s.wave.peak_disengagement = 0.75;

        t.advance_wave(&mut s, 1500);
        assert_eq!(s.wave.index, 2);
        assert_eq!(s.wave.history.len(), 1);
        assert_eq!(s.wave.history[0].early_wallet_count, 1);
        assert_eq!(s.wave.history[0].peak_disengagement, 0.75);
        assert!(s.wave.early_wallets.is_empty());

        t.advance_wave(&mut s, 1600);
        t.advance_wave(&mut s, 1700);
        assert_eq!(s.wave.history.len(), 2);
        assert_eq!(s.wave.history[0].wave, 2);
        assert_eq!(s.wave.index, 4);
    }
}
