//! Chain-aligned clock
//!
//! Every "now" inside the engine comes from here. The first observed chain
//! timestamp locks an offset against the wall clock so age computations stay
//! non-negative when the session starts well after the first event. Replay mode
//! ignores the wall clock entirely.

/// Wall-clock source returning unix seconds
pub type WallClockFn = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct ChainTimeClock {
    replay: bool,
    offset: Option<i64>,
    latest_chain_ts: Option<i64>,
    wall_clock: WallClockFn,
}

impl ChainTimeClock {
    /// Live clock backed by `chrono::Utc::now()`
    pub fn live() -> Self {
        Self::with_wall_clock(false, Box::new(|| chrono::Utc::now().timestamp()))
    }

    /// Replay clock: `now()` is the latest observed chain timestamp
    pub fn replay() -> Self {
        Self::with_wall_clock(true, Box::new(|| chrono::Utc::now().timestamp()))
    }

    /// Clock with a custom wall-clock source (for testing with mock time)
    pub fn with_wall_clock(replay: bool, wall_clock: WallClockFn) -> Self {
        Self {
            replay,
            offset: None,
            latest_chain_ts: None,
            wall_clock,
        }
    }

    pub fn is_replay(&self) -> bool {
        self.replay
    }

    /// Record a chain timestamp. The offset is locked on the first call only.
    pub fn observe(&mut self, chain_ts: i64) {
        if self.offset.is_none() {
            self.offset = Some((self.wall_clock)() - chain_ts);
        }
        self.latest_chain_ts = Some(match self.latest_chain_ts {
            Some(latest) => latest.max(chain_ts),
            None => chain_ts,
        });
    }

    pub fn now(&self) -> i64 {
        let Some(latest) = self.latest_chain_ts else {
            return (self.wall_clock)();
        };

        if self.replay {
            return latest;
        }

        let offset = self.offset.unwrap_or(0);
        ((self.wall_clock)() - offset).max(latest)
    }

    pub fn has_observations(&self) -> bool {
        self.latest_chain_ts.is_some()
    }

    pub fn latest_chain_ts(&self) -> Option<i64> {
        self.latest_chain_ts
    }
}

impl std::fmt::Debug for ChainTimeClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainTimeClock")
            .field("replay", &self.replay)
            .field("offset", &self.offset)
            .field("latest_chain_ts", &self.latest_chain_ts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn mock_clock(replay: bool, start: i64) -> (ChainTimeClock, Arc<AtomicI64>) {
        let wall = Arc::new(AtomicI64::new(start));
        let source = wall.clone();
        let clock =
            ChainTimeClock::with_wall_clock(replay, Box::new(move || source.load(Ordering::SeqCst)));
        (clock, wall)
    }

    #[test]
    fn test_falls_back_to_wall_clock_without_observations() {
        let (clock, wall) = mock_clock(false, 5_000);
        assert_eq!(clock.now(), 5_000);
        wall.store(5_010, Ordering::SeqCst);
        assert_eq!(clock.now(), 5_010);
        assert!(!clock.has_observations());
    }

    #[test]
    fn test_live_mode_tracks_wall_clock_through_offset() {
        // Session starts 1 hour after the first chain event
        let (mut clock, wall) = mock_clock(false, 1_700_003_600);
        clock.observe(1_700_000_000);
        assert_eq!(clock.now(), 1_700_000_000);

        wall.store(1_700_003_630, Ordering::SeqCst);
        assert_eq!(clock.now(), 1_700_000_030);
    }

    #[test]
    fn test_offset_locked_on_first_observation() {
        let (mut clock, wall) = mock_clock(false, 10_000);
        clock.observe(1_000); // offset 9_000

        wall.store(20_000, Ordering::SeqCst);
        clock.observe(1_005);
        // offset not re-derived: 20_000 - 9_000
        assert_eq!(clock.now(), 11_000);
    }

    #[test]
    fn test_live_mode_never_behind_latest_chain_ts() {
        let (mut clock, _wall) = mock_clock(false, 10_000);
        clock.observe(1_000);
        // Chain runs ahead of the wall clock estimate
        clock.observe(1_500);
        assert_eq!(clock.now(), 1_500);
    }

    #[test]
    fn test_replay_mode_ignores_wall_clock() {
        let (mut clock, wall) = mock_clock(true, 99_999);
        clock.observe(1_000);
        clock.observe(1_200);
        clock.observe(1_100); // late arrival does not rewind
        wall.store(500_000, Ordering::SeqCst);
        assert_eq!(clock.now(), 1_200);
        assert_eq!(clock.latest_chain_ts(), Some(1_200));
    }
}
