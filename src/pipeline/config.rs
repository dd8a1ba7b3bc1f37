//! Engine and runtime configuration from environment variables
//!
//! All values have defaults. A variable that is set but cannot be parsed is a
//! fatal `ConfigError`: the process must stop before any token is tracked.
//! Configuration is immutable for the life of the process and shared
//! read-only across token workers through `Arc<EngineConfig>`.

use super::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Pool-share whale thresholds, applied when a pool liquidity estimate is supplied
mod liquidity_scaling {
    pub const SINGLE_TX_PCT: f64 = 0.005;
    pub const CUM_5MIN_PCT: f64 = 0.01;
    pub const CUM_15MIN_PCT: f64 = 0.02;

    pub const SINGLE_TX_BOUNDS: (f64, f64) = (0.1, 100.0);
    pub const CUM_5MIN_BOUNDS: (f64, f64) = (0.5, 250.0);
    pub const CUM_15MIN_BOUNDS: (f64, f64) = (1.0, 500.0);

    pub const DEFAULT_LIQUIDITY_SOL: f64 = 50.0;
}

/// Detection thresholds and windows. Amounts in SOL, durations in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub whale_single_tx: f64,
    pub whale_cum_5min: f64,
    pub whale_cum_15min: f64,
    pub window_5min_secs: i64,
    pub window_15min_secs: i64,

    pub early_window_secs: i64,
    pub coordination_window_secs: i64,
    pub coordination_min_wallets: usize,
    pub persistence_min_buckets: usize,
    pub persistence_max_gap_secs: i64,
    /// Silence and minimum-eligibility duration for early wallets
    pub exhaustion_silence_secs: i64,
    pub exhaustion_disengagement: f64,
    /// Disengagement increase needed before a repeat token-level exhaustion signal
    pub exhaustion_signal_step: f64,
    pub replacement_lookback_secs: i64,
    /// Inactivity after which a wallet is marked silent in cohort comparison
    pub cohort_silence_secs: i64,

    pub episode_end_silence_secs: i64,
    pub reignition_gap_secs: i64,
    pub density_window_secs: i64,

    pub spike_min_early_wallets: usize,
    pub early_phase_min_secs: i64,
    pub persistence_confirmed_min_wallets: usize,
    pub expansion_lookback_secs: i64,
    pub pressure_min_whales: usize,
    pub dissipation_lookback_secs: i64,
    pub dissipation_min_active: usize,
    pub reversal_lookback_secs: i64,
    pub reversal_min_whales: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            whale_single_tx: 10.0,
            whale_cum_5min: 25.0,
            whale_cum_15min: 50.0,
            window_5min_secs: 300,
            window_15min_secs: 900,

            early_window_secs: 300,
            coordination_window_secs: 60,
            coordination_min_wallets: 3,
            persistence_min_buckets: 2,
            persistence_max_gap_secs: 300,
            exhaustion_silence_secs: 120,
            exhaustion_disengagement: 0.60,
            exhaustion_signal_step: 0.10,
            replacement_lookback_secs: 300,
            cohort_silence_secs: 120,

            episode_end_silence_secs: 600,
            reignition_gap_secs: 450,
            density_window_secs: 120,

            spike_min_early_wallets: 3,
            early_phase_min_secs: 120,
            persistence_confirmed_min_wallets: 2,
            expansion_lookback_secs: 300,
            pressure_min_whales: 5,
            dissipation_lookback_secs: 300,
            dissipation_min_active: 1,
            reversal_lookback_secs: 60,
            reversal_min_whales: 2,
        }
    }
}

impl Thresholds {
    /// Replace the three whale thresholds with pool-share values.
    ///
    /// Non-positive liquidity falls back to a 50 SOL pool. Each threshold is
    /// clamped to its floor/ceiling so dust on thin pools and whales on deep
    /// pools are both handled.
    pub fn with_pool_liquidity(mut self, liquidity_sol: f64) -> Self {
        use liquidity_scaling::*;

        let liquidity = if liquidity_sol > 0.0 && liquidity_sol.is_finite() {
            liquidity_sol
        } else {
            DEFAULT_LIQUIDITY_SOL
        };

        self.whale_single_tx =
            (liquidity * SINGLE_TX_PCT).clamp(SINGLE_TX_BOUNDS.0, SINGLE_TX_BOUNDS.1);
        self.whale_cum_5min =
            (liquidity * CUM_5MIN_PCT).clamp(CUM_5MIN_BOUNDS.0, CUM_5MIN_BOUNDS.1);
        self.whale_cum_15min =
            (liquidity * CUM_15MIN_PCT).clamp(CUM_15MIN_BOUNDS.0, CUM_15MIN_BOUNDS.1);
        self
    }
}

/// Scalability bounds on every growing collection
#[derive(Debug, Clone, PartialEq)]
pub struct Caps {
    pub max_active_wallets: usize,
    pub max_sample_wallets: usize,
    pub max_minute_buckets: usize,
    /// Entry cap for the density log and the coordination buffer
    pub max_whale_log_entries: usize,
    pub max_wave_history: usize,
    pub max_event_buffer_entries: usize,
    pub max_event_buffer_bytes: usize,
    pub max_detail_chars: usize,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            max_active_wallets: 200,
            max_sample_wallets: 5,
            max_minute_buckets: 64,
            max_whale_log_entries: 512,
            max_wave_history: 16,
            max_event_buffer_entries: 100,
            max_event_buffer_bytes: 256_000,
            max_detail_chars: 320,
        }
    }
}

/// Read-only configuration shared by every token engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    pub caps: Caps,
}

impl EngineConfig {
    /// Load from environment variables
    ///
    /// Whale thresholds:
    /// - `WHALEFLOW_WHALE_SINGLE_TX` (default: 10.0)
    /// - `WHALEFLOW_WHALE_CUM_5MIN` (default: 25.0)
    /// - `WHALEFLOW_WHALE_CUM_15MIN` (default: 50.0)
    /// - `WHALEFLOW_POOL_LIQUIDITY_SOL` (optional, overrides the three above)
    ///
    /// Signals and episodes:
    /// - `WHALEFLOW_EARLY_WINDOW_SECS` (default: 300)
    /// - `WHALEFLOW_COORDINATION_WINDOW_SECS` (default: 60)
    /// - `WHALEFLOW_COORDINATION_MIN_WALLETS` (default: 3)
    /// - `WHALEFLOW_PERSISTENCE_MIN_BUCKETS` (default: 2)
    /// - `WHALEFLOW_PERSISTENCE_MAX_GAP_SECS` (default: 300)
    /// - `WHALEFLOW_EXHAUSTION_SILENCE_SECS` (default: 120)
    /// - `WHALEFLOW_EXHAUSTION_DISENGAGEMENT` (default: 0.60)
    /// - `WHALEFLOW_EXHAUSTION_SIGNAL_STEP` (default: 0.10)
    /// - `WHALEFLOW_REPLACEMENT_LOOKBACK_SECS` (default: 300)
    /// - `WHALEFLOW_EPISODE_END_SILENCE_SECS` (default: 600)
    /// - `WHALEFLOW_REIGNITION_GAP_SECS` (default: 450)
    /// - `WHALEFLOW_DENSITY_WINDOW_SECS` (default: 120)
    /// - `WHALEFLOW_PRESSURE_MIN_WHALES` (default: 5)
    ///
    /// Caps:
    /// - `WHALEFLOW_MAX_ACTIVE_WALLETS` (default: 200)
    /// - `WHALEFLOW_MAX_SAMPLE_WALLETS` (default: 5)
    /// - `WHALEFLOW_MAX_EVENT_BUFFER_ENTRIES` (default: 100)
    /// - `WHALEFLOW_MAX_EVENT_BUFFER_BYTES` (default: 256000)
    /// - `WHALEFLOW_MAX_DETAIL_CHARS` (default: 320)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Thresholds::default();
        let mut thresholds = Thresholds {
            whale_single_tx: env_or("WHALEFLOW_WHALE_SINGLE_TX", defaults.whale_single_tx)?,
            whale_cum_5min: env_or("WHALEFLOW_WHALE_CUM_5MIN", defaults.whale_cum_5min)?,
            whale_cum_15min: env_or("WHALEFLOW_WHALE_CUM_15MIN", defaults.whale_cum_15min)?,
            early_window_secs: env_or("WHALEFLOW_EARLY_WINDOW_SECS", defaults.early_window_secs)?,
            coordination_window_secs: env_or(
                "WHALEFLOW_COORDINATION_WINDOW_SECS",
                defaults.coordination_window_secs,
            )?,
            coordination_min_wallets: env_or(
                "WHALEFLOW_COORDINATION_MIN_WALLETS",
                defaults.coordination_min_wallets,
            )?,
            persistence_min_buckets: env_or(
                "WHALEFLOW_PERSISTENCE_MIN_BUCKETS",
                defaults.persistence_min_buckets,
            )?,
            persistence_max_gap_secs: env_or(
                "WHALEFLOW_PERSISTENCE_MAX_GAP_SECS",
                defaults.persistence_max_gap_secs,
            )?,
            exhaustion_silence_secs: env_or(
                "WHALEFLOW_EXHAUSTION_SILENCE_SECS",
                defaults.exhaustion_silence_secs,
            )?,
            exhaustion_disengagement: env_or(
                "WHALEFLOW_EXHAUSTION_DISENGAGEMENT",
                defaults.exhaustion_disengagement,
            )?,
            exhaustion_signal_step: env_or(
                "WHALEFLOW_EXHAUSTION_SIGNAL_STEP",
                defaults.exhaustion_signal_step,
            )?,
            replacement_lookback_secs: env_or(
                "WHALEFLOW_REPLACEMENT_LOOKBACK_SECS",
                defaults.replacement_lookback_secs,
            )?,
            episode_end_silence_secs: env_or(
                "WHALEFLOW_EPISODE_END_SILENCE_SECS",
                defaults.episode_end_silence_secs,
            )?,
            reignition_gap_secs: env_or(
                "WHALEFLOW_REIGNITION_GAP_SECS",
                defaults.reignition_gap_secs,
            )?,
            density_window_secs: env_or(
                "WHALEFLOW_DENSITY_WINDOW_SECS",
                defaults.density_window_secs,
            )?,
            pressure_min_whales: env_or(
                "WHALEFLOW_PRESSURE_MIN_WHALES",
                defaults.pressure_min_whales,
            )?,
            ..defaults
        };

        if let Some(liquidity) = env_opt::<f64>("WHALEFLOW_POOL_LIQUIDITY_SOL")? {
            thresholds = thresholds.with_pool_liquidity(liquidity);
        }

        let cap_defaults = Caps::default();
        let caps = Caps {
            max_active_wallets: env_or(
                "WHALEFLOW_MAX_ACTIVE_WALLETS",
                cap_defaults.max_active_wallets,
            )?,
            max_sample_wallets: env_or(
                "WHALEFLOW_MAX_SAMPLE_WALLETS",
                cap_defaults.max_sample_wallets,
            )?,
            max_event_buffer_entries: env_or(
                "WHALEFLOW_MAX_EVENT_BUFFER_ENTRIES",
                cap_defaults.max_event_buffer_entries,
            )?,
            max_event_buffer_bytes: env_or(
                "WHALEFLOW_MAX_EVENT_BUFFER_BYTES",
                cap_defaults.max_event_buffer_bytes,
            )?,
            max_detail_chars: env_or("WHALEFLOW_MAX_DETAIL_CHARS", cap_defaults.max_detail_chars)?,
            ..cap_defaults
        };

        let config = Self { thresholds, caps };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break window math or divide by zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let c = &self.caps;

        let positive_amounts = [
            ("whale_single_tx", t.whale_single_tx),
            ("whale_cum_5min", t.whale_cum_5min),
            ("whale_cum_15min", t.whale_cum_15min),
        ];
        for (name, value) in positive_amounts {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::Inconsistent(format!(
                    "{} must be a positive amount, got {}",
                    name, value
                )));
            }
        }

        let positive_durations = [
            ("window_5min_secs", t.window_5min_secs),
            ("window_15min_secs", t.window_15min_secs),
            ("coordination_window_secs", t.coordination_window_secs),
            ("exhaustion_silence_secs", t.exhaustion_silence_secs),
            ("episode_end_silence_secs", t.episode_end_silence_secs),
            ("reignition_gap_secs", t.reignition_gap_secs),
            ("density_window_secs", t.density_window_secs),
            ("cohort_silence_secs", t.cohort_silence_secs),
        ];
        for (name, value) in positive_durations {
            if value <= 0 {
                return Err(ConfigError::Inconsistent(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }

        if t.window_5min_secs >= t.window_15min_secs {
            return Err(ConfigError::Inconsistent(
                "5-minute window must be shorter than the 15-minute window".to_string(),
            ));
        }

        if t.reignition_gap_secs > t.episode_end_silence_secs {
            return Err(ConfigError::Inconsistent(format!(
                "reignition gap ({}s) exceeds episode end silence ({}s)",
                t.reignition_gap_secs, t.episode_end_silence_secs
            )));
        }

        if !(t.exhaustion_disengagement > 0.0 && t.exhaustion_disengagement <= 1.0) {
            return Err(ConfigError::Inconsistent(format!(
                "exhaustion disengagement must be in (0, 1], got {}",
                t.exhaustion_disengagement
            )));
        }

        if !(t.exhaustion_signal_step > 0.0 && t.exhaustion_signal_step <= 1.0) {
            return Err(ConfigError::Inconsistent(format!(
                "exhaustion signal step must be in (0, 1], got {}",
                t.exhaustion_signal_step
            )));
        }

        if t.coordination_min_wallets == 0 {
            return Err(ConfigError::Inconsistent(
                "coordination_min_wallets must be > 0".to_string(),
            ));
        }

        let non_zero_caps = [
            ("max_active_wallets", c.max_active_wallets),
            ("max_sample_wallets", c.max_sample_wallets),
            ("max_minute_buckets", c.max_minute_buckets),
            ("max_whale_log_entries", c.max_whale_log_entries),
            ("max_event_buffer_entries", c.max_event_buffer_entries),
        ];
        for (name, value) in non_zero_caps {
            if value == 0 {
                return Err(ConfigError::Inconsistent(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }
}

/// Session log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLogLevel {
    /// Flows, whale crossings, signals and transitions
    Full,
    /// Signals and transitions only
    IntelligenceOnly,
}

impl SessionLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionLogLevel::Full => "FULL",
            SessionLogLevel::IntelligenceOnly => "INTELLIGENCE_ONLY",
        }
    }
}

impl FromStr for SessionLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(SessionLogLevel::Full),
            "INTELLIGENCE_ONLY" => Ok(SessionLogLevel::IntelligenceOnly),
            other => Err(format!("unknown session log level: {}", other)),
        }
    }
}

/// Configuration for the live runtime binary
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// JSONL file the upstream adapter appends raw flows to
    pub flows_path: PathBuf,

    /// Directory for per-token session logs (`None` disables session logging)
    pub session_dir: Option<PathBuf>,

    pub session_log_level: SessionLogLevel,

    /// Channel buffer size between the reader, router and token workers
    pub channel_buffer: usize,

    /// How often idle token workers re-evaluate their state machine
    pub tick_interval_ms: u64,

    /// Tail poll interval for the flows file
    pub poll_interval_ms: u64,

    /// Signatures remembered for boundary deduplication
    pub dedup_capacity: usize,

    /// Tokens tracked at once; flows for further tokens are dropped
    pub max_tokens: usize,

    /// Read the flows file from the top instead of only new lines
    pub from_beginning: bool,
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// - `WHALEFLOW_FLOWS_PATH` (required)
    /// - `WHALEFLOW_SESSION_DIR` (optional)
    /// - `WHALEFLOW_SESSION_LOG_LEVEL` (default: FULL)
    /// - `WHALEFLOW_CHANNEL_BUFFER` (default: 10000)
    /// - `WHALEFLOW_TICK_INTERVAL_MS` (default: 1000)
    /// - `WHALEFLOW_POLL_INTERVAL_MS` (default: 500)
    /// - `WHALEFLOW_DEDUP_CAPACITY` (default: 100000)
    /// - `WHALEFLOW_MAX_TOKENS` (default: 64)
    /// - `WHALEFLOW_FROM_BEGINNING` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let flows_path = env::var("WHALEFLOW_FLOWS_PATH")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::MissingVariable("WHALEFLOW_FLOWS_PATH".to_string()))?;

        let config = Self {
            flows_path,
            session_dir: env::var("WHALEFLOW_SESSION_DIR").ok().map(PathBuf::from),
            session_log_level: env_or("WHALEFLOW_SESSION_LOG_LEVEL", SessionLogLevel::Full)?,
            channel_buffer: env_or("WHALEFLOW_CHANNEL_BUFFER", 10_000)?,
            tick_interval_ms: env_or("WHALEFLOW_TICK_INTERVAL_MS", 1_000)?,
            poll_interval_ms: env_or("WHALEFLOW_POLL_INTERVAL_MS", 500)?,
            dedup_capacity: env_or("WHALEFLOW_DEDUP_CAPACITY", 100_000)?,
            max_tokens: env_or("WHALEFLOW_MAX_TOKENS", 64)?,
            from_beginning: env_or("WHALEFLOW_FROM_BEGINNING", false)?,
        };

        if config.channel_buffer == 0 || config.tick_interval_ms == 0 || config.max_tokens == 0 {
            return Err(ConfigError::Inconsistent(
                "channel buffer, tick interval and token cap must be non-zero".to_string(),
            ));
        }

        Ok(config)
    }
}

/// Parse `name` if set; unset falls back to `default`, unparsable is an error
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    Ok(env_opt(name)?.unwrap_or(default))
}

fn env_opt<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}
