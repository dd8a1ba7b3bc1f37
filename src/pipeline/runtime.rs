//! Multi-token runtime
//!
//! ```text
//! FlowTail ─→ FlowValidator ─→ mpsc ─→ router ─┬─→ worker(token A) ─→ session log / updates
//!                                     (dedup)  └─→ worker(token B) ─→ ...
//! ```
//!
//! Each token is owned by exactly one worker task. Workers share nothing but the
//! read-only `Arc<EngineConfig>`. At most `max_tokens` workers exist; flows for
//! further tokens are dropped and counted. A worker processes flows as they arrive and
//! re-evaluates its state machine on an interval so time-driven transitions
//! (exhaustion, dissipation, episode end) fire without new flows.

use super::clock::ChainTimeClock;
use super::config::{EngineConfig, RuntimeConfig, SessionLogLevel};
use super::engine::{EngineStats, TokenEngine, TokenSnapshot};
use super::event_buffer::EventBuffer;
use super::ingestion::FlowValidator;
use super::types::{FlowEvent, FlowOutcome};
use crate::session::{SessionLogger, SessionRecord, SessionSink};
use crate::source::FlowTail;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Builds the session sink for a newly seen token; `None` disables logging for it
pub type SinkFactory = Arc<dyn Fn(&str) -> Option<Box<dyn SessionSink>> + Send + Sync>;

/// Bounded FIFO set of recently seen transaction signatures
#[derive(Debug, Clone)]
pub struct SignatureDeduper {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SignatureDeduper {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity.min(65_536)),
            order: VecDeque::with_capacity(capacity.min(65_536)),
            capacity,
        }
    }

    /// True if the signature was not seen recently
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(signature) {
            return false;
        }

        self.seen.insert(signature.to_string());
        self.order.push_back(signature.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Router and worker settings
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub channel_buffer: usize,
    pub tick_interval: Duration,
    pub dedup_capacity: usize,
    /// Upper bound on concurrently tracked tokens
    pub max_tokens: usize,
    /// Recorded in SESSION_START; the sink itself applies the filter
    pub session_log_level: SessionLogLevel,
    /// Workers run on a replay clock instead of the live wall clock
    pub replay: bool,
}

impl RouterSettings {
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            channel_buffer: config.channel_buffer,
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            dedup_capacity: config.dedup_capacity,
            max_tokens: config.max_tokens,
            session_log_level: config.session_log_level,
            replay: false,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            channel_buffer: 10_000,
            tick_interval: Duration::from_secs(1),
            dedup_capacity: 100_000,
            max_tokens: 64,
            session_log_level: SessionLogLevel::Full,
            replay: false,
        }
    }
}

/// What one flow or tick changed for a token
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub token: String,
    pub outcome: FlowOutcome,
    pub snapshot: TokenSnapshot,
}

/// Final state of one worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub token: String,
    pub stats: EngineStats,
    pub snapshot: TokenSnapshot,
    pub recent_events: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouterReport {
    pub flows_routed: u64,
    pub duplicates: u64,
    /// Flows dropped because their token would exceed `max_tokens`
    pub flows_over_token_cap: u64,
    /// Sorted by token
    pub workers: Vec<WorkerReport>,
}

/// Session sinks writing `<dir>/<token>_<timestamp>.jsonl`
pub fn jsonl_sink_factory(
    dir: PathBuf,
    level: SessionLogLevel,
    config: Arc<EngineConfig>,
) -> SinkFactory {
    Arc::new(move |token: &str| {
        match SessionLogger::create_in(&dir, token, level, &config.caps) {
            Ok(logger) => Some(Box::new(logger) as Box<dyn SessionSink>),
            Err(e) => {
                log::warn!("⚠️  Session log disabled for {}: {}", token, e);
                None
            }
        }
    })
}

struct WorkerHandle {
    tx: mpsc::Sender<FlowEvent>,
    handle: JoinHandle<WorkerReport>,
}

/// Route validated flows to per-token workers until the input channel closes,
/// then close every worker and wait for it to finish.
pub async fn run_router(
    mut rx: mpsc::Receiver<FlowEvent>,
    config: Arc<EngineConfig>,
    settings: RouterSettings,
    sinks: Option<SinkFactory>,
    updates: Option<mpsc::Sender<TokenUpdate>>,
) -> RouterReport {
    let mut deduper = SignatureDeduper::new(settings.dedup_capacity);
    let mut workers: HashMap<String, WorkerHandle> = HashMap::new();
    let mut report = RouterReport::default();

    while let Some(flow) = rx.recv().await {
        if !deduper.insert(&flow.signature) {
            log::debug!("Duplicate signature {} dropped", flow.signature);
            report.duplicates += 1;
            continue;
        }

        if !workers.contains_key(&flow.token) && workers.len() >= settings.max_tokens {
            if report.flows_over_token_cap == 0 {
                log::warn!(
                    "⚠️  Token cap of {} reached; dropping flows for new tokens (first: {})",
                    settings.max_tokens,
                    flow.token
                );
            }
            report.flows_over_token_cap += 1;
            continue;
        }

        let worker = workers.entry(flow.token.clone()).or_insert_with(|| {
            log::info!("🆕 Spawning worker for {}", flow.token);
            let (tx, worker_rx) = mpsc::channel(settings.channel_buffer);
            let sink = sinks.as_ref().and_then(|factory| factory(&flow.token));
            let handle = tokio::spawn(token_worker(
                flow.token.clone(),
                Arc::clone(&config),
                settings.clone(),
                worker_rx,
                sink,
                updates.clone(),
            ));
            WorkerHandle { tx, handle }
        });

        let token = flow.token.clone();
        if worker.tx.send(flow).await.is_err() {
            log::warn!("⚠️  Worker for {} is gone; flow dropped", token);
            continue;
        }
        report.flows_routed += 1;
    }

    log::info!("🛑 Input closed, stopping {} worker(s)", workers.len());
    for (token, worker) in workers {
        drop(worker.tx);
        match worker.handle.await {
            Ok(worker_report) => report.workers.push(worker_report),
            Err(e) => log::error!("❌ Worker for {} failed: {}", token, e),
        }
    }
    report.workers.sort_by(|a, b| a.token.cmp(&b.token));
    report
}

async fn token_worker(
    token: String,
    config: Arc<EngineConfig>,
    settings: RouterSettings,
    mut rx: mpsc::Receiver<FlowEvent>,
    mut sink: Option<Box<dyn SessionSink>>,
    mut updates: Option<mpsc::Sender<TokenUpdate>>,
) -> WorkerReport {
    let clock = if settings.replay {
        ChainTimeClock::replay()
    } else {
        ChainTimeClock::live()
    };
    let mut engine = TokenEngine::new(token.clone(), Arc::clone(&config), clock);
    let mut buffer = EventBuffer::from_caps(&config.caps);

    if let Some(backend) = sink.as_ref() {
        log::info!("📊 Session backend for {}: {}", token, backend.backend_type());
    }
    write_record(
        &mut sink,
        &SessionRecord::SessionStart {
            timestamp: chrono::Utc::now().timestamp(),
            token: token.clone(),
            mode: if settings.replay { "replay" } else { "live" }.to_string(),
            log_level: settings.session_log_level.as_str().to_string(),
        },
    )
    .await;

    let mut ticker = interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            maybe_flow = rx.recv() => {
                let Some(flow) = maybe_flow else {
                    break;
                };

                write_record(&mut sink, &SessionRecord::Flow(flow.clone())).await;
                let outcome = engine.process_flow(&flow);
                if outcome.is_empty() {
                    continue;
                }
                record_outcome(&mut sink, &mut buffer, &outcome).await;
                publish(&mut updates, &engine, outcome).await;
            }

            _ = ticker.tick() => {
                let outcome = engine.tick();
                if outcome.is_empty() {
                    continue;
                }
                record_outcome(&mut sink, &mut buffer, &outcome).await;
                publish(&mut updates, &engine, outcome).await;
            }
        }
    }

    let snapshot = engine.snapshot();
    let stats = engine.stats();
    write_record(
        &mut sink,
        &SessionRecord::SessionEnd {
            timestamp: chrono::Utc::now().timestamp(),
            reason: "input closed".to_string(),
            stats,
            snapshot: Box::new(snapshot.clone()),
        },
    )
    .await;
    if let Some(backend) = sink.as_mut() {
        if let Err(e) = backend.flush().await {
            log::warn!("⚠️  Session flush failed for {}: {}", token, e);
        }
    }

    log::info!(
        "✅ Worker for {} finished: {} flows, {} whales, {} transitions",
        token,
        stats.flows_processed,
        stats.whale_events,
        stats.transitions
    );

    WorkerReport {
        token,
        stats,
        snapshot,
        recent_events: buffer.lines().map(str::to_string).collect(),
    }
}

async fn record_outcome(
    sink: &mut Option<Box<dyn SessionSink>>,
    buffer: &mut EventBuffer,
    outcome: &FlowOutcome,
) {
    for whale in &outcome.whales {
        write_record(sink, &SessionRecord::Whale(whale.clone())).await;
    }
    if let Some(signal) = &outcome.signal {
        buffer.push_signal(signal);
        write_record(sink, &SessionRecord::WalletSignal(signal.clone())).await;
    }
    if let Some(exhaustion) = &outcome.exhaustion {
        buffer.push_signal(exhaustion);
        write_record(sink, &SessionRecord::WalletSignal(exhaustion.clone())).await;
    }
    if let Some(transition) = &outcome.transition {
        buffer.push_transition(transition);
        write_record(sink, &SessionRecord::StateTransition(transition.clone())).await;
    }
}

/// Sink failures are logged and never stop the worker
async fn write_record(sink: &mut Option<Box<dyn SessionSink>>, record: &SessionRecord) {
    if let Some(backend) = sink.as_mut() {
        if let Err(e) = backend.write_record(record).await {
            log::warn!("⚠️  Failed to write {} record: {}", record.event_type(), e);
        }
    }
}

async fn publish(
    updates: &mut Option<mpsc::Sender<TokenUpdate>>,
    engine: &TokenEngine,
    outcome: FlowOutcome,
) {
    let Some(tx) = updates.as_ref() else {
        return;
    };
    let update = TokenUpdate {
        token: engine.token().to_string(),
        outcome,
        snapshot: engine.snapshot(),
    };
    if tx.send(update).await.is_err() {
        log::debug!("Update consumer for {} closed", engine.token());
        *updates = None;
    }
}

/// Counters for lines read from the flow file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Tail the flow file, validate every line and forward accepted flows.
///
/// Returns when the router side of `tx` is closed.
pub async fn ingest_from_tail(
    tail: &mut FlowTail,
    validator: &FlowValidator,
    tx: &mpsc::Sender<FlowEvent>,
) -> std::io::Result<IngestStats> {
    let mut stats = IngestStats::default();

    loop {
        let line = tokio::select! {
            line = tail.read_line() => line?,
            _ = tx.closed() => break,
        };
        stats.lines += 1;

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                stats.rejected += 1;
                log::warn!("⚠️  Rejected non-UTF-8 line: {}", e);
                continue;
            }
        };

        match validator.validate_line(&line) {
            Ok(flow) => {
                stats.accepted += 1;
                if tx.send(flow).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                stats.rejected += 1;
                log::warn!("⚠️  Rejected flow: {}", e);
            }
        }
    }

    log::info!(
        "📖 Ingestion stopped: {} lines, {} accepted, {} rejected",
        stats.lines,
        stats.accepted,
        stats.rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduper_rejects_repeats() {
        let mut deduper = SignatureDeduper::new(10);
        assert!(deduper.insert("a"));
        assert!(!deduper.insert("a"));
        assert!(deduper.insert("b"));
        assert_eq!(deduper.len(), 2);
    }

    #[test]
    fn test_deduper_forgets_oldest_past_capacity() {
        let mut deduper = SignatureDeduper::new(2);
        deduper.insert("a");
        deduper.insert("b");
        deduper.insert("c");

        assert_eq!(deduper.len(), 2);
        assert!(deduper.insert("a"), "oldest signature was forgotten");
        assert!(!deduper.insert("c"));
    }

    #[test]
    fn test_router_settings_from_runtime() {
        let runtime = RuntimeConfig {
            flows_path: PathBuf::from("flows.jsonl"),
            session_dir: None,
            session_log_level: SessionLogLevel::Full,
            channel_buffer: 64,
            tick_interval_ms: 250,
            poll_interval_ms: 100,
            dedup_capacity: 5,
            max_tokens: 3,
            from_beginning: false,
        };
        let settings = RouterSettings::from_runtime(&runtime);
        assert_eq!(settings.channel_buffer, 64);
        assert_eq!(settings.tick_interval, Duration::from_millis(250));
        assert_eq!(settings.dedup_capacity, 5);
        assert_eq!(settings.max_tokens, 3);
        assert_eq!(settings.session_log_level, SessionLogLevel::Full);
        assert!(!settings.replay);
    }
}
