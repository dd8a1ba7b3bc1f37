//! Whaleflow live runner
//!
//! Tails the upstream adapter's JSONL output, validates every line and routes
//! flows to one engine worker per token. Each worker writes its own session
//! log when `WHALEFLOW_SESSION_DIR` is set.
//!
//! ```text
//! flows.jsonl ─ FlowTail ─ FlowValidator ─ mpsc ─ router ─┬─ worker(token A) ─ session log
//!                                                         └─ worker(token B) ─ session log
//! ```
//!
//! Usage:
//!   cargo run --release --bin whaleflow_live
//!
//! Environment variables:
//!   WHALEFLOW_FLOWS_PATH - Adapter JSONL file (required)
//!   WHALEFLOW_SESSION_DIR - Session log directory (optional)
//!   WHALEFLOW_SESSION_LOG_LEVEL - FULL or INTELLIGENCE_ONLY (default: FULL)
//!   WHALEFLOW_MAX_TOKENS - Tokens tracked at once (default: 64)
//!   WHALEFLOW_POOL_LIQUIDITY_SOL - Scale whale thresholds to pool size (optional)

use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use whaleflow::pipeline::runtime::{ingest_from_tail, jsonl_sink_factory};
use whaleflow::pipeline::{
    run_router, EngineConfig, FlowEvent, FlowValidator, RouterSettings, RuntimeConfig, TokenUpdate,
};
use whaleflow::source::FlowTail;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Whaleflow live runner");

    let config = match EngineConfig::from_env().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("❌ Invalid engine configuration: {}", e);
            std::process::exit(1);
        }
    };
    let runtime = match RuntimeConfig::from_env() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("❌ Invalid runtime configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("   ├─ Flows: {}", runtime.flows_path.display());
    info!(
        "   ├─ Whale thresholds: {:.2} / {:.2} / {:.2} SOL",
        config.thresholds.whale_single_tx,
        config.thresholds.whale_cum_5min,
        config.thresholds.whale_cum_15min
    );
    info!(
        "   ├─ Caps: {} wallets per token, {} tokens",
        config.caps.max_active_wallets, runtime.max_tokens
    );
    match &runtime.session_dir {
        Some(dir) => info!(
            "   └─ Session logs: {} ({})",
            dir.display(),
            runtime.session_log_level.as_str()
        ),
        None => info!("   └─ Session logs: disabled"),
    }

    let sinks = match &runtime.session_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Some(jsonl_sink_factory(
                dir.clone(),
                runtime.session_log_level,
                Arc::clone(&config),
            ))
        }
        None => None,
    };

    let mut tail = FlowTail::new(
        runtime.flows_path.clone(),
        Duration::from_millis(runtime.poll_interval_ms),
        runtime.from_beginning,
    );
    if let Err(e) = tail.start().await {
        if e.kind() == std::io::ErrorKind::NotFound {
            warn!(
                "⚠️  {} does not exist yet, waiting for the adapter",
                runtime.flows_path.display()
            );
        } else {
            return Err(e.into());
        }
    }

    let (tx, rx) = mpsc::channel::<FlowEvent>(runtime.channel_buffer);
    let (update_tx, mut update_rx) = mpsc::channel::<TokenUpdate>(runtime.channel_buffer);

    let router = tokio::spawn(run_router(
        rx,
        Arc::clone(&config),
        RouterSettings::from_runtime(&runtime),
        sinks,
        Some(update_tx),
    ));

    let updates = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            if let Some(exhaustion) = update
                .outcome
                .exhaustion
                .as_ref()
                .and_then(|event| event.details.exhaustion.as_ref())
            {
                warn!(
                    "🔕 {} early cohort {}/{} silent ({:.0}%)",
                    update.token,
                    exhaustion.silent_count,
                    exhaustion.eligible_count,
                    exhaustion.disengagement_pct * 100.0
                );
            }
            if let Some(transition) = &update.outcome.transition {
                info!(
                    "🌊 {} episode {} wave {}: {} ({} wallets, {} whales in 2m)",
                    update.token,
                    transition.episode_id,
                    update.snapshot.wave,
                    transition.to,
                    update.snapshot.tracked_wallets,
                    update.snapshot.whale_density
                );
                info!("   └─ {}", update.snapshot.verdict);
            }
        }
    });

    let ingest = tokio::spawn(async move {
        let validator = FlowValidator::new();
        ingest_from_tail(&mut tail, &validator, &tx).await
    });

    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    // Aborting ingestion drops the sender, which closes the router
    ingest.abort();
    match ingest.await {
        Ok(Err(e)) => error!("❌ Flow tail failed: {}", e),
        Ok(Ok(_)) | Err(_) => {}
    }

    let report = router.await?;
    let _ = updates.await;

    info!(
        "📊 Routed {} flows ({} duplicates) across {} tokens",
        report.flows_routed,
        report.duplicates,
        report.workers.len()
    );
    if report.flows_over_token_cap > 0 {
        warn!(
            "⚠️  {} flows dropped over the {}-token cap",
            report.flows_over_token_cap, runtime.max_tokens
        );
    }
    for worker in &report.workers {
        info!(
            "   ├─ {}: {} in episode {}, {} flows, {} transitions",
            worker.token,
            worker.snapshot.phase,
            worker.snapshot.episode_id,
            worker.stats.flows_processed,
            worker.stats.transitions
        );
        for line in &worker.recent_events {
            info!("   │  {}", line);
        }
    }

    info!("✅ Whaleflow stopped");
    Ok(())
}
