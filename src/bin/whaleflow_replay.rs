//! Whaleflow replay runner
//!
//! Re-processes the FLOW records of a recorded session log through a fresh
//! engine on the replay clock and prints every transition and token-level
//! exhaustion signal it produces.
//!
//! Usage:
//!   cargo run --release --bin whaleflow_replay -- <session.jsonl> [--json]
//!
//! `--json` prints transitions and the final snapshot as JSON lines on stdout.
//! Threshold overrides are read from the same `WHALEFLOW_*` variables as the
//! live runner, so a replay can test a different configuration.

use dotenv::dotenv;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use whaleflow::pipeline::{EngineConfig, EventBuffer};
use whaleflow::session::replay_session;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    let path = match args.iter().find(|arg| !arg.starts_with("--")) {
        Some(path) => PathBuf::from(path),
        None => {
            error!("❌ Missing session log. Usage: whaleflow_replay <session.jsonl> [--json]");
            std::process::exit(2);
        }
    };

    let config = match EngineConfig::from_env().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("❌ Invalid engine configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("📖 Replaying {}", path.display());
    let report = replay_session(&path, Arc::clone(&config))?;

    if json {
        for transition in report.transitions() {
            println!("{}", serde_json::to_string(transition)?);
        }
        println!("{}", serde_json::to_string(&report.snapshot)?);
        return Ok(());
    }

    let mut buffer = EventBuffer::from_caps(&config.caps);
    for outcome in &report.outcomes {
        if let Some(exhaustion) = &outcome.exhaustion {
            buffer.push_signal(exhaustion);
        }
        if let Some(transition) = &outcome.transition {
            buffer.push_transition(transition);
        }
    }
    for line in buffer.lines() {
        println!("{}", line);
    }

    let snapshot = &report.snapshot;
    info!("✅ Replay of {} complete", report.token);
    info!("   ├─ Flows: {}", report.flows);
    info!("   ├─ Transitions: {}", report.transitions().count());
    info!(
        "   ├─ Final phase: {} (episode {}, wave {})",
        snapshot.phase, snapshot.episode_id, snapshot.wave
    );
    info!(
        "   ├─ Wallets: {} tracked, {} early",
        snapshot.tracked_wallets, snapshot.early_wallets
    );
    info!(
        "   ├─ Silent wallets: {}/{}",
        snapshot.silent.silent_count, snapshot.silent.total_count
    );
    info!(
        "   ├─ Net flow: {:.2} SOL (sell ratio {:.2})",
        snapshot.net_flow_sol, snapshot.sell_ratio
    );
    info!("   └─ {}", snapshot.verdict);

    Ok(())
}
