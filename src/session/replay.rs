//! Session log reader and deterministic replay
//!
//! Replay feeds the logged FLOW records, in file order, into a fresh engine
//! running on a replay clock. Given the same configuration it reproduces the
//! whale events, signals and transitions of the original session.

use super::records::SessionRecord;
use super::writer_backend::SessionError;
use crate::pipeline::{
    EngineConfig, FlowEvent, FlowOutcome, StateTransitionEvent, TokenEngine, TokenSnapshot,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Result of replaying one session log
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub token: String,
    pub flows: usize,
    pub outcomes: Vec<FlowOutcome>,
    pub snapshot: TokenSnapshot,
}

impl ReplayReport {
    pub fn transitions(&self) -> impl Iterator<Item = &StateTransitionEvent> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.transition.as_ref())
    }
}

/// Parse every record; malformed or blank lines are skipped with a warning
pub fn read_session(path: &Path) -> Result<Vec<SessionRecord>, SessionError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!(
                "⚠️  Skipping malformed session line {} in {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }

    Ok(records)
}

/// FLOW records in file order
pub fn extract_flows(records: &[SessionRecord]) -> Vec<FlowEvent> {
    records
        .iter()
        .filter_map(|record| match record {
            SessionRecord::Flow(flow) => Some(flow.clone()),
            _ => None,
        })
        .collect()
}

/// Run `flows` through a fresh replay-mode engine for `token`
pub fn replay_flows(
    token: &str,
    config: Arc<EngineConfig>,
    flows: &[FlowEvent],
) -> (Vec<FlowOutcome>, TokenSnapshot) {
    let mut engine = TokenEngine::replay(token, config);
    let outcomes = flows.iter().map(|flow| engine.process_flow(flow)).collect();
    (outcomes, engine.snapshot())
}

pub fn replay_session(path: &Path, config: Arc<EngineConfig>) -> Result<ReplayReport, SessionError> {
    let records = read_session(path)?;
    let flows = extract_flows(&records);

    let token = records
        .iter()
        .find_map(|record| match record {
            SessionRecord::SessionStart { token, .. } => Some(token.clone()),
            _ => None,
        })
        .or_else(|| flows.first().map(|flow| flow.token.clone()))
        .ok_or_else(|| SessionError::NoFlows(path.to_path_buf()))?;

    if flows.is_empty() {
        return Err(SessionError::NoFlows(path.to_path_buf()));
    }

    log::info!(
        "🔁 Replaying {} flows for {} from {}",
        flows.len(),
        token,
        path.display()
    );

    let (outcomes, snapshot) = replay_flows(&token, config, &flows);
    Ok(ReplayReport {
        token,
        flows: flows.len(),
        outcomes,
        snapshot,
    })
}
