//! Session log record schema
//!
//! One JSON object per line, discriminated by `event_type`.

use crate::pipeline::{
    EngineStats, FlowEvent, StateTransitionEvent, TokenSnapshot, WalletSignalEvent, WhaleEvent,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionRecord {
    SessionStart {
        timestamp: i64,
        token: String,
        /// `live` or `replay`
        mode: String,
        log_level: String,
    },
    Flow(FlowEvent),
    Whale(WhaleEvent),
    WalletSignal(WalletSignalEvent),
    StateTransition(StateTransitionEvent),
    SessionEnd {
        timestamp: i64,
        reason: String,
        stats: EngineStats,
        snapshot: Box<TokenSnapshot>,
    },
}

impl SessionRecord {
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionRecord::SessionStart { .. } => "SESSION_START",
            SessionRecord::Flow(_) => "FLOW",
            SessionRecord::Whale(_) => "WHALE",
            SessionRecord::WalletSignal(_) => "WALLET_SIGNAL",
            SessionRecord::StateTransition(_) => "STATE_TRANSITION",
            SessionRecord::SessionEnd { .. } => "SESSION_END",
        }
    }

    /// Raw input records are dropped at `INTELLIGENCE_ONLY`
    pub fn is_raw_input(&self) -> bool {
        matches!(self, SessionRecord::Flow(_) | SessionRecord::Whale(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Direction;

    #[test]
    fn test_flow_record_is_tagged() {
        let record = SessionRecord::Flow(FlowEvent {
            wallet: "W".to_string(),
            timestamp: 1_700_000_000,
            direction: Direction::Sell,
            amount_sol: 2.5,
            signature: "sig".to_string(),
            token: "T".to_string(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_type"], "FLOW");
        assert_eq!(json["direction"], "sell");
        assert_eq!(json["amount_sol"], 2.5);

        let parsed: SessionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_raw_input());
    }

    #[test]
    fn test_session_start_event_type() {
        let record = SessionRecord::SessionStart {
            timestamp: 1,
            token: "T".to_string(),
            mode: "live".to_string(),
            log_level: "FULL".to_string(),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"event_type\":\"SESSION_START\""));
        assert_eq!(record.event_type(), "SESSION_START");
        assert!(!record.is_raw_input());
    }
}
