//! Flow validation - raw adapter records into `FlowEvent`
//!
//! The upstream adapter emits one JSON object per flow with the keys
//! `wallet`, `timestamp`, `direction`, `amount_sol`, `signature`, `token_ca`.
//! Nothing downstream trusts a record until it passes through here.

use super::error::FlowValidationError;
use super::types::{Direction, FlowEvent};
use serde_json::{Map, Value};

/// Solana base58 address length the adapter emits
pub const WALLET_ADDRESS_LEN: usize = 44;

/// ~Sep 2020, older timestamps are adapter bugs
pub const MIN_TIMESTAMP: i64 = 1_600_000_000;

pub const MAX_FUTURE_DRIFT_SECS: i64 = 60;

/// Mint addresses are base58; the token id also names the session log file
pub const MAX_TOKEN_LEN: usize = 64;

const REQUIRED_FIELDS: [&str; 6] = [
    "wallet",
    "timestamp",
    "direction",
    "amount_sol",
    "signature",
    "token_ca",
];

/// Stateless validator. The wall clock is injected so tests can pin it.
pub struct FlowValidator {
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl FlowValidator {
    pub fn new() -> Self {
        Self::new_with_timestamp_fn(Box::new(|| chrono::Utc::now().timestamp()))
    }

    pub fn new_with_timestamp_fn(now_fn: Box<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self { now_fn }
    }

    /// Parse one adapter JSONL line and validate it
    pub fn validate_line(&self, line: &str) -> Result<FlowEvent, FlowValidationError> {
        let value: Value =
            serde_json::from_str(line).map_err(|_| FlowValidationError::NotAnObject)?;
        self.validate(&value)
    }

    pub fn validate(&self, raw: &Value) -> Result<FlowEvent, FlowValidationError> {
        let record = raw.as_object().ok_or(FlowValidationError::NotAnObject)?;

        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|key| record.get(*key).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(FlowValidationError::MissingFields(missing));
        }

        let wallet = string_field(record, "wallet")?;
        let wallet_len = wallet.chars().count();
        if wallet_len != WALLET_ADDRESS_LEN {
            return Err(FlowValidationError::InvalidWalletLength {
                actual: wallet_len,
                expected: WALLET_ADDRESS_LEN,
            });
        }

        let timestamp = timestamp_field(record)?;
        if timestamp < MIN_TIMESTAMP {
            return Err(FlowValidationError::TimestampTooOld {
                timestamp,
                min: MIN_TIMESTAMP,
            });
        }
        let wall = (self.now_fn)();
        if timestamp > wall + MAX_FUTURE_DRIFT_SECS {
            return Err(FlowValidationError::TimestampInFuture {
                timestamp,
                wall,
                drift: MAX_FUTURE_DRIFT_SECS,
            });
        }

        let direction_raw = string_field(record, "direction")?;
        let direction = Direction::parse(direction_raw)
            .ok_or_else(|| FlowValidationError::InvalidDirection(direction_raw.to_string()))?;

        let amount_sol = record
            .get("amount_sol")
            .and_then(Value::as_f64)
            .ok_or(FlowValidationError::WrongType {
                field: "amount_sol",
                expected: "number",
            })?;
        if !(amount_sol > 0.0 && amount_sol.is_finite()) {
            return Err(FlowValidationError::NonPositiveAmount(amount_sol));
        }

        let signature = string_field(record, "signature")?;
        if signature.is_empty() {
            return Err(FlowValidationError::EmptySignature);
        }

        let token = string_field(record, "token_ca")?;
        if token.is_empty() {
            return Err(FlowValidationError::EmptyToken);
        }
        if token.len() > MAX_TOKEN_LEN || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FlowValidationError::InvalidToken(token.to_string()));
        }

        Ok(FlowEvent {
            wallet: wallet.to_string(),
            timestamp,
            direction,
            amount_sol,
            signature: signature.to_string(),
            token: token.to_string(),
        })
    }
}

impl Default for FlowValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn string_field<'a>(
    record: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, FlowValidationError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or(FlowValidationError::WrongType {
            field,
            expected: "string",
        })
}

/// Integer seconds; whole-valued floats are accepted since some adapters emit them
fn timestamp_field(record: &Map<String, Value>) -> Result<i64, FlowValidationError> {
    let value = record.get("timestamp");
    let wrong_type = FlowValidationError::WrongType {
        field: "timestamp",
        expected: "integer seconds",
    };

    if let Some(ts) = value.and_then(Value::as_i64) {
        return Ok(ts);
    }
    match value.and_then(Value::as_f64) {
        Some(ts) if ts.is_finite() && ts.fract() == 0.0 => Ok(ts as i64),
        _ => Err(wrong_type),
    }
}
