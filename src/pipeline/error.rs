//! Error types for flow validation and configuration loading

use super::ingestion::MAX_TOKEN_LEN;
use thiserror::Error;

/// Reason a raw flow record was rejected by the validator.
///
/// Rejections are never fatal: the record is dropped and the reason logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowValidationError {
    #[error("flow record is not a JSON object")]
    NotAnObject,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("field `{field}` has wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("wallet address has length {actual}, expected {expected}")]
    InvalidWalletLength { actual: usize, expected: usize },

    #[error("timestamp {timestamp} is older than minimum {min}")]
    TimestampTooOld { timestamp: i64, min: i64 },

    #[error("timestamp {timestamp} is more than {drift}s ahead of wall clock {wall}")]
    TimestampInFuture { timestamp: i64, wall: i64, drift: i64 },

    #[error("direction `{0}` is not `buy` or `sell`")]
    InvalidDirection(String),

    #[error("amount {0} is not strictly positive")]
    NonPositiveAmount(f64),

    #[error("signature is empty")]
    EmptySignature,

    #[error("token id is empty")]
    EmptyToken,

    #[error("token id `{0}` must be 1-{max} ASCII letters or digits", max = MAX_TOKEN_LEN)]
    InvalidToken(String),
}

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVariable(String),

    #[error("invalid value for {name}: `{value}`")]
    InvalidValue { name: String, value: String },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}
