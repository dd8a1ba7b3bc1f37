//! Writer backend trait for session records

use super::records::SessionRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No flow records in session log {0}")]
    NoFlows(PathBuf),
}

/// Backend trait for writing session records
#[async_trait]
pub trait SessionSink: Send {
    /// Write a single record; records filtered by the log level are skipped
    async fn write_record(&mut self, record: &SessionRecord) -> Result<(), SessionError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), SessionError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
