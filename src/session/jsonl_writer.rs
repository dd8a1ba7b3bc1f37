//! JSONL session logger - one append-only file per token session

use super::records::SessionRecord;
use super::writer_backend::{SessionError, SessionSink};
use crate::pipeline::config::{Caps, SessionLogLevel};
use async_trait::async_trait;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct SessionLogger {
    writer: BufWriter<File>,
    path: PathBuf,
    level: SessionLogLevel,
    max_detail_chars: usize,
    max_array_items: usize,
    records_written: u64,
    last_flush: Instant,
}

impl SessionLogger {
    /// Append to `path`, creating the file if needed
    pub fn open(path: &Path, level: SessionLogLevel, caps: &Caps) -> Result<Self, SessionError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("📝 Writing session log to: {}", path.display());

        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            level,
            max_detail_chars: caps.max_detail_chars,
            max_array_items: caps.max_sample_wallets,
            records_written: 0,
            last_flush: Instant::now(),
        })
    }

    /// New file `<token>_<YYYYmmdd_HHMMSS>.jsonl` inside `dir`
    ///
    /// Only ASCII letters and digits of `token` reach the file name, so the
    /// file always lands directly in `dir`.
    pub fn create_in(
        dir: &Path,
        token: &str,
        level: SessionLogLevel,
        caps: &Caps,
    ) -> Result<Self, SessionError> {
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let stem = file_stem(token);
        Self::open(&dir.join(format!("{}_{}.jsonl", stem, stamp)), level, caps)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Returns `false` when the record was filtered out by the log level
    pub fn write_record(&mut self, record: &SessionRecord) -> Result<bool, SessionError> {
        if self.level == SessionLogLevel::IntelligenceOnly && record.is_raw_input() {
            return Ok(false);
        }

        let mut value = serde_json::to_value(record)?;
        if let Some(details) = value.get_mut("details") {
            cap_value(details, self.max_detail_chars, self.max_array_items);
        }

        serde_json::to_writer(&mut self.writer, &value)?;
        self.writer.write_all(b"\n")?;
        self.records_written += 1;

        if self.last_flush.elapsed() > FLUSH_INTERVAL {
            self.flush()?;
        }
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<(), SessionError> {
        self.writer.flush()?;
        self.last_flush = Instant::now();
        Ok(())
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[async_trait]
impl SessionSink for SessionLogger {
    async fn write_record(&mut self, record: &SessionRecord) -> Result<(), SessionError> {
        SessionLogger::write_record(self, record)?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SessionError> {
        SessionLogger::flush(self)
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

/// ASCII alphanumerics of `token`, `"token"` when none remain
fn file_stem(token: &str) -> String {
    let stem: String = token.chars().filter(char::is_ascii_alphanumeric).collect();
    if stem.is_empty() {
        "token".to_string()
    } else {
        stem
    }
}

/// Truncate long strings and arrays, recursively
pub fn cap_value(value: &mut Value, max_chars: usize, max_items: usize) {
    match value {
        Value::String(text) => {
            if text.chars().count() > max_chars {
                let mut truncated: String = text.chars().take(max_chars).collect();
                truncated.push_str("...");
                *text = truncated;
            }
        }
        Value::Array(items) => {
            items.truncate(max_items);
            for item in items.iter_mut() {
                cap_value(item, max_chars, max_items);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                cap_value(item, max_chars, max_items);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{
        Direction, FlowEvent, Severity, StateTransitionEvent, TokenPhase, TransitionDetails,
        TransitionTrigger,
    };
    use serde_json::json;

    fn flow_record() -> SessionRecord {
        SessionRecord::Flow(FlowEvent {
            wallet: "W".to_string(),
            timestamp: 1_700_000_000,
            direction: Direction::Buy,
            amount_sol: 1.0,
            signature: "sig".to_string(),
            token: "T".to_string(),
        })
    }

    fn transition_record(samples: usize) -> SessionRecord {
        SessionRecord::StateTransition(StateTransitionEvent {
            token: "T".to_string(),
            timestamp: 1_700_000_000,
            episode_id: 1,
            from: TokenPhase::Ignition,
            to: TokenPhase::CoordinationSpike,
            trigger: TransitionTrigger::CoordinatedEarlyWallets,
            details: TransitionDetails {
                coordinated_count: Some(samples),
                sample_wallets: (0..samples).map(|i| format!("wallet{}", i)).collect(),
                ..TransitionDetails::default()
            },
            severity: Some(Severity::S2),
        })
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_cap_value_recursive() {
        let mut value = json!({
            "note": "x".repeat(400),
            "nested": { "list": [1, 2, 3, 4, 5, 6, 7], "short": "ok" }
        });
        cap_value(&mut value, 320, 5);

        let note = value["note"].as_str().unwrap();
        assert_eq!(note.len(), 323);
        assert!(note.ends_with("..."));
        assert_eq!(value["nested"]["list"].as_array().unwrap().len(), 5);
        assert_eq!(value["nested"]["short"], "ok");
    }

    #[test]
    fn test_full_level_writes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut logger = SessionLogger::open(&path, SessionLogLevel::Full, &Caps::default()).unwrap();

        assert!(logger.write_record(&flow_record()).unwrap());
        assert!(logger.write_record(&transition_record(3)).unwrap());
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event_type"], "FLOW");
        assert_eq!(lines[1]["event_type"], "STATE_TRANSITION");
    }

    #[test]
    fn test_intelligence_only_drops_raw_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut logger =
            SessionLogger::open(&path, SessionLogLevel::IntelligenceOnly, &Caps::default()).unwrap();

        assert!(!logger.write_record(&flow_record()).unwrap());
        assert!(logger.write_record(&transition_record(3)).unwrap());
        assert_eq!(logger.records_written(), 1);
        drop(logger);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event_type"], "STATE_TRANSITION");
    }

    #[test]
    fn test_details_capped_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut logger = SessionLogger::open(&path, SessionLogLevel::Full, &Caps::default()).unwrap();
        logger.write_record(&transition_record(9)).unwrap();
        logger.flush().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines[0]["details"]["coordinated_count"], 9);
        assert_eq!(lines[0]["details"]["sample_wallets"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_create_in_keeps_file_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("sessions");

        let logger = SessionLogger::create_in(
            &session_dir,
            "../escaped",
            SessionLogLevel::Full,
            &Caps::default(),
        )
        .unwrap();
        assert_eq!(logger.path().parent().unwrap(), session_dir.as_path());
        assert!(logger
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("escaped_"));

        let dots = SessionLogger::create_in(&session_dir, "/..", SessionLogLevel::Full, &Caps::default())
            .unwrap();
        assert_eq!(dots.path().parent().unwrap(), session_dir.as_path());
        assert!(dots.path().file_name().unwrap().to_string_lossy().starts_with("token_"));
    }

    #[tokio::test]
    async fn test_sink_trait_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink: Box<dyn SessionSink> = Box::new(
            SessionLogger::create_in(dir.path(), "TOKEN", SessionLogLevel::Full, &Caps::default())
                .unwrap(),
        );
        assert_eq!(sink.backend_type(), "JSONL");
        sink.write_record(&flow_record()).await.unwrap();
        sink.flush().await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("TOKEN_"));
        assert_eq!(read_lines(&path).len(), 1);
    }
}
