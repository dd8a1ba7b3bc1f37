//! Rolling buffer of human-readable event lines
//!
//! Bounded by entry count and total bytes; the oldest line goes first.

use super::config::Caps;
use super::types::{StateTransitionEvent, WalletSignalEvent};
use chrono::DateTime;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct EventBuffer {
    lines: VecDeque<String>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl EventBuffer {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_entries.min(1024)),
            total_bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    pub fn from_caps(caps: &Caps) -> Self {
        Self::new(caps.max_event_buffer_entries, caps.max_event_buffer_bytes)
    }

    pub fn push_line(&mut self, line: String) {
        self.total_bytes += line.len();
        self.lines.push_back(line);

        while self.lines.len() > self.max_entries || self.total_bytes > self.max_bytes {
            match self.lines.pop_front() {
                Some(dropped) => self.total_bytes -= dropped.len(),
                None => break,
            }
        }
    }

    /// `[HH:MM:SS] STATE: A -> B [S3]`
    pub fn push_transition(&mut self, event: &StateTransitionEvent) {
        let mut line = format!(
            "[{}] STATE: {} -> {}",
            clock_label(event.timestamp),
            event.from,
            event.to
        );
        if let Some(severity) = event.severity {
            line.push_str(&format!(" [{}]", severity));
        }
        self.push_line(line);
    }

    /// `[HH:MM:SS] SIGNAL: <wallet> -> TIMING, COORDINATION`
    pub fn push_signal(&mut self, event: &WalletSignalEvent) {
        let signals = event
            .signals
            .iter()
            .map(|signal| signal.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.push_line(format!(
            "[{}] SIGNAL: {} -> {}",
            clock_label(event.timestamp),
            event.wallet.as_deref().unwrap_or("TOKEN"),
            signals
        ));
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// UTC wall time of a unix timestamp
fn clock_label(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}
