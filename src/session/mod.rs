//! Session logging and replay
//!
//! Every tracked token writes an append-only JSONL log of what it saw and
//! concluded. A log can be replayed into a fresh engine to reproduce a session.

pub mod jsonl_writer;
pub mod records;
pub mod replay;
pub mod writer_backend;

pub use jsonl_writer::SessionLogger;
pub use records::SessionRecord;
pub use replay::{extract_flows, read_session, replay_flows, replay_session, ReplayReport};
pub use writer_backend::{SessionError, SessionSink};
