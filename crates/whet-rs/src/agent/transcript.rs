//! Conversation transcript persisted as JSON Lines.
//!
//! [`TranscriptWriter`] is an [`EventHandler`] that appends both turns of
//! every completed exchange to `<log-dir>/conversation.jsonl`, one JSON
//! object per line:
//!
//! ```text
//! {"timestamp":"2026-08-22 14:03:11","role":"user","content":"..."}
//! {"timestamp":"2026-08-22 14:03:11","role":"assistant","content":"..."}
//! ```
//!
//! Lines are appended as rounds complete, so an interrupted run still
//! leaves a readable transcript of everything achieved up to that point.

use super::events::{EventHandler, RunEvent};
use crate::{Turn, TurnRole};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Timestamp format for transcript records, in local time.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One line of the transcript file.
#[derive(Serialize)]
struct TranscriptRecord<'a> {
    timestamp: String,
    role: &'a TurnRole,
    content: &'a str,
}

/// Appends completed exchanges to `conversation.jsonl` under a log
/// directory.
pub struct TranscriptWriter {
    path: PathBuf,
}

impl TranscriptWriter {
    /// Create a writer rooted at `log_dir`, ensuring the directory exists.
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self, String> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {e}"))?;
        Ok(Self {
            path: log_dir.join("conversation.jsonl"),
        })
    }

    /// Path of the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_turn(&self, turn: &Turn) -> Result<(), String> {
        let record = TranscriptRecord {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            role: &turn.role,
            content: &turn.content,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| format!("Failed to serialize transcript record: {e}"))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("Failed to open transcript: {e}"))?;
        writeln!(file, "{line}").map_err(|e| format!("Failed to write transcript: {e}"))?;
        Ok(())
    }
}

impl EventHandler for TranscriptWriter {
    fn on_event(&self, event: &RunEvent<'_>) {
        if let RunEvent::RoundComplete { exchange, .. } = event {
            for turn in [&exchange.user_turn, &exchange.assistant_turn] {
                if let Err(e) = self.append_turn(turn) {
                    warn!("Transcript write failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::events::{Exchange, RunSummary};
    use super::*;

    fn exchange(user: &str, assistant: &str) -> Exchange {
        Exchange {
            user_turn: Turn::user(user),
            assistant_turn: Turn::assistant(assistant),
            cost_consumed: 1,
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn records_user_then_assistant_per_round() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path()).unwrap();
        let ex = exchange("improve", "better");

        writer.on_event(&RunEvent::RoundComplete {
            round: 1,
            exchange: &ex,
        });

        let lines = read_lines(writer.path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["role"], "user");
        assert_eq!(lines[0]["content"], "improve");
        assert_eq!(lines[1]["role"], "assistant");
        assert_eq!(lines[1]["content"], "better");
        let ts = lines[0]["timestamp"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn appends_across_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path()).unwrap();

        let first = exchange("improve", "v1");
        let second = exchange("improve", "v2");
        writer.on_event(&RunEvent::RoundComplete {
            round: 1,
            exchange: &first,
        });
        writer.on_event(&RunEvent::RoundComplete {
            round: 2,
            exchange: &second,
        });

        let lines = read_lines(writer.path());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3]["content"], "v2");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("log");

        let writer = TranscriptWriter::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(writer.path(), nested.join("conversation.jsonl"));
    }

    #[test]
    fn ignores_events_other_than_round_complete() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path()).unwrap();

        let summary = RunSummary {
            rounds_completed: 0,
            rounds_requested: 1,
            total_cost: 0,
            final_answer: None,
            failure: None,
        };
        writer.on_event(&RunEvent::Finished { summary: &summary });

        assert!(!writer.path().exists());
    }
}
