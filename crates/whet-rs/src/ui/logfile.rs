//! Tracing subscriber layer that appends warnings and errors to a file.
//!
//! The refinement loop reports recoverable trouble (failed attempts,
//! terminal failures, write errors) through `tracing`. This layer gives
//! those events a durable home: every WARN or ERROR event is appended to
//! `<log-dir>/error.log` with a local timestamp, one line per event,
//! whatever else the subscriber stack renders to the terminal.

use chrono::Local;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

/// Timestamp format for error log lines, in local time.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A [`tracing_subscriber::Layer`] that appends WARN and ERROR events to
/// `error.log` under a log directory.
pub struct FileLogLayer {
    path: PathBuf,
}

impl FileLogLayer {
    /// Create a layer writing to `error.log` under `log_dir`, ensuring
    /// the directory exists.
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self, String> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {e}"))?;
        Ok(Self {
            path: log_dir.join("error.log"),
        })
    }

    /// Path of the error log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for FileLogLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut message = visitor.message;
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            if message.is_empty() {
                message = extras.join(" ");
            } else {
                message = format!("{message} {{{}}}", extras.join(", "));
            }
        }

        let line = format!(
            "{} [{level}] {message}",
            Local::now().format(TIMESTAMP_FORMAT)
        );
        // Logging must never take the run down with it.
        let _ = self.append_line(&line);
    }
}

/// Visitor that extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let raw = format!("{value:?}");
            // Strip surrounding quotes from debug-formatted strings.
            if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
                #[allow(clippy::string_slice)] // stripping 1-byte ASCII quote chars
                {
                    self.message = raw[1..raw.len() - 1].to_string();
                }
            } else {
                self.message = raw;
            }
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}
