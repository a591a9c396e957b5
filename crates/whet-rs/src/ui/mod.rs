//! Terminal-facing output: progress rendering and durable logs.
//!
//! - [`progress`] — indicatif progress bar driven by run events.
//! - [`logfile`] — tracing layer that appends warnings and errors to
//!   `error.log`.

pub mod logfile;
pub mod progress;

// Re-export commonly used items at the module level.
pub use logfile::FileLogLayer;
pub use progress::ProgressHandler;
