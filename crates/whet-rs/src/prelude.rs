//! Convenience re-exports for common `whet-rs` types.
//!
//! Meant to be glob-imported when building refinement runs:
//!
//! ```ignore
//! use whet_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of programs: the
//! [`OpenRouterClient`], [`Turn`] constructors, [`Refiner`] + config,
//! [`DialogueHistory`] + budget, event handlers, and the transcript
//! writer. Specialized types (wire request/response structs, the raw
//! [`request`](crate::agent::execution::request) entry point) are
//! intentionally excluded — import those from their modules directly
//! when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    Completion, CompletionBackend, CompletionError, GenerationPolicy, OpenRouterClient, Turn,
    TurnRole,
};

// ── Refinement runtime ──────────────────────────────────────────────
pub use crate::agent::{
    CompositeEventHandler, EventHandler, Exchange, FnEventHandler, LoggingHandler, NoopHandler,
    Refiner, RefinerConfig, RequestError, RunEvent, RunSummary, TranscriptWriter,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    BudgetPolicy, BudgetUnshrinkable, DialogueHistory, HeuristicTokens, SizeMetric, WordCount,
    enforce,
};

// ── Retry policy ────────────────────────────────────────────────────
pub use crate::api::RetryConfig;

// ── Analysis ────────────────────────────────────────────────────────
pub use crate::analysis::{Analyzer, DeltaAnalyzer};

// ── UI ──────────────────────────────────────────────────────────────
pub use crate::ui::{FileLogLayer, ProgressHandler};
