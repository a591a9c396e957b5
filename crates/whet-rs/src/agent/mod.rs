//! Refinement runtime: the [`Refiner`] loop and its supporting modules.
//!
//! This module contains everything needed to drive an iterative
//! answer-refinement run:
//!
//! - [`harness::Refiner`] — the core refinement loop. Start here.
//! - [`config::RefinerConfig`] — model, rounds, instruction, budget, and
//!   retry settings.
//! - [`execution`] — single-request execution: budget enforcement, the
//!   retry loop, and size recovery.
//! - [`events`] — [`EventHandler`] trait and [`RunEvent`] enum for
//!   observing the loop. Includes [`LoggingHandler`],
//!   [`CompositeEventHandler`], and [`FnEventHandler`].
//! - [`transcript`] — append each completed exchange to a JSON Lines
//!   file.

pub mod config;
pub mod events;
pub mod execution;
pub mod harness;
pub mod transcript;

// Re-export commonly used items at the module level.
pub use config::RefinerConfig;
pub use events::{
    CompositeEventHandler, EventHandler, Exchange, FnEventHandler, LoggingHandler, NoopHandler,
    RunEvent, RunSummary,
};
pub use execution::{RequestError, RequestOutcome, request};
pub use harness::Refiner;
pub use transcript::TranscriptWriter;
