//! Event observation for the refinement loop.
//!
//! The [`Refiner`](super::harness::Refiner) reports everything it does
//! through the [`EventHandler`] trait: round starts, evictions, failed
//! attempts, completed exchanges, analysis reports, and the terminal
//! outcome. Handlers are pure observers; the loop never branches on what
//! a handler does, so a misbehaving observer cannot corrupt a run.
//!
//! Handler choice:
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Default; ignores everything |
//! | [`LoggingHandler`] | Emits events through `tracing` |
//! | [`FnEventHandler`] | Closure-based ad-hoc observation |
//! | [`CompositeEventHandler`] | Fans out to several handlers |
//!
//! [`TranscriptWriter`](super::transcript::TranscriptWriter) persists
//! exchanges to disk and
//! [`ProgressHandler`](crate::ui::progress::ProgressHandler) drives a
//! terminal progress bar; both are ordinary handlers registered the same
//! way.

use super::execution::RequestError;
use crate::context::budget::BudgetUsage;
use crate::{CompletionError, Turn};
use tracing::{debug, info, warn};

// ── Output types ───────────────────────────────────────────────────

/// One completed round: the instruction sent, the reply received, and
/// the cost the provider reported for the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user_turn: Turn,
    pub assistant_turn: Turn,
    pub cost_consumed: u32,
}

/// Final outcome of a run: everything achieved before it stopped.
#[derive(Debug)]
pub struct RunSummary {
    /// Rounds that produced an exchange.
    pub rounds_completed: u32,
    /// Rounds the run was asked to drive.
    pub rounds_requested: u32,
    /// Sum of per-call costs across the run.
    pub total_cost: u64,
    /// The latest assistant answer, if any round completed.
    pub final_answer: Option<String>,
    /// Why the run stopped early, if it did.
    pub failure: Option<RequestError>,
}

impl RunSummary {
    /// Whether every requested round completed.
    pub fn completed(&self) -> bool {
        self.failure.is_none() && self.rounds_completed == self.rounds_requested
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the refiner as a run progresses.
///
/// Variants borrow from the loop's state; copy out anything you need to
/// keep past the callback.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// A round is about to send its request. `round` is 1-based.
    RoundStart {
        round: u32,
        rounds: u32,
        usage: &'a BudgetUsage,
    },
    /// Dialogue pairs were evicted, either by pre-send enforcement or by
    /// size recovery after a provider rejection.
    Eviction { round: u32, pairs_evicted: usize },
    /// A completion attempt failed. Recovery (if any) follows.
    AttemptFailed {
        round: u32,
        attempt: u32,
        max_attempts: u32,
        error: &'a CompletionError,
    },
    /// A round completed; the exchange is final.
    RoundComplete { round: u32, exchange: &'a Exchange },
    /// An analyzer compared this round's answer with the previous one.
    Analysis { round: u32, report: &'a str },
    /// A terminal failure stopped the run before its requested rounds.
    RunFailed { round: u32, error: &'a RequestError },
    /// The run is over; no more events will follow.
    Finished { summary: &'a RunSummary },
}

// ── Handler trait and adapters ─────────────────────────────────────

/// Observer of refiner events.
///
/// Called synchronously on the loop's task, so handlers should return
/// promptly. The default implementation ignores everything; implement
/// only what you care about by matching on the variant.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &RunEvent<'_>) {
        let _ = event;
    }
}

/// Handler that ignores all events.
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

/// Closure-based handler for ad-hoc observation.
///
/// # Example
///
/// ```ignore
/// let handler = FnEventHandler(|event: &RunEvent<'_>| {
///     if let RunEvent::RoundComplete { round, .. } = event {
///         println!("round {round} done");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(pub F)
where
    F: Fn(&RunEvent<'_>) + Send + Sync;

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        (self.0)(event)
    }
}

/// Fans every event out to all registered handlers, in registration
/// order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    /// Add a handler when one is present.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs all events through `tracing`: round lifecycle at `info`,
/// evictions and analysis at `debug`, failures at `warn`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RoundStart {
                round,
                rounds,
                usage,
            } => {
                info!("[round {}/{}] {}", round, rounds, usage.to_log_string());
            }
            RunEvent::Eviction {
                round,
                pairs_evicted,
            } => {
                debug!("[round {round}] evicted {pairs_evicted} dialogue pair(s)");
            }
            RunEvent::AttemptFailed {
                round,
                attempt,
                max_attempts,
                error,
            } => {
                warn!("[round {round}] attempt {attempt}/{max_attempts} failed: {error}");
            }
            RunEvent::RoundComplete { round, exchange } => {
                info!(
                    "[round {round}] complete: {} tokens, reply: {}",
                    exchange.cost_consumed,
                    preview(&exchange.assistant_turn.content),
                );
            }
            RunEvent::Analysis { round, report } => {
                debug!("[round {round}] analysis: {report}");
            }
            RunEvent::RunFailed { round, error } => {
                warn!("[round {round}] run stopped: {error}");
            }
            RunEvent::Finished { summary } => {
                info!(
                    "run finished: {}/{} rounds, {} total tokens",
                    summary.rounds_completed, summary.rounds_requested, summary.total_cost,
                );
            }
        }
    }
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}
