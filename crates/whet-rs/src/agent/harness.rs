//! Refinement harness: a budget-aware "ask the model to improve its own
//! answer" loop on top of a chat completions backend.
//!
//! Each round the [`Refiner`] appends the refinement instruction to the
//! dialogue, executes one budget-enforced, retried completion request via
//! [`execution::request`], and appends the reply. The dialogue therefore
//! grows by one (instruction, reply) pair per round until eviction starts
//! reclaiming the oldest pairs.
//!
//! A terminal request failure stops the loop early; everything achieved up
//! to that point is returned in the [`RunSummary`]. Callers observe the
//! loop via [`EventHandler`] events.

use super::config::RefinerConfig;
use super::events::{EventHandler, Exchange, NoopHandler, RunEvent, RunSummary};
use super::execution;
use crate::analysis::Analyzer;
use crate::context::budget::{HeuristicTokens, SizeMetric};
use crate::context::history::DialogueHistory;
use crate::{CompletionBackend, Turn};
use tracing::{info, warn};

// ── Refiner ────────────────────────────────────────────────────────

/// The iterative refinement loop.
///
/// Sensible defaults throughout; standard use needs no builder methods:
///
/// ```ignore
/// let client = OpenRouterClient::new(api_key)?;
/// let config = RefinerConfig::default();
/// let history = DialogueHistory::new(
///     "You are a helpful assistant.",
///     "Write Hello World in Python.",
/// );
///
/// let summary = Refiner::new(&client, config).run(history).await;
/// println!("{}", summary.final_answer.unwrap_or_default());
/// ```
///
/// # Lifetimes
///
/// `Refiner<'a>` borrows the backend, event handler, and analyzer by
/// reference to avoid unnecessary heap allocation. The references must all
/// outlive the `.run()` call. Bind everything to `let` bindings *before*
/// building the refiner:
///
/// ```ignore
/// // Correct: handler lives long enough.
/// let handler = CompositeEventHandler::new().with(LoggingHandler);
/// let summary = Refiner::new(&client, config)
///     .with_event_handler(&handler)
///     .run(history)
///     .await;
///
/// // Wrong — temporary dropped before .run():
/// // let summary = Refiner::new(&client, config)
/// //     .with_event_handler(&CompositeEventHandler::new().with(LoggingHandler))
/// //     .run(history)
/// //     .await;
/// ```
pub struct Refiner<'a> {
    backend: &'a dyn CompletionBackend,
    config: RefinerConfig,
    metric: Box<dyn SizeMetric>,
    event_handler: &'a dyn EventHandler,
    analyzer: Option<&'a dyn Analyzer>,
}

impl<'a> Refiner<'a> {
    /// Create a new refiner with the given backend and config.
    pub fn new(backend: &'a dyn CompletionBackend, config: RefinerConfig) -> Self {
        Self {
            backend,
            config,
            metric: Box::new(HeuristicTokens::new()),
            event_handler: &NoopHandler,
            analyzer: None,
        }
    }

    /// Attach an event handler.
    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Attach an analyzer. It compares each round's reply with the previous
    /// one, so it first runs on the second completed round.
    pub fn with_analyzer(mut self, analyzer: &'a dyn Analyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Replace the size metric used for budget enforcement.
    pub fn with_size_metric(mut self, metric: impl SizeMetric + 'static) -> Self {
        self.metric = Box::new(metric);
        self
    }

    /// Run the refinement loop.
    ///
    /// Takes ownership of the seeded dialogue and drives it for the
    /// configured number of rounds. Never returns an error: a terminal
    /// failure ends the loop early and lands in [`RunSummary::failure`]
    /// alongside whatever the run achieved before it.
    pub async fn run(self, mut history: DialogueHistory) -> RunSummary {
        let generation = self.config.generation_policy();
        let rounds_requested = self.config.rounds;

        info!(
            "Refinement run started: model={}, rounds={}",
            generation.model, rounds_requested
        );

        let mut rounds_completed: u32 = 0;
        let mut total_cost: u64 = 0;
        let mut failure = None;

        for round in 1..=rounds_requested {
            history.push_user(&self.config.instruction);

            // Captured before the request so eviction inside it cannot
            // change what the analyzer compares against.
            let previous_answer = history.last_assistant().map(String::from);

            let usage = self.config.budget.usage(&history, self.metric.as_ref());
            self.event_handler.on_event(&RunEvent::RoundStart {
                round,
                rounds: rounds_requested,
                usage: &usage,
            });

            let outcome = match execution::request(
                self.backend,
                &mut history,
                &generation,
                &self.config.budget,
                self.metric.as_ref(),
                &self.config.retry,
                round,
                self.event_handler,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!("Round {round} failed terminally: {error}");
                    self.event_handler.on_event(&RunEvent::RunFailed {
                        round,
                        error: &error,
                    });
                    failure = Some(error);
                    break;
                }
            };

            let content = outcome.completion.content;
            let cost = outcome.completion.cost_consumed;
            history.push_assistant(&content);
            rounds_completed = round;
            total_cost += u64::from(cost);

            let exchange = Exchange {
                user_turn: Turn::user(&self.config.instruction),
                assistant_turn: Turn::assistant(&content),
                cost_consumed: cost,
            };
            self.event_handler.on_event(&RunEvent::RoundComplete {
                round,
                exchange: &exchange,
            });

            // Analysis is observation only; a failed analyzer never stops
            // the loop.
            if let Some(analyzer) = self.analyzer
                && let Some(previous) = previous_answer.as_deref()
            {
                match analyzer.analyze(previous, &exchange.assistant_turn.content) {
                    Ok(report) => {
                        self.event_handler.on_event(&RunEvent::Analysis {
                            round,
                            report: &report,
                        });
                    }
                    Err(e) => warn!("[round {round}] analyzer failed: {e}"),
                }
            }
        }

        let summary = RunSummary {
            rounds_completed,
            rounds_requested,
            total_cost,
            final_answer: history.last_assistant().map(String::from),
            failure,
        };
        info!(
            "Refinement run finished: {}/{} rounds, {} total tokens",
            summary.rounds_completed, summary.rounds_requested, summary.total_cost
        );
        self.event_handler
            .on_event(&RunEvent::Finished { summary: &summary });
        summary
    }
}

// ── Tests ──────────────────────────────────────────────────────────
