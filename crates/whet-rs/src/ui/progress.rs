//! Terminal progress bar for refinement runs.
//!
//! [`ProgressHandler`] renders one bar for the whole run: a tick per
//! completed round, a running token total in the message slot, and an
//! ETA computed from the pace so far. It is an ordinary
//! [`EventHandler`], so the binary registers it alongside logging and
//! transcript handlers and drops it to run quietly.

use crate::agent::events::{EventHandler, RunEvent};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg} (ETA: {eta})";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Event handler that drives a terminal progress bar.
pub struct ProgressHandler {
    bar: ProgressBar,
    tokens_used: AtomicU64,
}

impl ProgressHandler {
    /// Create a bar sized for `rounds` rounds.
    pub fn new(rounds: u32) -> Self {
        let bar = ProgressBar::new(u64::from(rounds));
        bar.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .expect("Invalid progress bar template")
                .progress_chars(PROGRESS_CHARS),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            tokens_used: AtomicU64::new(0),
        }
    }

    /// Create a handler with hidden output (for testing).
    pub fn hidden(rounds: u32) -> Self {
        let handler = Self::new(rounds);
        handler.bar.set_draw_target(ProgressDrawTarget::hidden());
        handler
    }
}

impl EventHandler for ProgressHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RoundComplete { exchange, .. } => {
                let cost = u64::from(exchange.cost_consumed);
                let total = self.tokens_used.fetch_add(cost, Ordering::SeqCst) + cost;
                self.bar.set_message(format!("{total} tokens"));
                self.bar.inc(1);
            }
            RunEvent::Finished { summary } => {
                if summary.failure.is_none() {
                    self.bar
                        .finish_with_message(format!("done, {} tokens", summary.total_cost));
                } else {
                    self.bar.abandon_with_message(format!(
                        "stopped after {} of {} rounds",
                        summary.rounds_completed, summary.rounds_requested
                    ));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::{Exchange, RunSummary};
    use crate::agent::execution::RequestError;
    use crate::{CompletionError, Turn};

    fn exchange(cost: u32) -> Exchange {
        Exchange {
            user_turn: Turn::user("improve"),
            assistant_turn: Turn::assistant("better"),
            cost_consumed: cost,
        }
    }

    #[test]
    fn bar_advances_one_tick_per_completed_round() {
        let handler = ProgressHandler::hidden(5);
        let ex = exchange(10);

        handler.on_event(&RunEvent::RoundComplete {
            round: 1,
            exchange: &ex,
        });
        handler.on_event(&RunEvent::RoundComplete {
            round: 2,
            exchange: &ex,
        });

        assert_eq!(handler.bar.position(), 2);
        assert_eq!(handler.bar.length(), Some(5));
    }

    #[test]
    fn message_tracks_cumulative_tokens() {
        let handler = ProgressHandler::hidden(3);

        handler.on_event(&RunEvent::RoundComplete {
            round: 1,
            exchange: &exchange(10),
        });
        handler.on_event(&RunEvent::RoundComplete {
            round: 2,
            exchange: &exchange(32),
        });

        assert_eq!(handler.bar.message(), "42 tokens");
    }

    #[test]
    fn completed_run_finishes_the_bar() {
        let handler = ProgressHandler::hidden(1);
        let summary = RunSummary {
            rounds_completed: 1,
            rounds_requested: 1,
            total_cost: 10,
            final_answer: Some("better".into()),
            failure: None,
        };

        handler.on_event(&RunEvent::Finished { summary: &summary });

        assert!(handler.bar.is_finished());
        assert_eq!(handler.bar.message(), "done, 10 tokens");
    }

    #[test]
    fn failed_run_abandons_the_bar() {
        let handler = ProgressHandler::hidden(5);
        let summary = RunSummary {
            rounds_completed: 2,
            rounds_requested: 5,
            total_cost: 20,
            final_answer: Some("better".into()),
            failure: Some(RequestError::Fatal(CompletionError::Fatal {
                status: Some(401),
                message: "invalid api key".into(),
            })),
        };

        handler.on_event(&RunEvent::Finished { summary: &summary });

        assert!(handler.bar.is_finished());
        assert_eq!(handler.bar.message(), "stopped after 2 of 5 rounds");
    }

    #[test]
    fn other_events_leave_the_bar_alone() {
        let handler = ProgressHandler::hidden(3);
        let error = CompletionError::Transient {
            status: Some(503),
            message: "unavailable".into(),
        };

        handler.on_event(&RunEvent::AttemptFailed {
            round: 1,
            attempt: 1,
            max_attempts: 3,
            error: &error,
        });

        assert_eq!(handler.bar.position(), 0);
    }
}
