//! Single-request execution: budget enforcement, retries, and size
//! recovery.
//!
//! [`request`] drives one completion call end to end:
//!
//! 1. **Estimate.** Enforce the input budget against the estimation
//!    allowance (the input allowance minus the safety margin), evicting
//!    oldest pairs until the dialogue fits.
//! 2. **Send.** Issue the completion call.
//! 3. **Recover.** On [`SizeExceeded`](CompletionError::SizeExceeded),
//!    evict exactly one pair and resend. On
//!    [`Transient`](CompletionError::Transient), wait the fixed backoff
//!    and resend. On [`Fatal`](CompletionError::Fatal), give up at once.
//!
//! Every send consumes one attempt from a single shared counter, whatever
//! the failure kind. When the counter runs out the call fails with
//! [`RequestError::RetriesExhausted`] carrying the last failure seen.

use super::events::{EventHandler, RunEvent};
use crate::api::retry::RetryConfig;
use crate::context::budget::{BudgetPolicy, SizeMetric};
use crate::context::eviction::{self, BudgetUnshrinkable};
use crate::context::history::DialogueHistory;
use crate::{Completion, CompletionBackend, CompletionError, GenerationPolicy};
use tracing::{debug, warn};

/// Terminal failure of a request, after all recovery was exhausted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// The dialogue cannot be made to fit the input budget: only the
    /// protected prefix (and possibly a trailing unpaired turn) remains,
    /// and it alone exceeds the allowance.
    #[error(transparent)]
    Unshrinkable(#[from] BudgetUnshrinkable),
    /// The attempt counter ran out before any attempt succeeded.
    #[error("{attempts} attempt(s) exhausted; last failure: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: CompletionError,
    },
    /// The provider reported a failure no amount of retrying can fix.
    #[error(transparent)]
    Fatal(CompletionError),
}

/// Successful outcome of [`request`], with recovery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub completion: Completion,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    /// Pairs evicted across estimation and size recovery.
    pub pairs_evicted: usize,
}

/// Executes one completion request against `history`, evicting and
/// retrying as needed.
///
/// `history` is mutated in place: pairs evicted here stay evicted, so a
/// later request does not re-shrink what this one already trimmed. The
/// trailing instruction turn for the in-flight request is never evicted.
#[allow(clippy::too_many_arguments)]
pub async fn request(
    backend: &dyn CompletionBackend,
    history: &mut DialogueHistory,
    generation: &GenerationPolicy,
    budget: &BudgetPolicy,
    metric: &dyn SizeMetric,
    retry: &RetryConfig,
    round: u32,
    handler: &dyn EventHandler,
) -> Result<RequestOutcome, RequestError> {
    let report = eviction::enforce(history, budget.estimation_allowance(), metric)?;
    let mut pairs_evicted = report.pairs_evicted;
    if report.evicted_any() {
        handler.on_event(&RunEvent::Eviction {
            round,
            pairs_evicted: report.pairs_evicted,
        });
    }

    let mut last_error: Option<CompletionError> = None;
    for attempt in 1..=retry.max_attempts {
        match backend.complete(history.turns(), generation).await {
            Ok(completion) => {
                debug!(
                    "Request succeeded on attempt {}/{} ({} pairs evicted)",
                    attempt, retry.max_attempts, pairs_evicted,
                );
                return Ok(RequestOutcome {
                    completion,
                    attempts: attempt,
                    pairs_evicted,
                });
            }
            Err(error) => {
                handler.on_event(&RunEvent::AttemptFailed {
                    round,
                    attempt,
                    max_attempts: retry.max_attempts,
                    error: &error,
                });
                match error {
                    CompletionError::SizeExceeded { .. } => {
                        if history.evict_oldest_pair().is_none() {
                            return Err(RequestError::Unshrinkable(BudgetUnshrinkable {
                                measured: metric.measure(history),
                                allowed: budget.allowed_input(),
                            }));
                        }
                        pairs_evicted += 1;
                        handler.on_event(&RunEvent::Eviction {
                            round,
                            pairs_evicted: 1,
                        });
                        warn!(
                            "Provider rejected request as too large (attempt {}/{}); \
                             evicted the oldest pair and resending",
                            attempt, retry.max_attempts,
                        );
                        last_error = Some(error);
                    }
                    CompletionError::Transient { .. } => {
                        warn!(
                            "Transient completion failure (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt, retry.max_attempts, error, retry.backoff,
                        );
                        tokio::time::sleep(retry.backoff).await;
                        last_error = Some(error);
                    }
                    CompletionError::Fatal { .. } => {
                        return Err(RequestError::Fatal(error));
                    }
                }
            }
        }
    }

    Err(RequestError::RetriesExhausted {
        attempts: retry.max_attempts,
        last_error: last_error.unwrap_or_else(|| CompletionError::Transient {
            status: None,
            message: "no attempts permitted".to_string(),
        }),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        Completion, CompletionBackend, CompletionError, CompletionFuture, GenerationPolicy, Turn,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that replays a fixed script of outcomes, one per call.
    pub(crate) struct FakeBackend {
        script: Mutex<VecDeque<Result<Completion, CompletionError>>>,
        calls: AtomicU32,
    }

    impl FakeBackend {
        pub(crate) fn new(script: Vec<Result<Completion, CompletionError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn ok(content: &str, cost: u32) -> Result<Completion, CompletionError> {
            Ok(Completion {
                content: content.to_string(),
                cost_consumed: cost,
            })
        }

        pub(crate) fn size_exceeded() -> Result<Completion, CompletionError> {
            Err(CompletionError::SizeExceeded {
                status: 413,
                message: "maximum context length exceeded".to_string(),
            })
        }

        pub(crate) fn transient() -> Result<Completion, CompletionError> {
            Err(CompletionError::Transient {
                status: Some(503),
                message: "upstream unavailable".to_string(),
            })
        }

        pub(crate) fn fatal() -> Result<Completion, CompletionError> {
            Err(CompletionError::Fatal {
                status: Some(401),
                message: "invalid api key".to_string(),
            })
        }
    }

    impl CompletionBackend for FakeBackend {
        fn complete<'a>(
            &'a self,
            _turns: &'a [Turn],
            _policy: &'a GenerationPolicy,
        ) -> CompletionFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            Box::pin(async move {
                next.unwrap_or_else(|| {
                    Err(CompletionError::Fatal {
                        status: None,
                        message: "script exhausted".to_string(),
                    })
                })
            })
        }
    }
}
