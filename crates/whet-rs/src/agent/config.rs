//! Configuration types for the [`Refiner`](super::harness::Refiner).
//!
//! Everything a run needs travels in one explicitly constructed
//! [`RefinerConfig`]: no environment lookups, no process-wide state.
//! Builder methods cover the settings callers routinely customise; the
//! budget and retry structs are public fields for direct control.
//!
//! # Examples
//!
//! Minimal configuration:
//!
//! ```ignore
//! let config = RefinerConfig::new("openai/gpt-4o-mini", "Make it better.")
//!     .with_rounds(10)
//!     .with_temperature(0.3);
//! ```
//!
//! Struct update syntax for the budget and retry knobs:
//!
//! ```ignore
//! let config = RefinerConfig {
//!     budget: BudgetPolicy::new(64_000, 8_000).with_safety_margin(500),
//!     retry: RetryConfig::with_attempts(5),
//!     ..RefinerConfig::new("openai/gpt-4o-mini", "Make it better.")
//! };
//! ```

use crate::api::retry::RetryConfig;
use crate::context::budget::BudgetPolicy;
use crate::{DEFAULT_MODEL, GenerationPolicy};

/// Default system prompt seeding the protected prefix.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant and an expert AI \
     programming assistant with extensive knowledge in various programming languages, software \
     development best practices, and modern coding patterns. You provide accurate and detailed \
     code snippets, explanations, and debugging advice. Offer iterative improvements and explain \
     the changes made. When providing responses, please ensure they are ethical, unbiased, and \
     factually accurate. Use a clear and concise tone suitable for professional software \
     development contexts. Generate outputs in a structured format";

/// Default initial task for the first user turn.
pub const DEFAULT_TASK: &str = "Write Hello World in Python.";

/// Default refinement instruction appended every round.
pub const DEFAULT_INSTRUCTION: &str = "Thank you, but make it better. Your intended audience \
     consists of beginner programmers.";

/// Configuration for a [`Refiner`](super::harness::Refiner) run.
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// Model identifier (e.g. `"openai/gpt-4o-mini"`).
    pub model: String,
    /// Number of refinement rounds to drive.
    pub rounds: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Refinement instruction appended as the user turn of every round.
    pub instruction: String,
    /// Dialogue size limits and the pre-send safety margin.
    pub budget: BudgetPolicy,
    /// Attempt cap and backoff for each round's request.
    pub retry: RetryConfig,
}

impl RefinerConfig {
    /// Create a config with a model and a per-round instruction.
    ///
    /// Everything else starts at the defaults; chain builder methods or
    /// use struct update syntax for further customization.
    pub fn new(model: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    // ── Builder methods ───────────────────────────────────────────
    //
    // Only the settings that callers routinely customise get builder
    // methods. The budget and retry structs are public fields; set them
    // directly for full control.

    /// Set the number of refinement rounds.
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the attempt cap for each round's request.
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Generation parameters derived from this config.
    ///
    /// The budget's output reservation doubles as the reply's
    /// `max_tokens`: one number, two enforcement points.
    pub fn generation_policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            model: self.model.clone(),
            max_output: self.budget.reserved_for_output as u32,
            temperature: self.temperature,
        }
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            rounds: 100,
            temperature: 0.7,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            budget: BudgetPolicy::default(),
            retry: RetryConfig::default(),
        }
    }
}
