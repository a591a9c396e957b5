//! Size metrics and the dialogue budget policy.
//!
//! The refinement loop never sees raw token counts from a tokenizer; it
//! measures the dialogue through a [`SizeMetric`] and compares the result
//! against a [`BudgetPolicy`]. Two metrics ship with the crate: whitespace
//! [`WordCount`] and the [`HeuristicTokens`] characters-per-token
//! estimate. Anything implementing the trait plugs in the same way.

use crate::Turn;
use crate::context::history::DialogueHistory;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; 3.5 splits the difference.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

// ── Metrics ────────────────────────────────────────────────────────

/// A pure size function over dialogue turns.
///
/// Implementations must be deterministic for the same content; the budget
/// enforcer re-measures after every eviction and relies on the result
/// shrinking as turns are removed.
pub trait SizeMetric: Send + Sync {
    /// Size of one turn's content under this metric.
    fn size_of(&self, turn: &Turn) -> usize;

    /// Total size of a dialogue under this metric.
    fn measure(&self, history: &DialogueHistory) -> usize {
        history.turns().iter().map(|t| self.size_of(t)).sum()
    }
}

/// Whitespace-separated word count.
#[derive(Debug, Clone, Default)]
pub struct WordCount;

impl SizeMetric for WordCount {
    fn size_of(&self, turn: &Turn) -> usize {
        turn.content.split_whitespace().count()
    }
}

/// Token estimate from a characters-per-token ratio.
#[derive(Debug, Clone)]
pub struct HeuristicTokens {
    chars_per_token: f64,
}

impl HeuristicTokens {
    pub fn new() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Use a calibrated chars-per-token ratio instead of the default.
    pub fn with_ratio(chars_per_token: f64) -> Self {
        Self { chars_per_token }
    }
}

impl Default for HeuristicTokens {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeMetric for HeuristicTokens {
    fn size_of(&self, turn: &Turn) -> usize {
        (turn.content.len() as f64 / self.chars_per_token) as usize
    }
}

// ── Budget policy ──────────────────────────────────────────────────

/// Size limits for the dialogue sent to the model, in metric units.
///
/// The input budget available to dialogue turns is `max_total` minus
/// `reserved_for_output`. Before each send, enforcement additionally
/// subtracts `safety_margin` from that allowance, so a request that
/// measures slightly under the limit on our side is not rejected for
/// provider-side overhead the metric cannot see.
///
/// # Example
///
/// ```ignore
/// let policy = BudgetPolicy::new(128_000, 16_000).with_safety_margin(1_000);
///
/// let usage = policy.usage(&history, &HeuristicTokens::new());
/// println!("{}", usage.to_log_string());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetPolicy {
    /// Hard context limit of the model.
    pub max_total: usize,
    /// Units reserved for the generated reply.
    pub reserved_for_output: usize,
    /// Extra units assumed consumed by provider-side overhead during
    /// pre-send estimation.
    pub safety_margin: usize,
}

impl BudgetPolicy {
    pub fn new(max_total: usize, reserved_for_output: usize) -> Self {
        Self {
            max_total,
            reserved_for_output,
            ..Default::default()
        }
    }

    /// Override the estimation safety margin.
    pub fn with_safety_margin(mut self, margin: usize) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Budget available to dialogue input: `max_total` minus the output
    /// reservation.
    pub fn allowed_input(&self) -> usize {
        self.max_total.saturating_sub(self.reserved_for_output)
    }

    /// Stricter allowance applied before sending: [`allowed_input()`]
    /// minus the safety margin.
    ///
    /// [`allowed_input()`]: Self::allowed_input
    pub fn estimation_allowance(&self) -> usize {
        self.allowed_input().saturating_sub(self.safety_margin)
    }

    /// Snapshot how much of the input budget a dialogue consumes.
    pub fn usage(&self, history: &DialogueHistory, metric: &dyn SizeMetric) -> BudgetUsage {
        let measured = metric.measure(history);
        let allowed = self.allowed_input();
        let usage_pct = if allowed > 0 {
            measured as f64 / allowed as f64
        } else {
            1.0
        };
        BudgetUsage {
            measured,
            allowed,
            usage_pct,
        }
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            max_total: 128_000,
            reserved_for_output: 16_000,
            safety_margin: 1_000,
        }
    }
}

/// Snapshot of dialogue size against the input budget.
#[derive(Debug, Clone)]
pub struct BudgetUsage {
    /// Measured size of the dialogue.
    pub measured: usize,
    /// Allowed input budget.
    pub allowed: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl BudgetUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "dialogue: ~{} units ({:.0}% of {})",
            self.measured,
            self.usage_pct * 100.0,
            self.allowed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_splits_on_whitespace() {
        let turn = Turn::user("hello  world\nand\tmore");
        assert_eq!(WordCount.size_of(&turn), 4);
        assert_eq!(WordCount.size_of(&Turn::user("")), 0);
    }

    #[test]
    fn heuristic_tokens_uses_ratio() {
        let turn = Turn::user("a".repeat(35));
        assert_eq!(HeuristicTokens::new().size_of(&turn), 10);
        assert_eq!(HeuristicTokens::with_ratio(7.0).size_of(&turn), 5);
    }

    #[test]
    fn measure_sums_all_turns() {
        let mut h = DialogueHistory::new("one two", "three");
        h.push_user("four five");
        h.push_assistant("six");
        assert_eq!(WordCount.measure(&h), 6);
    }

    #[test]
    fn allowed_input_subtracts_output_reserve() {
        let policy = BudgetPolicy::new(128_000, 16_000);
        assert_eq!(policy.allowed_input(), 112_000);
    }

    #[test]
    fn estimation_allowance_subtracts_margin() {
        let policy = BudgetPolicy::new(128_000, 16_000).with_safety_margin(1_000);
        assert_eq!(policy.estimation_allowance(), 111_000);
    }

    #[test]
    fn allowances_saturate_at_zero() {
        let policy = BudgetPolicy::new(1_000, 2_000).with_safety_margin(500);
        assert_eq!(policy.allowed_input(), 0);
        assert_eq!(policy.estimation_allowance(), 0);
    }

    #[test]
    fn default_policy_matches_documented_limits() {
        let policy = BudgetPolicy::default();
        assert_eq!(policy.max_total, 128_000);
        assert_eq!(policy.reserved_for_output, 16_000);
        assert_eq!(policy.safety_margin, 1_000);
    }

    #[test]
    fn usage_reflects_measured_fraction() {
        let mut h = DialogueHistory::new("a b", "c d");
        h.push_user("e f");
        h.push_assistant("g h");

        let policy = BudgetPolicy::new(20, 4);
        let usage = policy.usage(&h, &WordCount);
        assert_eq!(usage.measured, 8);
        assert_eq!(usage.allowed, 16);
        assert!((usage.usage_pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn usage_log_string_format() {
        let h = DialogueHistory::new("system prompt", "task");
        let policy = BudgetPolicy::default();
        let log = policy.usage(&h, &HeuristicTokens::new()).to_log_string();
        assert!(log.contains("dialogue:"));
        assert!(log.contains("units"));
    }
}
