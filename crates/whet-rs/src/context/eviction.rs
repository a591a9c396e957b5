//! Budget enforcement: evict oldest dialogue pairs until the history fits.
//!
//! [`enforce`] is the single entry point. It measures the dialogue under
//! the caller's metric and removes the oldest (user, assistant) pair,
//! re-measuring after each removal, until the dialogue fits the allowance.
//! Eviction order is strictly FIFO: pair cost plays no role in which pair
//! goes first.
//!
//! The protected prefix is outside its reach by construction: eviction
//! goes through [`DialogueHistory::evict_oldest_pair`], which refuses to
//! touch the first two turns or a trailing unpaired turn. When everything
//! removable is gone and the dialogue still exceeds the allowance, the
//! pass stops with [`BudgetUnshrinkable`].

use crate::context::budget::SizeMetric;
use crate::context::history::DialogueHistory;
use thiserror::Error;
use tracing::debug;

/// The dialogue cannot shrink below the allowance: everything removable
/// is gone and what remains still measures over budget. Recovery requires
/// a smaller initial prompt or a larger budget, not more eviction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dialogue cannot fit the input budget: {measured} units remain against an allowance of {allowed}")]
pub struct BudgetUnshrinkable {
    /// Measured size of what could not be evicted.
    pub measured: usize,
    /// The allowance that could not be met.
    pub allowed: usize,
}

/// Outcome of a successful enforcement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    /// Number of (user, assistant) pairs evicted.
    pub pairs_evicted: usize,
    /// Measured size after enforcement.
    pub final_cost: usize,
}

impl EvictionReport {
    /// Whether the pass removed anything.
    pub fn evicted_any(&self) -> bool {
        self.pairs_evicted > 0
    }
}

/// Evict oldest (user, assistant) pairs until `history` measures at or
/// under `allowance`.
///
/// Idempotent: a dialogue already within the allowance is returned
/// untouched with a zero-eviction report. On [`BudgetUnshrinkable`] the
/// evictions already performed are kept; the caller observes a dialogue
/// reduced to its unremovable turns.
pub fn enforce(
    history: &mut DialogueHistory,
    allowance: usize,
    metric: &dyn SizeMetric,
) -> Result<EvictionReport, BudgetUnshrinkable> {
    let mut cost = metric.measure(history);
    let mut pairs_evicted = 0;

    while cost > allowance {
        if history.evict_oldest_pair().is_none() {
            return Err(BudgetUnshrinkable {
                measured: cost,
                allowed: allowance,
            });
        }
        pairs_evicted += 1;
        cost = metric.measure(history);
    }

    if pairs_evicted > 0 {
        debug!(
            "Evicted {} dialogue pair(s); {} units remain against allowance {}",
            pairs_evicted, cost, allowance
        );
    }

    Ok(EvictionReport {
        pairs_evicted,
        final_cost: cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TurnRole;
    use crate::context::budget::WordCount;

    /// Protected prefix of one word each, plus `n` pairs of one word per
    /// turn: every pair costs exactly 2 words.
    fn history_with_pairs(n: usize) -> DialogueHistory {
        let mut h = DialogueHistory::new("system", "task");
        for i in 0..n {
            h.push_user(format!("improve{i}"));
            h.push_assistant(format!("answer{i}"));
        }
        h
    }

    #[test]
    fn evicts_oldest_pairs_until_budget_fits() {
        // Prefix (2 words) + 5 pairs (2 words each) = 12; allowance fits
        // the prefix plus exactly one pair.
        let mut h = history_with_pairs(5);
        let report = enforce(&mut h, 4, &WordCount).unwrap();

        assert_eq!(report.pairs_evicted, 4);
        assert_eq!(report.final_cost, 4);
        assert_eq!(h.removable_pairs(), 1);
        // The surviving pair is the newest one.
        assert_eq!(h.turns()[2].content, "improve4");
        assert_eq!(h.turns()[3].content, "answer4");
    }

    #[test]
    fn compliant_history_is_untouched() {
        let mut h = history_with_pairs(3);
        let before = h.clone();
        let report = enforce(&mut h, 100, &WordCount).unwrap();

        assert_eq!(report.pairs_evicted, 0);
        assert!(!report.evicted_any());
        assert_eq!(h, before);
    }

    #[test]
    fn enforce_is_idempotent() {
        let mut once = history_with_pairs(5);
        enforce(&mut once, 6, &WordCount).unwrap();

        let mut twice = once.clone();
        let report = enforce(&mut twice, 6, &WordCount).unwrap();

        assert_eq!(report.pairs_evicted, 0);
        assert_eq!(twice, once);
    }

    #[test]
    fn unshrinkable_when_prefix_alone_exceeds() {
        let mut h = DialogueHistory::new("one two three", "four five");
        let err = enforce(&mut h, 3, &WordCount).unwrap_err();

        assert_eq!(err.measured, 5);
        assert_eq!(err.allowed, 3);
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn unshrinkable_keeps_evictions_already_performed() {
        // Pairs fit nothing: every pair goes, then the prefix still
        // measures over the allowance.
        let mut h = history_with_pairs(3);
        let err = enforce(&mut h, 1, &WordCount).unwrap_err();

        assert_eq!(err.measured, 2);
        assert_eq!(h.len(), 2);
        assert_eq!(h.turns()[0].role, TurnRole::System);
        assert_eq!(h.turns()[1].role, TurnRole::User);
    }

    #[test]
    fn trailing_unpaired_turn_survives_enforcement() {
        let mut h = history_with_pairs(3);
        h.push_user("inflight");

        // Prefix (2) + instruction (1) + one pair (2) fit in 5.
        let report = enforce(&mut h, 5, &WordCount).unwrap();

        assert_eq!(report.pairs_evicted, 2);
        assert!(h.well_formed());
        assert_eq!(h.turns().last().unwrap().content, "inflight");
    }

    #[test]
    fn pairing_alternation_holds_after_every_pass() {
        for allowance in 0..14 {
            let mut h = history_with_pairs(5);
            let _ = enforce(&mut h, allowance, &WordCount);
            assert!(h.well_formed(), "alternation broken at allowance {allowance}");
        }
    }
}
