//! Dialogue state and context-window management.
//!
//! The context window is the scarcest resource in a refinement loop: every
//! round appends two turns, and the model's limit never moves. This module
//! holds the pieces that keep the dialogue inside it:
//!
//! 1. **[`history`]** — [`DialogueHistory`], the ordered turn container.
//!    The system prompt and the original task form a protected prefix that
//!    anchors every round; everything after it is (user, assistant) pairs,
//!    removable oldest-first.
//!
//! 2. **[`budget`]** — [`SizeMetric`] implementations (word count, token
//!    heuristic) and [`BudgetPolicy`], the externally supplied limits with
//!    the pre-send safety margin.
//!
//! 3. **[`eviction`]** — [`enforce`], the oldest-pair eviction loop that
//!    shrinks the dialogue to fit an allowance or reports it
//!    [`BudgetUnshrinkable`].
//!
//! All three are driven automatically by the
//! [`Refiner`](crate::agent::harness::Refiner) loop.

pub mod budget;
pub mod eviction;
pub mod history;

// Re-export commonly used items at the module level.
pub use budget::{
    BudgetPolicy, BudgetUsage, DEFAULT_CHARS_PER_TOKEN, HeuristicTokens, SizeMetric, WordCount,
};
pub use eviction::{BudgetUnshrinkable, EvictionReport, enforce};
pub use history::{DialogueHistory, PROTECTED_PREFIX_LEN};
