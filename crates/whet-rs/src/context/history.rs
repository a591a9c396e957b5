//! Ordered dialogue container with a protected prefix.
//!
//! [`DialogueHistory`] holds the turns sent to the model each round. The
//! first two turns (the system prompt and the original task) are the
//! **protected prefix**: they anchor the refinement loop semantically and
//! are never removed. Every later turn belongs to a removable
//! (user, assistant) pair, appended in strict alternation as rounds
//! complete. While a request is in flight the newest user turn sits
//! unpaired at the tail; it is not a removable pair and never an eviction
//! candidate.
//!
//! The only destructive operation is [`DialogueHistory::evict_oldest_pair`],
//! which removes the pair closest to the protected prefix as a unit. The
//! pairing rules are checked structurally (roles, not positions), so a
//! malformed suffix yields zero removable pairs instead of a bad eviction.

use crate::{Turn, TurnRole};

/// Number of leading turns never eligible for eviction: the system turn
/// and the first user turn.
pub const PROTECTED_PREFIX_LEN: usize = 2;

/// Append-only sequence of dialogue turns, except for oldest-pair eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueHistory {
    turns: Vec<Turn>,
}

impl DialogueHistory {
    /// Seed a new dialogue with its protected prefix: the system prompt
    /// and the initial user task.
    pub fn new(system_prompt: impl Into<String>, initial_task: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt), Turn::user(initial_task)],
        }
    }

    /// All turns in order, ready to send.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append the next user turn (a refinement instruction).
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    /// Append the assistant reply that completes the current pair.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    /// Content of the most recent assistant turn, if any reply has
    /// arrived yet.
    pub fn last_assistant(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
            .map(|t| t.content.as_str())
    }

    /// Number of complete (user, assistant) pairs eligible for eviction.
    ///
    /// Counted structurally from the roles: complete pairs after the
    /// protected prefix, stopping at the first chunk that is not a
    /// (user, assistant) pair. A trailing unpaired user turn is not
    /// counted.
    pub fn removable_pairs(&self) -> usize {
        let start = PROTECTED_PREFIX_LEN.min(self.turns.len());
        self.turns[start..]
            .chunks(2)
            .take_while(|chunk| {
                chunk.len() == 2
                    && chunk[0].role == TurnRole::User
                    && chunk[1].role == TurnRole::Assistant
            })
            .count()
    }

    /// Remove the oldest removable (user, assistant) pair as a unit and
    /// return it, or `None` when no complete pair exists.
    ///
    /// Never touches the protected prefix or a trailing unpaired turn.
    pub fn evict_oldest_pair(&mut self) -> Option<(Turn, Turn)> {
        if self.removable_pairs() == 0 {
            return None;
        }
        // The oldest pair sits immediately after the protected prefix.
        let assistant = self.turns.remove(PROTECTED_PREFIX_LEN + 1);
        let user = self.turns.remove(PROTECTED_PREFIX_LEN);
        Some((user, assistant))
    }

    /// Structural invariant check: the protected prefix is a system turn
    /// followed by a user turn, and the suffix strictly alternates
    /// user/assistant starting from a user turn (one trailing unpaired
    /// user turn allowed).
    pub fn well_formed(&self) -> bool {
        if self.turns.len() < PROTECTED_PREFIX_LEN
            || self.turns[0].role != TurnRole::System
            || self.turns[1].role != TurnRole::User
        {
            return false;
        }
        self.turns[PROTECTED_PREFIX_LEN..]
            .iter()
            .enumerate()
            .all(|(i, t)| {
                if i % 2 == 0 {
                    t.role == TurnRole::User
                } else {
                    t.role == TurnRole::Assistant
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> DialogueHistory {
        DialogueHistory::new("You are helpful.", "Write Hello World.")
    }

    fn with_pairs(n: usize) -> DialogueHistory {
        let mut h = seeded();
        for i in 0..n {
            h.push_user(format!("improve {i}"));
            h.push_assistant(format!("answer {i}"));
        }
        h
    }

    #[test]
    fn new_seeds_protected_prefix() {
        let h = seeded();
        assert_eq!(h.len(), 2);
        assert_eq!(h.turns()[0].role, TurnRole::System);
        assert_eq!(h.turns()[1].role, TurnRole::User);
        assert_eq!(h.removable_pairs(), 0);
        assert!(h.well_formed());
    }

    #[test]
    fn trailing_unpaired_user_turn_is_not_a_pair() {
        let mut h = with_pairs(1);
        assert_eq!(h.removable_pairs(), 1);
        h.push_user("improve again");
        assert_eq!(h.removable_pairs(), 1);
        assert!(h.well_formed());
        h.push_assistant("better answer");
        assert_eq!(h.removable_pairs(), 2);
    }

    #[test]
    fn evict_removes_oldest_pair_as_unit() {
        let mut h = with_pairs(3);
        let before = h.len();

        let (user, assistant) = h.evict_oldest_pair().unwrap();
        assert_eq!(user.content, "improve 0");
        assert_eq!(assistant.content, "answer 0");
        assert_eq!(h.len(), before - 2);
        assert!(h.well_formed());

        // The next-oldest pair moved into eviction position.
        let (user, _) = h.evict_oldest_pair().unwrap();
        assert_eq!(user.content, "improve 1");
    }

    #[test]
    fn evict_with_no_pairs_returns_none() {
        let mut h = seeded();
        assert!(h.evict_oldest_pair().is_none());
        assert_eq!(h.len(), 2);

        // A trailing unpaired user turn is not evictable either.
        h.push_user("improve");
        assert!(h.evict_oldest_pair().is_none());
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn protected_prefix_survives_total_eviction() {
        let mut h = with_pairs(4);
        while h.evict_oldest_pair().is_some() {}
        assert_eq!(h.len(), 2);
        assert_eq!(h.turns()[0].role, TurnRole::System);
        assert_eq!(h.turns()[0].content, "You are helpful.");
        assert_eq!(h.turns()[1].role, TurnRole::User);
        assert_eq!(h.turns()[1].content, "Write Hello World.");
    }

    #[test]
    fn alternation_preserved_across_evictions() {
        let mut h = with_pairs(3);
        h.push_user("in flight");

        h.evict_oldest_pair();
        h.evict_oldest_pair();

        assert!(h.well_formed());
        assert_eq!(h.removable_pairs(), 1);
        let last = h.turns().last().unwrap();
        assert_eq!(last.role, TurnRole::User);
        assert_eq!(last.content, "in flight");
    }

    #[test]
    fn last_assistant_tracks_latest_reply() {
        let mut h = seeded();
        assert!(h.last_assistant().is_none());

        h.push_user("improve 0");
        h.push_assistant("answer 0");
        assert_eq!(h.last_assistant(), Some("answer 0"));

        h.push_user("improve 1");
        // Still the previous reply while the request is in flight.
        assert_eq!(h.last_assistant(), Some("answer 0"));
        h.push_assistant("answer 1");
        assert_eq!(h.last_assistant(), Some("answer 1"));
    }
}
