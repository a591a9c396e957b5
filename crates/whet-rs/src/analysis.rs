//! Answer analysis between consecutive rounds.
//!
//! After each completed round the refiner hands the previous and the
//! current assistant answer to an [`Analyzer`], if one is attached. The
//! loop treats the capability as opaque: it forwards the report to
//! observers and keeps nothing. A failing analyzer is reported through
//! `tracing` and never aborts the round.

/// Derives metrics from two consecutive assistant answers.
///
/// The report is a short human-readable string; what it measures is up to
/// the implementation (size deltas, readability scores, anything).
pub trait Analyzer: Send + Sync {
    fn analyze(&self, previous: &str, current: &str) -> Result<String, String>;
}

/// Reports how much each refinement grew or shrank the answer.
#[derive(Debug, Clone, Default)]
pub struct DeltaAnalyzer;

impl Analyzer for DeltaAnalyzer {
    fn analyze(&self, previous: &str, current: &str) -> Result<String, String> {
        let words = |s: &str| s.split_whitespace().count() as i64;
        let chars = |s: &str| s.chars().count() as i64;
        Ok(format!(
            "words {:+}, chars {:+}",
            words(current) - words(previous),
            chars(current) - chars(previous),
        ))
    }
}
