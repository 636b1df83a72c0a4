//! Scoring functions shared by the memory components.
//!
//! Three small algorithms live here:
//!
//! - **decision relevance** — a weighted substring match between a query and
//!   a stored decision, bounded to `[0, 1]`;
//! - **step similarity** — the fraction of positions whose `action` matches
//!   case-insensitively between two equal-length sequences (unequal lengths
//!   score 0; there is deliberately no partial alignment);
//! - **sequence signatures** — the `"a -> b -> c"` action join used for
//!   exact-match detection of recurring sequences.

use crate::config::RelevanceWeights;
use crate::memory::decision::Decision;
use crate::types::{RelevanceScore, StepLike};

/// Compute the relevance of `decision` to a query.
///
/// `query_lower` must already be lower-cased; every field is lower-cased
/// before the substring test. Contributions are additive and capped at 1.0.
#[must_use]
pub fn decision_relevance(
    query_lower: &str,
    decision: &Decision,
    weights: &RelevanceWeights,
) -> RelevanceScore {
    let mut score = 0.0_f32;

    if decision.decision.to_lowercase().contains(query_lower) {
        score += weights.decision;
    }
    if decision.rationale.to_lowercase().contains(query_lower) {
        score += weights.rationale;
    }
    if decision
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(query_lower))
    {
        score += weights.tag;
    }
    if decision
        .regulation
        .as_deref()
        .is_some_and(|r| r.to_lowercase().contains(query_lower))
    {
        score += weights.regulation;
    }
    if decision
        .article
        .as_deref()
        .is_some_and(|a| a.to_lowercase().contains(query_lower))
    {
        score += weights.article;
    }

    RelevanceScore::new(score)
}

/// Positional step similarity between two sequences, in `[0, 1]`.
///
/// Sequences of unequal length are similarity 0 — a sequence differing by a
/// single inserted or removed step does not match at all.
#[must_use]
pub fn step_similarity<A: StepLike, B: StepLike>(first: &[A], second: &[B]) -> f32 {
    if first.is_empty() || first.len() != second.len() {
        return 0.0;
    }

    let matches = first
        .iter()
        .zip(second.iter())
        .filter(|(a, b)| a.action().eq_ignore_ascii_case(b.action()))
        .count();

    matches as f32 / first.len() as f32
}

/// Signature of a step sequence: the actions joined with `" -> "`.
///
/// Two sequences with equal signatures are an exact action-level match.
#[must_use]
pub fn sequence_signature<S: StepLike>(steps: &[S]) -> String {
    steps
        .iter()
        .map(StepLike::action)
        .collect::<Vec<_>>()
        .join(" -> ")
}
