//! Shared value types for the Tacit memory system.
//!
//! Persisted timestamps are second-precision ISO-8601 strings with a trailing
//! `Z` (the documents are VCS-friendly JSON, hand-inspectable and diffable),
//! so the helpers here produce and parse that format rather than exposing
//! `chrono` types in the record structs.

use chrono::{NaiveDateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel expiry for decisions without a real validity window.
pub const FAR_FUTURE: &str = "9999-12-31T23:59:59Z";

/// Current wall-clock time as an ISO-8601 UTC string (`2025-03-01T09:30:00Z`).
#[must_use]
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Current wall-clock time in the compact form used inside record IDs
/// (`20250301093000`).
#[must_use]
pub fn now_compact() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Parse a stored timestamp, tolerating a trailing UTC `Z` marker and
/// optional fractional seconds. Returns `None` for malformed input —
/// callers skip such records rather than failing the whole operation.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Bounded `[0, 1]` score used to rank search results and suggestions.
///
/// Wraps [`OrderedFloat`] so ranked lists sort with a total order and ties
/// keep their original insertion order under a stable sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelevanceScore(pub OrderedFloat<f32>);

impl RelevanceScore {
    /// Create a relevance score from a raw f32, clamped to `[0, 1]`.
    #[must_use]
    pub fn new(score: f32) -> Self {
        Self(OrderedFloat(score.clamp(0.0, 1.0)))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f32 {
        self.0.into_inner()
    }
}

impl fmt::Display for RelevanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Task steps
// ---------------------------------------------------------------------------

/// Anything with a comparable `action` field.
///
/// Step similarity and signatures only look at actions, so observed steps and
/// stored pattern steps score against each other through this trait.
pub trait StepLike {
    /// The action identifier for this step (e.g. `"classify-device"`).
    fn action(&self) -> &str;
}

/// A single observed step in a task sequence, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepObservation {
    /// Action identifier.
    pub action: String,
    /// Human-readable description of what the step did.
    #[serde(default)]
    pub description: String,
    /// Agent that performed the step.
    #[serde(default)]
    pub agent: String,
}

impl StepObservation {
    /// Convenience constructor for tests and callers.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        description: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            agent: agent.into(),
        }
    }
}

impl StepLike for StepObservation {
    fn action(&self) -> &str {
        &self.action
    }
}

/// A step inside a persisted [`TaskPattern`](crate::memory::TaskPattern),
/// with its 1-based position fixed at pattern creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    /// 1-based position within the pattern.
    pub order: u32,
    /// Action identifier.
    pub action: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Agent that performs this step.
    #[serde(default)]
    pub agent: String,
}

impl StepLike for TaskStep {
    fn action(&self) -> &str {
        &self.action
    }
}
