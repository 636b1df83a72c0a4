//! The three memory components and their persisted document shapes.
//!
//! Every document shares the same envelope: `{version, last_updated,
//! metadata, <collection>}`. The `metadata` block is a derived summary,
//! recomputed after every mutation — it is never hand-edited and each
//! component's tests verify the derivation. Components exclusively own their
//! backing file and never call each other; cross-component correlation
//! happens through the [`MetricsTracker`](crate::metrics::MetricsTracker),
//! invoked by the caller.

pub mod decision;
pub mod pattern;
pub mod preference;

pub use decision::{Decision, DecisionMemory, NewDecision, ScoredDecision};
pub use pattern::{
    PatternMemory, PatternStatistics, PatternSuggestion, TaskPattern, TaskSession,
    WorkflowTemplate,
};
pub use preference::{
    CompanyProfile, ConflictResolution, PreferenceConflict, PreferenceMemory, Preferences,
};

/// Schema version written into freshly created documents.
pub const DOCUMENT_VERSION: &str = "1.0.0";
