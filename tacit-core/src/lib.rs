//! # Tacit Core Library
//!
//! Per-project persistent memory for regulatory-affairs agent sessions.
//!
//! Agents forget everything between sessions; Tacit gives a project three
//! durable memory components plus a metrics tracker, all backed by plain
//! JSON documents under the project's memory directory:
//!
//! - **Decision Memory** — regulatory decisions with rationale, searchable
//!   by weighted relevance ([`DecisionMemory`])
//! - **Preference Memory** — per-company terminology and formatting
//!   profiles with a conflict audit trail ([`PreferenceMemory`])
//! - **Task Pattern Memory** — recurring step sequences promoted into
//!   reusable patterns and workflow templates ([`PatternMemory`])
//! - **Metrics Tracker** — adoption, effectiveness, learning, and quality
//!   counters ([`MetricsTracker`])
//!
//! ## Persistence Contract
//!
//! Every component exclusively owns one JSON file and writes it atomically
//! (temp file + rename), so a crash mid-save leaves the previous state
//! intact. A missing or corrupt file means starting fresh, never failing:
//! memory is advisory and must not take the surrounding session down with
//! it. Mutations are serialized per store within the process; concurrent
//! processes sharing one memory directory are not coordinated.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod persistence;
pub mod scoring;
pub mod types;

pub use config::MemoryConfig;
pub use error::{MemoryError, Result};
pub use memory::{
    Decision, DecisionMemory, NewDecision, PatternMemory, PreferenceMemory, ScoredDecision,
    TaskPattern, TaskSession,
};
pub use metrics::MetricsTracker;
pub use types::{RelevanceScore, StepObservation, TaskStep};
