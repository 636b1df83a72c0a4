//! Error types for the Tacit core library.

use thiserror::Error;

/// Top-level error type for all memory operations.
///
/// Memory is advisory: callers are expected to treat every variant as a
/// recoverable failure value, never as a reason to abort the surrounding
/// session.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error (disk full, permissions, rename failure).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No profile exists for the given company.
    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    /// A preference conflict with the given ID was not found.
    #[error("Conflict not found: {conflict_id} (company: {company_id})")]
    ConflictNotFound {
        /// The company whose conflict log was searched.
        company_id: String,
        /// The missing conflict ID.
        conflict_id: String,
    },

    /// A pattern with the given ID was not found (or is retired).
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),

    /// The merge preconditions were not met.
    #[error("Cannot merge patterns: {reason}")]
    CannotMerge {
        /// Why the merge was rejected.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
