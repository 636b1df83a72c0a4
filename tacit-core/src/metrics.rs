//! Learning metrics — counters correlating memory activity across components.
//!
//! The tracker owns its own document and is invoked by the caller alongside
//! the memory components; components never report into it themselves. All
//! counters are monotonic except `memory_integrity`, which decays on failed
//! schema validations.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::DOCUMENT_VERSION;
use crate::persistence::DocumentStore;
use crate::types::{now_iso, parse_timestamp};

/// File name for the metrics document, by convention.
pub const METRICS_FILE: &str = "learning-metrics.json";

const INTEGRITY_PENALTY: f32 = 5.0;
const DEFAULT_RETENTION_DAYS: u32 = 365;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Access and contribution counters for one memory feature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Read operations.
    #[serde(default)]
    pub access_count: u64,
    /// Write operations.
    #[serde(default)]
    pub contribution_count: u64,
    /// Timestamp of the most recent access.
    #[serde(default)]
    pub last_accessed: Option<String>,
}

/// Suggestion counters for the pattern feature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionCounter {
    /// Suggestions shown to the user.
    #[serde(default)]
    pub suggestions_shown: u64,
    /// Suggestions the user accepted.
    #[serde(default)]
    pub suggestions_accepted: u64,
    /// Timestamp of the most recent suggestion.
    #[serde(default)]
    pub last_suggested: Option<String>,
}

/// Per-feature usage block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureUsage {
    /// Decision Memory usage.
    #[serde(default)]
    pub regulatory_decisions: UsageCounter,
    /// Preference Memory usage.
    #[serde(default)]
    pub company_preferences: UsageCounter,
    /// Pattern Memory suggestion activity.
    #[serde(default)]
    pub task_patterns: SuggestionCounter,
}

/// Adoption counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdoptionMetrics {
    /// Every tracked operation.
    #[serde(default)]
    pub total_interactions: u64,
    /// Sessions started.
    #[serde(default)]
    pub unique_sessions: u64,
    /// Per-feature breakdown.
    #[serde(default)]
    pub feature_usage: FeatureUsage,
}

/// Outcome counts for pattern suggestions that received feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternAccuracy {
    /// The suggested pattern matched what the user did.
    #[serde(default)]
    pub correct: u64,
    /// The suggestion was wrong.
    #[serde(default)]
    pub incorrect: u64,
    /// The suggestion was dismissed without feedback.
    #[serde(default)]
    pub ignored: u64,
}

/// Outcome counts for decision retrievals that received feedback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionRelevanceCounts {
    /// The retrieved decision helped.
    #[serde(default)]
    pub relevant: u64,
    /// It did not.
    #[serde(default)]
    pub not_relevant: u64,
    /// No clear signal.
    #[serde(default)]
    pub neutral: u64,
}

/// Outcome counts for preference applications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceApplicationCounts {
    /// Preferences applied and kept.
    #[serde(default)]
    pub applied: u64,
    /// Applications the user overrode.
    #[serde(default)]
    pub overridden: u64,
    /// Conflicts surfaced during application.
    #[serde(default)]
    pub conflicts: u64,
}

/// Effectiveness counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectivenessMetrics {
    /// Pattern suggestion outcomes.
    #[serde(default)]
    pub pattern_accuracy: PatternAccuracy,
    /// Decision retrieval outcomes.
    #[serde(default)]
    pub decision_relevance: DecisionRelevanceCounts,
    /// Preference application outcomes.
    #[serde(default)]
    pub preference_application: PreferenceApplicationCounts,
}

/// Learning counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningMetrics {
    /// Patterns promoted from observation.
    #[serde(default)]
    pub new_patterns_learned: u64,
    /// Preference values extracted.
    #[serde(default)]
    pub preferences_extracted: u64,
    /// Decisions stored.
    #[serde(default)]
    pub decisions_stored: u64,
    /// Pattern confidence adjustments.
    #[serde(default)]
    pub confidence_updates: u64,
}

/// Schema validation counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationCounts {
    /// Validations that passed.
    #[serde(default)]
    pub passed: u64,
    /// Validations that failed.
    #[serde(default)]
    pub failed: u64,
}

/// Quality counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Integrity score in `[0, 100]`; starts at 100 and loses 5 points per
    /// failed validation.
    #[serde(default = "default_integrity")]
    pub memory_integrity: f32,
    /// Schema validation outcomes.
    #[serde(default)]
    pub schema_validations: ValidationCounts,
    /// Preference conflicts explicitly resolved.
    #[serde(default)]
    pub merge_conflicts_resolved: u64,
}

fn default_integrity() -> f32 {
    100.0
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            memory_integrity: 100.0,
            schema_validations: ValidationCounts::default(),
            merge_conflicts_resolved: 0,
        }
    }
}

/// Tracking metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsMetadata {
    /// When tracking began.
    #[serde(default)]
    pub first_tracked: String,
    /// Whole days elapsed since `first_tracked`.
    #[serde(default)]
    pub tracking_period_days: u32,
    /// Retention horizon for raw metric data.
    #[serde(default = "default_retention")]
    pub data_retention_days: u32,
}

fn default_retention() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Default for MetricsMetadata {
    fn default() -> Self {
        Self {
            first_tracked: String::new(),
            tracking_period_days: 0,
            data_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Top-level persisted metrics document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsDocument {
    /// Schema version.
    pub version: String,
    /// Timestamp of the last mutation.
    #[serde(default)]
    pub last_updated: String,
    /// Adoption counters.
    #[serde(default)]
    pub adoption: AdoptionMetrics,
    /// Effectiveness counters.
    #[serde(default)]
    pub effectiveness: EffectivenessMetrics,
    /// Learning counters.
    #[serde(default)]
    pub learning: LearningMetrics,
    /// Quality counters.
    #[serde(default)]
    pub quality: QualityMetrics,
    /// Tracking metadata.
    #[serde(default)]
    pub metadata: MetricsMetadata,
}

impl Default for MetricsDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: String::new(),
            adoption: AdoptionMetrics::default(),
            effectiveness: EffectivenessMetrics::default(),
            learning: LearningMetrics::default(),
            quality: QualityMetrics::default(),
            metadata: MetricsMetadata::default(),
        }
    }
}

impl MetricsDocument {
    fn touch(&mut self) {
        self.adoption.total_interactions += 1;
        let now = now_iso();
        if let (Some(first), Some(current)) = (
            parse_timestamp(&self.metadata.first_tracked),
            parse_timestamp(&now),
        ) {
            let days = (current - first).num_days().max(0);
            self.metadata.tracking_period_days = u32::try_from(days).unwrap_or(u32::MAX);
        }
        self.last_updated = now;
    }
}

// ---------------------------------------------------------------------------
// Feedback enums
// ---------------------------------------------------------------------------

/// User feedback on a retrieved decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionFeedback {
    /// The decision helped.
    Relevant,
    /// The decision did not apply.
    NotRelevant,
    /// No clear signal.
    Neutral,
}

/// User feedback on a pattern suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFeedback {
    /// The suggestion matched what the user did.
    Correct,
    /// The suggestion was wrong.
    Incorrect,
    /// The suggestion was dismissed.
    Ignored,
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Zero-safe rates derived from the effectiveness counters.
#[derive(Debug, Clone, Default)]
pub struct EffectivenessSummary {
    /// Correct suggestions over all suggestions with feedback (0 when none).
    pub pattern_accuracy_rate: f32,
    /// Relevant retrievals over all retrievals with feedback (0 when none).
    pub decision_relevance_rate: f32,
    /// Kept applications over applied plus overridden (0 when none).
    pub preference_application_rate: f32,
}

/// Learning counters plus their total.
#[derive(Debug, Clone, Default)]
pub struct LearningProgress {
    /// The raw counters.
    pub learning: LearningMetrics,
    /// Sum of all learning events.
    pub total_learned: u64,
}

/// Quality counters with the derived validation rate.
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// Current integrity score.
    pub memory_integrity: f32,
    /// Passed validations over all validations (1.0 when none have run).
    pub validation_success_rate: f32,
    /// Preference conflicts explicitly resolved.
    pub merge_conflicts_resolved: u64,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// The learning metrics tracker.
#[derive(Debug)]
pub struct MetricsTracker {
    store: DocumentStore,
}

impl MetricsTracker {
    /// Open the metrics store under `root`, seeding the document on first
    /// use so `first_tracked` marks when tracking began.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory directory cannot be created or the
    /// seed document cannot be written.
    pub fn open(root: &Path, config: &MemoryConfig) -> Result<Self> {
        let store = DocumentStore::open(root.join(METRICS_FILE), &config.store)?;
        store.update_if(|doc: &mut MetricsDocument| {
            if doc.metadata.first_tracked.is_empty() {
                doc.metadata.first_tracked = now_iso();
                doc.last_updated = doc.metadata.first_tracked.clone();
                ((), true)
            } else {
                ((), false)
            }
        })?;
        Ok(Self { store })
    }

    /// Record the start of a new working session.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn start_session(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.adoption.unique_sessions += 1;
            doc.touch();
        })
    }

    /// Record a Decision Memory read.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_decision_access(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            let usage = &mut doc.adoption.feature_usage.regulatory_decisions;
            usage.access_count += 1;
            usage.last_accessed = Some(now_iso());
            doc.touch();
        })
    }

    /// Record a stored decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_decision_storage(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.adoption
                .feature_usage
                .regulatory_decisions
                .contribution_count += 1;
            doc.learning.decisions_stored += 1;
            doc.touch();
        })
    }

    /// Record a Preference Memory read.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_preference_access(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            let usage = &mut doc.adoption.feature_usage.company_preferences;
            usage.access_count += 1;
            usage.last_accessed = Some(now_iso());
            doc.touch();
        })
    }

    /// Record an extracted preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_preference_extraction(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.adoption
                .feature_usage
                .company_preferences
                .contribution_count += 1;
            doc.learning.preferences_extracted += 1;
            doc.touch();
        })
    }

    /// Record a pattern suggestion shown to the user and whether it was
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_pattern_suggestion(&self, accepted: bool) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            let counter = &mut doc.adoption.feature_usage.task_patterns;
            counter.suggestions_shown += 1;
            if accepted {
                counter.suggestions_accepted += 1;
            }
            counter.last_suggested = Some(now_iso());
            doc.touch();
        })
    }

    /// Record a newly learned pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_pattern_learned(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.learning.new_patterns_learned += 1;
            doc.touch();
        })
    }

    /// Record a pattern confidence adjustment (reinforcement or merge).
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_confidence_update(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.learning.confidence_updates += 1;
            doc.touch();
        })
    }

    /// Record feedback on a retrieved decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_decision_feedback(&self, feedback: DecisionFeedback) -> Result<()> {
        self.store.update(move |doc: &mut MetricsDocument| {
            let counts = &mut doc.effectiveness.decision_relevance;
            match feedback {
                DecisionFeedback::Relevant => counts.relevant += 1,
                DecisionFeedback::NotRelevant => counts.not_relevant += 1,
                DecisionFeedback::Neutral => counts.neutral += 1,
            }
            doc.touch();
        })
    }

    /// Record feedback on a pattern suggestion.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_pattern_feedback(&self, feedback: PatternFeedback) -> Result<()> {
        self.store.update(move |doc: &mut MetricsDocument| {
            let counts = &mut doc.effectiveness.pattern_accuracy;
            match feedback {
                PatternFeedback::Correct => counts.correct += 1,
                PatternFeedback::Incorrect => counts.incorrect += 1,
                PatternFeedback::Ignored => counts.ignored += 1,
            }
            doc.touch();
        })
    }

    /// Record a preference application outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_preference_application(&self, applied: bool, conflict: bool) -> Result<()> {
        self.store.update(move |doc: &mut MetricsDocument| {
            let counts = &mut doc.effectiveness.preference_application;
            if applied {
                counts.applied += 1;
            } else {
                counts.overridden += 1;
            }
            if conflict {
                counts.conflicts += 1;
            }
            doc.touch();
        })
    }

    /// Record a schema validation outcome. Failures erode the integrity
    /// score by 5 points down to a floor of 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_schema_validation(&self, passed: bool) -> Result<()> {
        self.store.update(move |doc: &mut MetricsDocument| {
            if passed {
                doc.quality.schema_validations.passed += 1;
            } else {
                doc.quality.schema_validations.failed += 1;
                doc.quality.memory_integrity =
                    (doc.quality.memory_integrity - INTEGRITY_PENALTY).max(0.0);
                warn!(
                    integrity = doc.quality.memory_integrity,
                    "Schema validation failed"
                );
            }
            doc.touch();
        })
    }

    /// Record an explicitly resolved preference conflict.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track_conflict_resolved(&self) -> Result<()> {
        self.store.update(|doc: &mut MetricsDocument| {
            doc.quality.merge_conflicts_resolved += 1;
            doc.touch();
        })
    }

    /// The current adoption counters.
    #[must_use]
    pub fn adoption_summary(&self) -> AdoptionMetrics {
        let doc: MetricsDocument = self.store.load();
        doc.adoption
    }

    /// Zero-safe effectiveness rates.
    #[must_use]
    pub fn effectiveness_summary(&self) -> EffectivenessSummary {
        let doc: MetricsDocument = self.store.load();
        let accuracy = &doc.effectiveness.pattern_accuracy;
        let relevance = &doc.effectiveness.decision_relevance;
        let application = &doc.effectiveness.preference_application;

        EffectivenessSummary {
            pattern_accuracy_rate: rate(
                accuracy.correct,
                accuracy.correct + accuracy.incorrect + accuracy.ignored,
            ),
            decision_relevance_rate: rate(
                relevance.relevant,
                relevance.relevant + relevance.not_relevant + relevance.neutral,
            ),
            preference_application_rate: rate(
                application.applied,
                application.applied + application.overridden,
            ),
        }
    }

    /// The learning counters plus their total.
    #[must_use]
    pub fn learning_progress(&self) -> LearningProgress {
        let doc: MetricsDocument = self.store.load();
        let learning = doc.learning;
        let total_learned = learning.new_patterns_learned
            + learning.preferences_extracted
            + learning.decisions_stored
            + learning.confidence_updates;
        LearningProgress {
            learning,
            total_learned,
        }
    }

    /// The quality counters with the derived validation rate. The rate
    /// defaults to 1.0 when no validations have run yet.
    #[must_use]
    pub fn quality_report(&self) -> QualityReport {
        let doc: MetricsDocument = self.store.load();
        let validations = &doc.quality.schema_validations;
        let total = validations.passed + validations.failed;
        let validation_success_rate = if total == 0 {
            1.0
        } else {
            validations.passed as f32 / total as f32
        };
        QualityReport {
            memory_integrity: doc.quality.memory_integrity,
            validation_success_rate,
            merge_conflicts_resolved: doc.quality.merge_conflicts_resolved,
        }
    }
}

fn rate(numerator: u64, denominator: u64) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f32 / denominator as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
