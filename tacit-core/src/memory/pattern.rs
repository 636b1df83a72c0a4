//! Task Pattern Memory — recurring step sequences promoted into patterns.
//!
//! Observation history is session state, passed in explicitly as a
//! [`TaskSession`] rather than accumulated globally; only promoted patterns
//! are persisted. A sequence becomes a pattern after three sufficiently
//! similar observations within a session, is reinforced on every further
//! match, and can be merged with near-duplicates once both sides have been
//! promoted independently.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{MemoryConfig, PatternConfig};
use crate::error::{MemoryError, Result};
use crate::memory::DOCUMENT_VERSION;
use crate::persistence::DocumentStore;
use crate::scoring::{sequence_signature, step_similarity};
use crate::types::{now_iso, RelevanceScore, StepObservation, TaskStep};

/// File name for the pattern document, by convention.
pub const PATTERNS_FILE: &str = "task-patterns.json";

/// Domain keywords that become tags when present in a task description.
const TAG_KEYWORDS: &[&str] = &[
    "mdr",
    "ivdr",
    "risk",
    "technical",
    "documentation",
    "review",
    "analysis",
    "compliance",
];

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A promoted, persisted task pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPattern {
    /// Sequential ID (`pattern-NNN`).
    pub id: String,
    /// Short generated name.
    pub name: String,
    /// Description of the task the pattern was learned from.
    pub description: String,
    /// How many times this sequence has been observed.
    pub occurrence_count: u32,
    /// Confidence in `[0, 1]`, grown by reinforcement.
    pub confidence: f32,
    /// The canonical ordered steps.
    pub steps: Vec<TaskStep>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
    /// When this pattern was last offered as a suggestion.
    #[serde(default)]
    pub last_suggested_at: Option<String>,
    /// How many times it has been offered.
    #[serde(default)]
    pub suggestion_count: u64,
    /// Inferred tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// False once the pattern has been merged away.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// IDs of the patterns this one was merged from, if any.
    #[serde(default)]
    pub merged_from: Option<Vec<String>>,
    /// ID of the pattern this one was merged into, if retired.
    #[serde(default)]
    pub merged_into: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One observed task within a session.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Free-text task description.
    pub description: String,
    /// The observed steps.
    pub steps: Vec<StepObservation>,
    /// When the task was recorded.
    pub observed_at: String,
}

/// In-memory observation history for one working session.
///
/// Sessions are plain values owned by the caller; dropping one discards its
/// history without touching the persisted patterns.
#[derive(Debug, Clone, Default)]
pub struct TaskSession {
    /// Tasks observed so far, oldest first.
    pub history: Vec<TaskRecord>,
}

impl TaskSession {
    /// An empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A pattern offered for the current task, with its match score.
#[derive(Debug, Clone)]
pub struct PatternSuggestion {
    /// The suggested pattern, after its suggestion counters were bumped.
    pub pattern: TaskPattern,
    /// Match score in `[0, 1]`.
    pub score: RelevanceScore,
}

/// A pattern rendered as a reusable workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Template name, taken from the pattern.
    pub name: String,
    /// Template description.
    pub description: String,
    /// Ordered steps.
    pub steps: Vec<TaskStep>,
    /// Coarse duration estimate derived from the step count.
    pub estimated_duration: String,
    /// Distinct agents involved, in order of first appearance.
    pub required_agents: Vec<String>,
    /// ID of the pattern the template was derived from.
    pub source_pattern_id: String,
    /// Confidence inherited from the pattern.
    pub confidence: f32,
}

/// Aggregate view over the stored patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternStatistics {
    /// All stored patterns, including retired ones.
    pub total_patterns: usize,
    /// Patterns still valid.
    pub valid_patterns: usize,
    /// Mean confidence over valid patterns (0 when there are none).
    pub average_confidence: f32,
    /// Sum of occurrence counts over valid patterns.
    pub total_occurrences: u64,
    /// IDs of the five most-observed valid patterns, descending.
    pub most_used: Vec<String>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Derived summary of the pattern collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// Number of stored patterns.
    #[serde(default)]
    pub total_patterns: usize,
    /// Valid patterns with confidence at or above 0.8.
    #[serde(default)]
    pub high_confidence_patterns: usize,
    /// Sorted union of all tags.
    #[serde(default)]
    pub pattern_tags: Vec<String>,
}

/// Top-level persisted document for Task Pattern Memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDocument {
    /// Schema version.
    pub version: String,
    /// Timestamp of the last mutation.
    #[serde(default)]
    pub last_updated: String,
    /// Derived summary, recomputed after every mutation.
    #[serde(default)]
    pub metadata: PatternMetadata,
    /// The stored patterns.
    #[serde(default)]
    pub patterns: Vec<TaskPattern>,
}

impl Default for PatternDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: String::new(),
            metadata: PatternMetadata::default(),
            patterns: Vec::new(),
        }
    }
}

impl PatternDocument {
    fn refresh_metadata(&mut self) {
        let tags: BTreeSet<String> = self
            .patterns
            .iter()
            .flat_map(|pattern| pattern.tags.iter().cloned())
            .collect();

        self.metadata = PatternMetadata {
            total_patterns: self.patterns.len(),
            high_confidence_patterns: self
                .patterns
                .iter()
                .filter(|p| p.is_valid && p.confidence >= 0.8)
                .count(),
            pattern_tags: tags.into_iter().collect(),
        };
        self.last_updated = now_iso();
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// The Task Pattern Memory component.
#[derive(Debug)]
pub struct PatternMemory {
    store: DocumentStore,
    config: PatternConfig,
}

impl PatternMemory {
    /// Open the pattern store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory directory cannot be created.
    pub fn open(root: &Path, config: &MemoryConfig) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(root.join(PATTERNS_FILE), &config.store)?,
            config: config.pattern.clone(),
        })
    }

    /// Record an observed task and promote or reinforce a pattern when the
    /// session has seen enough similar sequences.
    ///
    /// The observation is appended to `session` unconditionally. Once the
    /// count of similar observations in this session reaches the promotion
    /// threshold, an existing matching pattern is reinforced, or a new one
    /// is created; the affected pattern is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn track(
        &self,
        session: &mut TaskSession,
        description: &str,
        steps: Vec<StepObservation>,
    ) -> Result<Option<TaskPattern>> {
        let similar = session
            .history
            .iter()
            .filter(|record| {
                step_similarity(&record.steps, &steps) >= self.config.candidate_similarity
            })
            .count();

        session.history.push(TaskRecord {
            description: description.to_string(),
            steps: steps.clone(),
            observed_at: now_iso(),
        });

        if similar + 1 < self.config.promotion_occurrences {
            return Ok(None);
        }

        let config = self.config.clone();
        let description = description.to_string();
        self.store.update_if(move |doc: &mut PatternDocument| {
            let signature = sequence_signature(&steps);
            let existing = doc.patterns.iter_mut().find(|pattern| {
                pattern.is_valid
                    && pattern.steps.len() == steps.len()
                    && (sequence_signature(&pattern.steps) == signature
                        || step_similarity(&pattern.steps, &steps)
                            >= config.candidate_similarity)
            });

            let promoted = if let Some(pattern) = existing {
                pattern.occurrence_count += 1;
                pattern.confidence = (config.confidence_base
                    + config.confidence_step * pattern.occurrence_count as f32)
                    .min(1.0);
                pattern.updated_at = now_iso();
                debug!(
                    pattern = %pattern.id,
                    occurrences = pattern.occurrence_count,
                    confidence = pattern.confidence,
                    "Reinforced task pattern"
                );
                pattern.clone()
            } else {
                let pattern = new_pattern(
                    doc.patterns.len() + 1,
                    &description,
                    &steps,
                    &config,
                );
                info!(pattern = %pattern.id, name = %pattern.name, "Learned new task pattern");
                doc.patterns.push(pattern.clone());
                pattern
            };

            doc.refresh_metadata();
            (Some(promoted), true)
        })
    }

    /// Suggest stored patterns matching the current task.
    ///
    /// Eligible patterns are valid with confidence at or above the
    /// suggestion threshold. The score combines tag hits in the description
    /// with step similarity; results below the score floor are dropped, and
    /// the rest are returned ordered by descending score with ties keeping
    /// insertion order. Suggestion counters are bumped and persisted on the
    /// stored patterns for the top three entries only.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn suggest(
        &self,
        description: &str,
        current_steps: &[StepObservation],
    ) -> Result<Vec<PatternSuggestion>> {
        let config = self.config.clone();
        let description_lower = description.to_lowercase();
        let current_steps = current_steps.to_vec();

        self.store.update_if(move |doc: &mut PatternDocument| {
            let mut scored: Vec<(usize, RelevanceScore)> = doc
                .patterns
                .iter()
                .enumerate()
                .filter(|(_, pattern)| {
                    pattern.is_valid && pattern.confidence >= config.suggestion_min_confidence
                })
                .filter_map(|(index, pattern)| {
                    let mut score = 0.0_f32;
                    for tag in &pattern.tags {
                        if description_lower.contains(tag.as_str()) {
                            score += 0.3;
                        }
                    }
                    score += 0.7 * step_similarity(&pattern.steps, &current_steps);
                    let score = RelevanceScore::new(score);
                    (score.value() >= config.suggestion_min_score).then_some((index, score))
                })
                .collect();

            scored.sort_by(|a, b| b.1.cmp(&a.1));

            if scored.is_empty() {
                return (Vec::new(), false);
            }

            // Only the top few shown-first suggestions count as "shown";
            // the rest of the eligible list is still returned.
            let bumped = scored.len().min(config.suggestion_top_k);
            let now = now_iso();
            let suggestions = scored
                .into_iter()
                .enumerate()
                .map(|(rank, (index, score))| {
                    if rank < bumped {
                        let pattern = &mut doc.patterns[index];
                        pattern.suggestion_count += 1;
                        pattern.last_suggested_at = Some(now.clone());
                    }
                    PatternSuggestion {
                        pattern: doc.patterns[index].clone(),
                        score,
                    }
                })
                .collect();

            doc.refresh_metadata();
            (suggestions, bumped > 0)
        })
    }

    /// Merge two or more near-duplicate patterns into one.
    ///
    /// All sources must exist, still be valid, and have the same step count;
    /// every source must be step-similar to the first above the merge
    /// threshold. The merged pattern sums occurrences, averages confidence
    /// with a small boost, unions tags, joins descriptions, and takes the
    /// first source's steps. Sources are retired in place with lineage
    /// recorded on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::PatternNotFound`] or
    /// [`MemoryError::CannotMerge`] without mutating the store, or an error
    /// if the save fails.
    pub fn merge(&self, pattern_ids: &[&str]) -> Result<TaskPattern> {
        if pattern_ids.len() < 2 {
            return Err(MemoryError::CannotMerge {
                reason: "at least two patterns are required".to_string(),
            });
        }

        let config = self.config.clone();
        let ids: Vec<String> = pattern_ids.iter().map(ToString::to_string).collect();

        let outcome = self.store.update_if(move |doc: &mut PatternDocument| {
            let mut indices = Vec::with_capacity(ids.len());
            for id in &ids {
                match doc.patterns.iter().position(|p| p.id == *id) {
                    Some(index) => indices.push(index),
                    None => return (Err(MemoryError::PatternNotFound(id.clone())), false),
                }
            }

            for &index in &indices {
                if !doc.patterns[index].is_valid {
                    return (
                        Err(MemoryError::CannotMerge {
                            reason: format!(
                                "{} has already been merged away",
                                doc.patterns[index].id
                            ),
                        }),
                        false,
                    );
                }
            }

            let first = &doc.patterns[indices[0]];
            for &index in &indices[1..] {
                let other = &doc.patterns[index];
                if other.steps.len() != first.steps.len() {
                    return (
                        Err(MemoryError::CannotMerge {
                            reason: format!(
                                "{} and {} have different step counts",
                                first.id, other.id
                            ),
                        }),
                        false,
                    );
                }
                if step_similarity(&first.steps, &other.steps) < config.merge_similarity {
                    return (
                        Err(MemoryError::CannotMerge {
                            reason: format!(
                                "{} and {} are not similar enough to merge",
                                first.id, other.id
                            ),
                        }),
                        false,
                    );
                }
            }

            let now = now_iso();
            let merged_id = format!("pattern-{:03}", doc.patterns.len() + 1);
            let sources: Vec<TaskPattern> = indices
                .iter()
                .map(|&index| doc.patterns[index].clone())
                .collect();

            let occurrence_count = sources.iter().map(|p| p.occurrence_count).sum();
            let average = sources.iter().map(|p| p.confidence).sum::<f32>()
                / sources.len() as f32;
            let tags: BTreeSet<String> = sources
                .iter()
                .flat_map(|p| p.tags.iter().cloned())
                .collect();
            let description = sources
                .iter()
                .map(|p| p.description.as_str())
                .collect::<Vec<_>>()
                .join(" | ");

            let merged = TaskPattern {
                id: merged_id.clone(),
                name: sources[0].name.clone(),
                description,
                occurrence_count,
                confidence: (average + 0.1).min(1.0),
                steps: sources[0].steps.clone(),
                created_at: now.clone(),
                updated_at: now.clone(),
                last_suggested_at: None,
                suggestion_count: 0,
                tags: tags.into_iter().collect(),
                is_valid: true,
                merged_from: Some(ids.clone()),
                merged_into: None,
            };

            for &index in &indices {
                let source = &mut doc.patterns[index];
                source.is_valid = false;
                source.merged_into = Some(merged_id.clone());
                source.updated_at = now.clone();
            }

            info!(merged = %merged_id, sources = ids.len(), "Merged task patterns");
            doc.patterns.push(merged.clone());
            doc.refresh_metadata();
            (Ok(merged), true)
        })?;

        outcome
    }

    /// Render a stored pattern as a reusable workflow template.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::PatternNotFound`] for an unknown ID.
    pub fn workflow_template(&self, pattern_id: &str) -> Result<WorkflowTemplate> {
        let doc: PatternDocument = self.store.load();
        let pattern = doc
            .patterns
            .iter()
            .find(|p| p.id == pattern_id)
            .ok_or_else(|| MemoryError::PatternNotFound(pattern_id.to_string()))?;

        let mut required_agents = Vec::new();
        for step in &pattern.steps {
            if !step.agent.is_empty() && !required_agents.contains(&step.agent) {
                required_agents.push(step.agent.clone());
            }
        }

        Ok(WorkflowTemplate {
            name: pattern.name.clone(),
            description: pattern.description.clone(),
            steps: pattern.steps.clone(),
            estimated_duration: estimate_duration(pattern.steps.len()),
            required_agents,
            source_pattern_id: pattern.id.clone(),
            confidence: pattern.confidence,
        })
    }

    /// Aggregate statistics over the stored patterns.
    #[must_use]
    pub fn statistics(&self) -> PatternStatistics {
        let doc: PatternDocument = self.store.load();
        let valid: Vec<&TaskPattern> = doc.patterns.iter().filter(|p| p.is_valid).collect();

        let average_confidence = if valid.is_empty() {
            0.0
        } else {
            valid.iter().map(|p| p.confidence).sum::<f32>() / valid.len() as f32
        };

        let mut by_usage: Vec<&&TaskPattern> = valid.iter().collect();
        by_usage.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));

        PatternStatistics {
            total_patterns: doc.patterns.len(),
            valid_patterns: valid.len(),
            average_confidence,
            total_occurrences: valid.iter().map(|p| u64::from(p.occurrence_count)).sum(),
            most_used: by_usage.iter().take(5).map(|p| p.id.clone()).collect(),
        }
    }

    /// Current derived metadata block.
    #[must_use]
    pub fn metadata(&self) -> PatternMetadata {
        let doc: PatternDocument = self.store.load();
        doc.metadata
    }
}

fn new_pattern(
    ordinal: usize,
    description: &str,
    steps: &[StepObservation],
    config: &PatternConfig,
) -> TaskPattern {
    let now = now_iso();
    TaskPattern {
        id: format!("pattern-{ordinal:03}"),
        name: infer_name(description, ordinal),
        description: description.to_string(),
        occurrence_count: config.promotion_occurrences as u32,
        confidence: config.initial_confidence,
        steps: steps
            .iter()
            .enumerate()
            .map(|(index, step)| TaskStep {
                order: index as u32 + 1,
                action: step.action.clone(),
                description: step.description.clone(),
                agent: step.agent.clone(),
            })
            .collect(),
        created_at: now.clone(),
        updated_at: now,
        last_suggested_at: None,
        suggestion_count: 0,
        tags: infer_tags(description, steps),
        is_valid: true,
        merged_from: None,
        merged_into: None,
    }
}

/// Name a pattern from the first few substantive words of its description.
fn infer_name(description: &str, ordinal: usize) -> String {
    let words: Vec<String> = description
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .take(3)
        .map(capitalize)
        .collect();

    if words.is_empty() {
        format!("Pattern {ordinal}")
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Tags are domain keywords found in the description plus the agents
/// involved in the steps.
fn infer_tags(description: &str, steps: &[StepObservation]) -> Vec<String> {
    let description_lower = description.to_lowercase();
    let mut tags: Vec<String> = TAG_KEYWORDS
        .iter()
        .filter(|keyword| description_lower.contains(**keyword))
        .map(ToString::to_string)
        .collect();

    for step in steps {
        if step.agent.is_empty() {
            continue;
        }
        let agent = step.agent.to_lowercase().replace('-', " ");
        if !tags.contains(&agent) {
            tags.push(agent);
        }
    }

    tags
}

fn estimate_duration(step_count: usize) -> String {
    match step_count {
        0..=2 => "< 5 minutes",
        3..=4 => "5-15 minutes",
        5..=6 => "15-30 minutes",
        _ => "> 30 minutes",
    }
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
