//! Configuration for the Tacit memory system.
//!
//! Maps directly to `tacit.toml`. Every field has a serde default so a
//! partial (or absent) file yields the same values as [`MemoryConfig::default`].

use serde::{Deserialize, Serialize};

/// Top-level Tacit configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Decision search relevance weights.
    #[serde(default)]
    pub relevance: RelevanceWeights,
    /// Pattern detection, suggestion, and merge thresholds.
    #[serde(default)]
    pub pattern: PatternConfig,
    /// Preference extraction settings.
    #[serde(default)]
    pub preference: PreferenceConfig,
    /// Persistence settings shared by all stores.
    #[serde(default)]
    pub store: StoreConfig,
}

impl MemoryConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`MemoryError::Config`](crate::MemoryError::Config) if the
    /// TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MemoryError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Weights for the decision relevance score.
///
/// Each weight is the contribution of one substring match; contributions are
/// additive and the total is capped at 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceWeights {
    /// Weight for a match in the decision text.
    #[serde(default = "default_0_4")]
    pub decision: f32,
    /// Weight for a match in the rationale.
    #[serde(default = "default_0_3")]
    pub rationale: f32,
    /// Weight for a match in any tag (counted at most once).
    #[serde(default = "default_0_15")]
    pub tag: f32,
    /// Weight for a match in the regulation reference.
    #[serde(default = "default_0_1")]
    pub regulation: f32,
    /// Weight for a match in the article reference.
    #[serde(default = "default_0_05")]
    pub article: f32,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            decision: 0.4,
            rationale: 0.3,
            tag: 0.15,
            regulation: 0.1,
            article: 0.05,
        }
    }
}

/// Pattern lifecycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Step similarity required for two observations to count as the same
    /// task (and for an observation to match an existing pattern).
    #[serde(default = "default_0_9")]
    pub candidate_similarity: f32,
    /// Observations of the same sequence required before a pattern is created.
    #[serde(default = "default_3")]
    pub promotion_occurrences: usize,
    /// Confidence assigned to a freshly promoted pattern.
    #[serde(default = "default_0_8")]
    pub initial_confidence: f32,
    /// Base term of the confidence recurrence.
    #[serde(default = "default_0_5")]
    pub confidence_base: f32,
    /// Per-occurrence confidence increment.
    #[serde(default = "default_0_1")]
    pub confidence_step: f32,
    /// Minimum confidence for a pattern to be eligible for suggestion.
    #[serde(default = "default_0_7")]
    pub suggestion_min_confidence: f32,
    /// Minimum composite score for a suggestion to be returned.
    #[serde(default = "default_0_6")]
    pub suggestion_min_score: f32,
    /// How many top suggestions have their counters bumped when shown.
    #[serde(default = "default_3")]
    pub suggestion_top_k: usize,
    /// Step similarity required between patterns being merged. Looser than
    /// `candidate_similarity` because merging intentionally generalizes.
    #[serde(default = "default_0_6")]
    pub merge_similarity: f32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            candidate_similarity: 0.9,
            promotion_occurrences: 3,
            initial_confidence: 0.8,
            confidence_base: 0.5,
            confidence_step: 0.1,
            suggestion_min_confidence: 0.7,
            suggestion_min_score: 0.6,
            suggestion_top_k: 3,
            merge_similarity: 0.6,
        }
    }
}

/// Preference extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceConfig {
    /// Confidence recorded on a conflict when the caller does not supply one.
    #[serde(default = "default_0_8")]
    pub default_confidence: f32,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.8,
        }
    }
}

/// Persistence settings shared by all document stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Name of the sibling directory holding optional JSON Schemas.
    #[serde(default = "default_schema_dir")]
    pub schema_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_dir: "schemas".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_schema_dir() -> String { "schemas".to_string() }
fn default_0_05() -> f32 { 0.05 }
fn default_0_1() -> f32 { 0.1 }
fn default_0_15() -> f32 { 0.15 }
fn default_0_3() -> f32 { 0.3 }
fn default_0_4() -> f32 { 0.4 }
fn default_0_5() -> f32 { 0.5 }
fn default_0_6() -> f32 { 0.6 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f32 { 0.8 }
fn default_0_9() -> f32 { 0.9 }
fn default_3() -> usize { 3 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_weights() {
        let config = MemoryConfig::default();
        assert!((config.relevance.decision - 0.4).abs() < f32::EPSILON);
        assert!((config.relevance.rationale - 0.3).abs() < f32::EPSILON);
        assert!((config.relevance.tag - 0.15).abs() < f32::EPSILON);
        assert_eq!(config.pattern.promotion_occurrences, 3);
        assert!((config.pattern.initial_confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = MemoryConfig::from_toml(
            "[pattern]\nsuggestion_top_k = 5\n",
        )
        .expect("parse");
        assert_eq!(config.pattern.suggestion_top_k, 5);
        assert!((config.pattern.merge_similarity - 0.6).abs() < f32::EPSILON);
        assert!((config.relevance.decision - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = MemoryConfig::from_toml("not [valid").unwrap_err();
        assert!(matches!(err, crate::MemoryError::Config(_)));
    }
}
