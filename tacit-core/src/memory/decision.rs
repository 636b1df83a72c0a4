//! Decision Memory — prior regulatory determinations.
//!
//! Decisions are keyed by opaque IDs (`decision-NNN-YYYYMMDDHHMMSS`), carry
//! a validity window, and are retrieved either by exact ID (tenant-isolated)
//! or by a weighted-substring relevance search. Expired decisions are never
//! physically deleted: the expiry sweep flips `is_valid` and search skips
//! them, but they remain addressable by ID.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MemoryConfig, RelevanceWeights};
use crate::error::Result;
use crate::memory::DOCUMENT_VERSION;
use crate::persistence::DocumentStore;
use crate::scoring::decision_relevance;
use crate::types::{now_compact, now_iso, parse_timestamp, RelevanceScore, FAR_FUTURE};

/// File name for the decision document, by convention.
pub const DECISIONS_FILE: &str = "regulatory-decisions.json";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored regulatory decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Opaque unique ID (`decision-NNN-YYYYMMDDHHMMSS`).
    pub id: String,
    /// Owning company — decisions are tenant-isolated.
    pub company_id: String,
    /// Regulatory category (e.g. `mdr`, `ivdr`, `fda`).
    pub category: String,
    /// Optional regulation reference.
    #[serde(default)]
    pub regulation: Option<String>,
    /// Optional article reference.
    #[serde(default)]
    pub article: Option<String>,
    /// The determination itself.
    pub decision: String,
    /// Supporting rationale.
    pub rationale: String,
    /// Ordered citation strings.
    #[serde(default)]
    pub evidence: Vec<String>,
    /// Expiry timestamp. Stored as a string so one malformed value degrades
    /// only that record's expiry handling, not the whole document.
    #[serde(default = "default_valid_until")]
    pub valid_until: String,
    /// False once expired or superseded. Invalid decisions stay queryable
    /// by ID but are excluded from search.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// How many times this decision was retrieved.
    #[serde(default)]
    pub usage_count: u64,
    /// When this decision was last retrieved.
    #[serde(default)]
    pub last_used_at: Option<String>,
}

/// Caller-supplied fields for a new decision; everything else is defaulted.
#[derive(Debug, Clone)]
pub struct NewDecision {
    /// The determination text.
    pub decision: String,
    /// Supporting rationale.
    pub rationale: String,
    /// Regulatory category.
    pub category: String,
    /// Owning company.
    pub company_id: String,
    /// Optional regulation reference.
    pub regulation: Option<String>,
    /// Optional article reference.
    pub article: Option<String>,
    /// Citation strings.
    pub evidence: Vec<String>,
    /// Search tags.
    pub tags: Vec<String>,
    /// Expiry timestamp; defaults to the far-future sentinel.
    pub valid_until: String,
}

impl Default for NewDecision {
    fn default() -> Self {
        Self {
            decision: String::new(),
            rationale: String::new(),
            category: String::new(),
            company_id: "default".to_string(),
            regulation: None,
            article: None,
            evidence: Vec::new(),
            tags: Vec::new(),
            valid_until: FAR_FUTURE.to_string(),
        }
    }
}

/// A search hit: a decision and its relevance to the query.
#[derive(Debug, Clone)]
pub struct ScoredDecision {
    /// The matching decision.
    pub decision: Decision,
    /// Relevance of the decision to the query, in `[0, 1]`.
    pub relevance: RelevanceScore,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Derived summary of the decision collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    /// Total stored decisions, valid or not.
    #[serde(default)]
    pub total_decisions: usize,
    /// Decisions with `is_valid == true`.
    #[serde(default)]
    pub active_decisions: usize,
    /// Distinct company IDs, sorted.
    #[serde(default)]
    pub companies: Vec<String>,
    /// Distinct non-empty categories, sorted.
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Top-level persisted document for Decision Memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionDocument {
    /// Schema version.
    pub version: String,
    /// Timestamp of the last mutation.
    #[serde(default)]
    pub last_updated: String,
    /// Derived summary, recomputed after every mutation.
    #[serde(default)]
    pub metadata: DecisionMetadata,
    /// The decision collection, in insertion order.
    #[serde(default)]
    pub decisions: Vec<Decision>,
}

impl Default for DecisionDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: String::new(),
            metadata: DecisionMetadata::default(),
            decisions: Vec::new(),
        }
    }
}

impl DecisionDocument {
    /// Recompute the derived metadata block and bump `last_updated`.
    fn refresh_metadata(&mut self) {
        let companies: BTreeSet<&str> = self
            .decisions
            .iter()
            .map(|d| d.company_id.as_str())
            .collect();
        let categories: BTreeSet<&str> = self
            .decisions
            .iter()
            .map(|d| d.category.as_str())
            .filter(|c| !c.is_empty())
            .collect();

        self.metadata = DecisionMetadata {
            total_decisions: self.decisions.len(),
            active_decisions: self.decisions.iter().filter(|d| d.is_valid).count(),
            companies: companies.into_iter().map(String::from).collect(),
            categories: categories.into_iter().map(String::from).collect(),
        };
        self.last_updated = now_iso();
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// The Decision Memory component.
#[derive(Debug)]
pub struct DecisionMemory {
    store: DocumentStore,
    weights: RelevanceWeights,
}

impl DecisionMemory {
    /// Open the decision store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory directory cannot be created.
    pub fn open(root: &Path, config: &MemoryConfig) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(root.join(DECISIONS_FILE), &config.store)?,
            weights: config.relevance.clone(),
        })
    }

    /// Store a new decision, returning its assigned ID.
    ///
    /// # Errors
    ///
    /// Fails only if the underlying save fails; the in-memory state is
    /// discarded in that case and the caller may retry.
    pub fn store(&self, new: NewDecision) -> Result<String> {
        self.store.update(|doc: &mut DecisionDocument| {
            let id = format!("decision-{:03}-{}", doc.decisions.len() + 1, now_compact());
            let now = now_iso();

            doc.decisions.push(Decision {
                id: id.clone(),
                company_id: new.company_id,
                category: new.category,
                regulation: new.regulation,
                article: new.article,
                decision: new.decision,
                rationale: new.rationale,
                evidence: new.evidence,
                valid_until: new.valid_until,
                is_valid: true,
                created_at: now.clone(),
                updated_at: now,
                tags: new.tags,
                usage_count: 0,
                last_used_at: None,
            });
            doc.refresh_metadata();

            debug!(%id, total = doc.decisions.len(), "Decision stored");
            id
        })
    }

    /// Exact lookup by ID, with optional tenant isolation.
    ///
    /// A `company_id` mismatch is treated as not-found. On success the
    /// decision's usage counters are bumped and persisted before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the usage-counter save fails.
    pub fn retrieve(&self, id: &str, company_id: Option<&str>) -> Result<Option<Decision>> {
        self.store.update_if(|doc: &mut DecisionDocument| {
            let found = doc.decisions.iter_mut().find(|d| {
                d.id == id && company_id.is_none_or(|company| d.company_id == company)
            });

            match found {
                Some(decision) => {
                    decision.usage_count += 1;
                    decision.last_used_at = Some(now_iso());
                    decision.updated_at = now_iso();
                    let snapshot = decision.clone();
                    doc.refresh_metadata();
                    (Some(snapshot), true)
                }
                None => (None, false),
            }
        })
    }

    /// Relevance-ranked search over the valid decisions of one company.
    ///
    /// Results below `min_relevance` are dropped; the rest are sorted
    /// descending by score with ties kept in insertion order.
    #[must_use]
    pub fn search(
        &self,
        query: &str,
        company_id: &str,
        category: Option<&str>,
        min_relevance: f32,
    ) -> Vec<ScoredDecision> {
        let doc: DecisionDocument = self.store.load();
        let query_lower = query.to_lowercase();

        let mut results: Vec<ScoredDecision> = doc
            .decisions
            .into_iter()
            .filter(|d| d.is_valid && d.company_id == company_id)
            .filter(|d| category.is_none_or(|c| d.category == c))
            .filter_map(|decision| {
                let relevance = decision_relevance(&query_lower, &decision, &self.weights);
                (relevance.value() >= min_relevance).then_some(ScoredDecision {
                    decision,
                    relevance,
                })
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        results.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        results
    }

    /// Flip `is_valid` on every currently-valid decision whose expiry has
    /// passed. Malformed timestamps are skipped without error. Persists only
    /// when at least one flag flipped, so a second call in a row is a no-op
    /// returning 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the save after a non-zero sweep fails.
    pub fn invalidate_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now().naive_utc();

        self.store.update_if(|doc: &mut DecisionDocument| {
            let mut flipped = 0;
            for decision in doc.decisions.iter_mut().filter(|d| d.is_valid) {
                if let Some(expiry) = parse_timestamp(&decision.valid_until) {
                    if now > expiry {
                        decision.is_valid = false;
                        decision.updated_at = now_iso();
                        flipped += 1;
                    }
                }
            }

            if flipped > 0 {
                doc.refresh_metadata();
                debug!(flipped, "Expired decisions invalidated");
            }
            (flipped, flipped > 0)
        })
    }

    /// All valid decisions belonging to one company, in insertion order.
    #[must_use]
    pub fn company_decisions(&self, company_id: &str) -> Vec<Decision> {
        let doc: DecisionDocument = self.store.load();
        doc.decisions
            .into_iter()
            .filter(|d| d.is_valid && d.company_id == company_id)
            .collect()
    }

    /// Current derived metadata block.
    #[must_use]
    pub fn metadata(&self) -> DecisionMetadata {
        let doc: DecisionDocument = self.store.load();
        doc.metadata
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_valid_until() -> String {
    FAR_FUTURE.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
