//! Preference Memory — per-company formatting and terminology settings.
//!
//! A company profile is a category → key → value mapping plus a conflict
//! audit trail. Profiles are created lazily from a fixed default seed on
//! first write; pure reads of an unknown company materialize the defaults
//! without persisting anything.
//!
//! The overwrite rule for disagreeing values is deliberately isolated in
//! [`arbitrate`]: current policy is last-write-wins with an audit trail, and
//! the recorded confidence does not influence the outcome. Swapping in a
//! confidence-weighted rule only touches that one function.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{MemoryConfig, PreferenceConfig};
use crate::error::{MemoryError, Result};
use crate::memory::DOCUMENT_VERSION;
use crate::persistence::DocumentStore;
use crate::types::now_iso;

/// File name for the preference document, by convention.
pub const PREFERENCES_FILE: &str = "company-preferences.json";

/// Key/value preferences within one category.
pub type CategoryPreferences = BTreeMap<String, Value>;

/// A company's full preference mapping: category → key → value.
pub type Preferences = BTreeMap<String, CategoryPreferences>;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid date pattern"));

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A recorded disagreement between an existing and a newly observed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceConflict {
    /// Sequential ID within the company (`conflict-N`).
    pub conflict_id: String,
    /// Dotted path of the contested preference (`category.key`).
    pub preference: String,
    /// The value that was stored when the conflict was detected.
    pub existing_value: Value,
    /// The newly observed value.
    pub new_value: Value,
    /// When the conflict was detected.
    pub detected_at: String,
    /// Whether an explicit resolution has been applied.
    pub resolved: bool,
    /// When the conflict was resolved, if it was.
    #[serde(default)]
    pub resolved_at: Option<String>,
    /// Extraction confidence recorded at detection time.
    pub confidence: f32,
}

/// One company's profile: preferences plus the conflict audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    /// Company identifier.
    pub company_id: String,
    /// Display name.
    pub company_name: String,
    /// The preference mapping.
    pub preferences: Preferences,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
    /// Ordered conflict log; append-only except for resolution flags.
    #[serde(default)]
    pub preference_conflicts: Vec<PreferenceConflict>,
}

/// How to resolve a recorded preference conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Leave the stored value untouched.
    KeepExisting,
    /// Re-apply the conflict's recorded new value.
    UseNew,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Derived summary of the company collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceMetadata {
    /// Number of known companies.
    #[serde(default)]
    pub total_companies: usize,
    /// Companies counted as active (currently all of them).
    #[serde(default)]
    pub active_companies: usize,
    /// Distinct preference categories across all companies, sorted.
    #[serde(default)]
    pub preference_categories: Vec<String>,
}

/// Top-level persisted document for Preference Memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceDocument {
    /// Schema version.
    pub version: String,
    /// Timestamp of the last mutation.
    #[serde(default)]
    pub last_updated: String,
    /// Derived summary, recomputed after every mutation.
    #[serde(default)]
    pub metadata: PreferenceMetadata,
    /// Profiles keyed by company ID.
    #[serde(default)]
    pub companies: BTreeMap<String, CompanyProfile>,
}

impl Default for PreferenceDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            last_updated: String::new(),
            metadata: PreferenceMetadata::default(),
            companies: BTreeMap::new(),
        }
    }
}

impl PreferenceDocument {
    fn refresh_metadata(&mut self) {
        let mut categories: Vec<String> = self
            .companies
            .values()
            .flat_map(|company| company.preferences.keys().cloned())
            .collect();
        categories.sort();
        categories.dedup();

        self.metadata = PreferenceMetadata {
            total_companies: self.companies.len(),
            active_companies: self.companies.len(),
            preference_categories: categories,
        };
        self.last_updated = now_iso();
    }

    /// Get or lazily create a company profile seeded with the defaults.
    fn profile_mut(&mut self, company_id: &str) -> &mut CompanyProfile {
        self.companies
            .entry(company_id.to_string())
            .or_insert_with(|| {
                let now = now_iso();
                CompanyProfile {
                    company_id: company_id.to_string(),
                    company_name: format!("Company {company_id}"),
                    preferences: default_preferences(),
                    created_at: now.clone(),
                    updated_at: now,
                    preference_conflicts: Vec::new(),
                }
            })
    }
}

/// The fixed default profile seeded into every new company.
#[must_use]
pub fn default_preferences() -> Preferences {
    let mut preferences = Preferences::new();
    preferences.insert(
        "formatting".to_string(),
        category(&[
            ("document_template", json!("imdrf")),
            ("date_format", json!("iso-8601")),
            ("number_format", json!("eu")),
            ("language", json!("en")),
            ("terminology_style", json!("harmonized")),
        ]),
    );
    preferences.insert(
        "terminology".to_string(),
        category(&[
            ("medical_device", json!("medical device")),
            ("manufacturer", json!("manufacturer")),
            ("authorized_representative", json!("authorized representative")),
            ("pms", json!("post-market surveillance")),
            ("pmcf", json!("post-market clinical follow-up")),
        ]),
    );
    preferences.insert(
        "regulatory_framework".to_string(),
        category(&[
            ("primary", json!("mdr")),
            ("secondary", json!(["ivdr"])),
            ("notified_body", json!("default-nb")),
            ("iec_standards", json!(["iso-13485", "iso-14971"])),
        ]),
    );
    preferences.insert(
        "workflow".to_string(),
        category(&[
            ("default_reviewer", json!("quality-manager")),
            ("approval_required", json!(true)),
            ("version_control", json!("semantic")),
        ]),
    );
    preferences
}

fn category(entries: &[(&str, Value)]) -> CategoryPreferences {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

/// Decide which value survives when a new observation disagrees with the
/// stored one. Last write wins; the conflict record keeps the audit trail.
/// `confidence` is recorded but intentionally does not gate the overwrite.
fn arbitrate(_existing: &Value, new_value: &Value, _confidence: f32) -> Value {
    new_value.clone()
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// The Preference Memory component.
#[derive(Debug)]
pub struct PreferenceMemory {
    store: DocumentStore,
    config: PreferenceConfig,
}

impl PreferenceMemory {
    /// Open the preference store under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory directory cannot be created.
    pub fn open(root: &Path, config: &MemoryConfig) -> Result<Self> {
        Ok(Self {
            store: DocumentStore::open(root.join(PREFERENCES_FILE), &config.store)?,
            config: config.preference.clone(),
        })
    }

    /// The stored preferences for a company, or a freshly materialized
    /// default profile for an unknown one. A pure read never persists.
    #[must_use]
    pub fn get(&self, company_id: &str) -> Preferences {
        let doc: PreferenceDocument = self.store.load();
        doc.companies
            .get(company_id)
            .map_or_else(default_preferences, |profile| profile.preferences.clone())
    }

    /// Record an observed preference value.
    ///
    /// Creates the company profile from the default seed if absent. Writing
    /// a `(category, key)` that already holds a different value never
    /// overwrites silently: a conflict record is appended before the
    /// [`arbitrate`] policy is applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn extract(
        &self,
        company_id: &str,
        category_name: &str,
        key: &str,
        value: Value,
        confidence: Option<f32>,
    ) -> Result<()> {
        let confidence = confidence.unwrap_or(self.config.default_confidence);

        self.store.update(|doc: &mut PreferenceDocument| {
            let profile = doc.profile_mut(company_id);
            let entries = profile
                .preferences
                .entry(category_name.to_string())
                .or_default();

            match entries.get(key) {
                Some(existing) if *existing != value => {
                    let conflict = PreferenceConflict {
                        conflict_id: format!(
                            "conflict-{}",
                            profile.preference_conflicts.len() + 1
                        ),
                        preference: format!("{category_name}.{key}"),
                        existing_value: existing.clone(),
                        new_value: value.clone(),
                        detected_at: now_iso(),
                        resolved: false,
                        resolved_at: None,
                        confidence,
                    };
                    debug!(
                        company = company_id,
                        preference = %conflict.preference,
                        "Preference conflict detected"
                    );

                    let winner = arbitrate(existing, &value, confidence);
                    let entries = profile
                        .preferences
                        .entry(category_name.to_string())
                        .or_default();
                    entries.insert(key.to_string(), winner);
                    profile.preference_conflicts.push(conflict);
                }
                Some(_) => {} // same value, nothing to record
                None => {
                    entries.insert(key.to_string(), value);
                }
            }

            profile.updated_at = now_iso();
            doc.refresh_metadata();
        })
    }

    /// Apply stored preferences to a document as text transformations.
    ///
    /// Terminology entries replace the standard key (underscores become
    /// spaces) with the company term; when `formatting.date_format` is
    /// `"mm/dd/yyyy"`, ISO `YYYY-MM-DD` dates are rewritten to `MM/DD/YYYY`.
    /// Categories absent from the profile are silently skipped.
    #[must_use]
    pub fn apply(&self, content: &str, company_id: &str, categories: Option<&[&str]>) -> String {
        let preferences = self.get(company_id);
        let wanted =
            |name: &str| categories.is_none_or(|selected| selected.contains(&name));

        let mut result = content.to_string();

        if wanted("terminology") {
            if let Some(terminology) = preferences.get("terminology") {
                for (standard, term) in terminology {
                    if let Some(term) = term.as_str() {
                        let search = standard.replace('_', " ");
                        result = result.replace(&search, term);
                    }
                }
            }
        }

        if wanted("formatting") {
            let us_dates = preferences
                .get("formatting")
                .and_then(|formatting| formatting.get("date_format"))
                .and_then(Value::as_str)
                == Some("mm/dd/yyyy");
            if us_dates {
                result = ISO_DATE.replace_all(&result, "$2/$3/$1").into_owned();
            }
        }

        result
    }

    /// The conflict audit trail for a company (empty for unknown companies).
    #[must_use]
    pub fn detect_conflicts(&self, company_id: &str) -> Vec<PreferenceConflict> {
        let doc: PreferenceDocument = self.store.load();
        doc.companies
            .get(company_id)
            .map(|profile| profile.preference_conflicts.clone())
            .unwrap_or_default()
    }

    /// Resolve a recorded conflict.
    ///
    /// `KeepExisting` leaves the stored value untouched; `UseNew` re-applies
    /// the conflict's recorded new value. Either path marks the conflict
    /// resolved with a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::CompanyNotFound`] or
    /// [`MemoryError::ConflictNotFound`] without mutating the store, or an
    /// error if the save fails.
    pub fn resolve_conflict(
        &self,
        company_id: &str,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let outcome = self.store.update_if(|doc: &mut PreferenceDocument| {
            let Some(profile) = doc.companies.get_mut(company_id) else {
                return (Err(MemoryError::CompanyNotFound(company_id.to_string())), false);
            };

            let Some(index) = profile
                .preference_conflicts
                .iter()
                .position(|c| c.conflict_id == conflict_id)
            else {
                return (
                    Err(MemoryError::ConflictNotFound {
                        company_id: company_id.to_string(),
                        conflict_id: conflict_id.to_string(),
                    }),
                    false,
                );
            };

            if resolution == ConflictResolution::UseNew {
                let (path, new_value) = {
                    let conflict = &profile.preference_conflicts[index];
                    (conflict.preference.clone(), conflict.new_value.clone())
                };
                if let Some((category_name, key)) = path.split_once('.') {
                    profile
                        .preferences
                        .entry(category_name.to_string())
                        .or_default()
                        .insert(key.to_string(), new_value);
                }
            }

            let conflict = &mut profile.preference_conflicts[index];
            conflict.resolved = true;
            conflict.resolved_at = Some(now_iso());
            profile.updated_at = now_iso();
            doc.refresh_metadata();
            (Ok(()), true)
        })?;

        outcome
    }

    /// Current derived metadata block.
    #[must_use]
    pub fn metadata(&self) -> PreferenceMetadata {
        let doc: PreferenceDocument = self.store.load();
        doc.metadata
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
