//! Integration Tests — End-to-End Memory Flows
//!
//! These tests drive the memory components together against a shared
//! project directory, the way an agent session would: store decisions and
//! retrieve them later, learn preferences and apply them to documents,
//! promote task patterns across sessions, and track the whole exchange in
//! the metrics document.

use serde_json::json;

use tacit_core::config::MemoryConfig;
use tacit_core::memory::preference::ConflictResolution;
use tacit_core::memory::{DecisionMemory, PatternMemory, PreferenceMemory};
use tacit_core::metrics::{DecisionFeedback, MetricsTracker};
use tacit_core::types::StepObservation;
use tacit_core::{NewDecision, TaskSession};

fn steps(actions: &[&str]) -> Vec<StepObservation> {
    actions
        .iter()
        .map(|action| StepObservation::new(*action, "", "regulatory-analyst"))
        .collect()
}

// ---------------------------------------------------------------------------
// Decision lifecycle: store → search in a later session → use → expire
// ---------------------------------------------------------------------------

#[test]
fn decisions_survive_across_sessions_and_track_usage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();

    // Session one stores a classification decision.
    let id = {
        let decisions = DecisionMemory::open(dir.path(), &config).expect("open");
        decisions
            .store(NewDecision {
                company_id: "acme".to_string(),
                category: "classification".to_string(),
                regulation: Some("MDR 2017/745".to_string()),
                article: Some("Article 52".to_string()),
                decision: "Class II device requires a 510(k) submission".to_string(),
                rationale: "A predicate device exists on the US market".to_string(),
                tags: vec!["classification".to_string(), "510k".to_string()],
                ..NewDecision::default()
            })
            .expect("store")
    };

    // Session two finds it by query, then records the usage by ID.
    let decisions = DecisionMemory::open(dir.path(), &config).expect("open");
    let results = decisions.search("510(k)", "acme", None, 0.1);
    assert_eq!(results.len(), 1);
    assert!(results[0].relevance.value() >= 0.4);
    assert_eq!(results[0].decision.id, id);

    let used = decisions
        .retrieve(&id, Some("acme"))
        .expect("retrieve")
        .expect("found");
    assert_eq!(used.usage_count, 1);

    // Session three sees the accumulated usage.
    let decisions = DecisionMemory::open(dir.path(), &config).expect("open");
    let used = decisions
        .retrieve(&id, Some("acme"))
        .expect("retrieve")
        .expect("found");
    assert_eq!(used.usage_count, 2);
    assert!(used.last_used_at.is_some());
}

#[test]
fn expired_decisions_drop_out_of_retrieval_but_stay_on_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();
    let decisions = DecisionMemory::open(dir.path(), &config).expect("open");

    decisions
        .store(NewDecision {
            decision: "Transitional provision applies until the deadline".to_string(),
            rationale: "Legacy device under the old directive".to_string(),
            valid_until: "2020-05-26T00:00:00Z".to_string(),
            ..NewDecision::default()
        })
        .expect("store");
    decisions
        .store(NewDecision {
            decision: "Transitional provision no longer applies".to_string(),
            rationale: "Certificate reissued under the new regulation".to_string(),
            ..NewDecision::default()
        })
        .expect("store");

    let flipped = decisions.invalidate_expired().expect("invalidate");
    assert_eq!(flipped, 1);

    let results = decisions.search("transitional", "default", None, 0.1);
    assert_eq!(results.len(), 1);
    assert!(results[0].decision.is_valid);

    // The expired record is still in the document for audit.
    assert_eq!(decisions.metadata().total_decisions, 2);
    assert_eq!(decisions.company_decisions("default").len(), 1);
}

// ---------------------------------------------------------------------------
// Preference lifecycle: extract → conflict → resolve → apply
// ---------------------------------------------------------------------------

#[test]
fn preferences_learned_in_one_session_format_documents_in_the_next() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();

    {
        let preferences = PreferenceMemory::open(dir.path(), &config).expect("open");
        preferences
            .extract("acme", "formatting", "date_format", json!("mm/dd/yyyy"), None)
            .expect("extract");
        preferences
            .extract("acme", "terminology", "pms", json!("PMS"), None)
            .expect("extract");
    }

    let preferences = PreferenceMemory::open(dir.path(), &config).expect("open");
    let formatted = preferences.apply("pms report due 2025-06-30", "acme", None);
    assert_eq!(formatted, "PMS report due 06/30/2025");
}

#[test]
fn conflict_is_audited_and_resolvable_either_way() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();
    let preferences = PreferenceMemory::open(dir.path(), &config).expect("open");

    preferences
        .extract("acme", "workflow", "default_reviewer", json!("ra-lead"), Some(0.9))
        .expect("extract");
    // Disagrees with both the seeded default and the first extraction.
    preferences
        .extract("acme", "workflow", "default_reviewer", json!("qa-lead"), Some(0.5))
        .expect("extract");

    let conflicts = preferences.detect_conflicts("acme");
    assert_eq!(conflicts.len(), 2);
    let latest = conflicts.last().expect("latest conflict");
    assert_eq!(latest.new_value, json!("qa-lead"));

    // Last write won; resolving the first conflict in favor of its new
    // value restores the earlier extraction.
    preferences
        .resolve_conflict("acme", &conflicts[0].conflict_id, ConflictResolution::UseNew)
        .expect("resolve");
    assert_eq!(
        preferences.get("acme")["workflow"]["default_reviewer"],
        json!("ra-lead")
    );
    assert!(preferences.detect_conflicts("acme")[0].resolved);
}

// ---------------------------------------------------------------------------
// Pattern lifecycle: observe → promote → suggest in a later session
// ---------------------------------------------------------------------------

#[test]
fn patterns_promoted_in_one_session_are_suggested_in_the_next() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();

    {
        let patterns = PatternMemory::open(dir.path(), &config).expect("open");
        let mut session = TaskSession::new();
        for _ in 0..3 {
            let workflow = steps(&["classify-device", "draft-documentation", "review"]);
            patterns
                .track(&mut session, "MDR technical documentation review", workflow)
                .expect("track");
        }
        assert_eq!(patterns.statistics().total_patterns, 1);
        // Session history is not persisted.
    }

    let patterns = PatternMemory::open(dir.path(), &config).expect("open");
    let suggestions = patterns
        .suggest(
            "another mdr documentation review",
            &steps(&["classify-device", "draft-documentation", "review"]),
        )
        .expect("suggest");
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0].score.value() >= 0.6);

    // A fresh session starts counting observations from zero again.
    let mut fresh = TaskSession::new();
    let promoted = patterns
        .track(
            &mut fresh,
            "MDR technical documentation review",
            steps(&["classify-device", "draft-documentation", "review"]),
        )
        .expect("track");
    assert!(promoted.is_none());
}

#[test]
fn promoted_pattern_becomes_a_workflow_template() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();
    let patterns = PatternMemory::open(dir.path(), &config).expect("open");

    let mut session = TaskSession::new();
    let mut promoted = None;
    for _ in 0..3 {
        promoted = patterns
            .track(
                &mut session,
                "risk analysis for technical file",
                steps(&["collect-inputs", "assess-risk", "document-findings"]),
            )
            .expect("track");
    }
    let pattern = promoted.expect("promoted");

    let template = patterns.workflow_template(&pattern.id).expect("template");
    assert_eq!(template.steps.len(), 3);
    assert_eq!(template.estimated_duration, "5-15 minutes");
    assert_eq!(template.required_agents, vec!["regulatory-analyst".to_string()]);
}

// ---------------------------------------------------------------------------
// Metrics correlate activity across all components
// ---------------------------------------------------------------------------

#[test]
fn metrics_track_a_full_agent_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MemoryConfig::default();

    let decisions = DecisionMemory::open(dir.path(), &config).expect("open");
    let preferences = PreferenceMemory::open(dir.path(), &config).expect("open");
    let patterns = PatternMemory::open(dir.path(), &config).expect("open");
    let metrics = MetricsTracker::open(dir.path(), &config).expect("open");

    metrics.start_session().expect("metrics");

    decisions
        .store(NewDecision {
            decision: "IVDR class B self-certification is not permitted".to_string(),
            rationale: "Notified body involvement required from class B upward".to_string(),
            ..NewDecision::default()
        })
        .expect("store");
    metrics.track_decision_storage().expect("metrics");

    let results = decisions.search("class b", "default", None, 0.1);
    assert_eq!(results.len(), 1);
    metrics.track_decision_access().expect("metrics");
    metrics
        .track_decision_feedback(DecisionFeedback::Relevant)
        .expect("metrics");

    preferences
        .extract("acme", "formatting", "language", json!("de"), None)
        .expect("extract");
    metrics.track_preference_extraction().expect("metrics");

    let mut session = TaskSession::new();
    for _ in 0..3 {
        patterns
            .track(&mut session, "ivdr review", steps(&["classify", "review"]))
            .expect("track");
    }
    metrics.track_pattern_learned().expect("metrics");

    let adoption = metrics.adoption_summary();
    assert_eq!(adoption.unique_sessions, 1);
    assert_eq!(adoption.feature_usage.regulatory_decisions.access_count, 1);
    assert_eq!(
        adoption.feature_usage.regulatory_decisions.contribution_count,
        1
    );
    assert_eq!(
        adoption.feature_usage.company_preferences.contribution_count,
        1
    );

    let progress = metrics.learning_progress();
    assert_eq!(progress.learning.decisions_stored, 1);
    assert_eq!(progress.learning.preferences_extracted, 1);
    assert_eq!(progress.learning.new_patterns_learned, 1);

    let summary = metrics.effectiveness_summary();
    assert!((summary.decision_relevance_rate - 1.0).abs() < f32::EPSILON);

    // Each component owns its own file under the shared directory.
    assert!(dir.path().join("regulatory-decisions.json").exists());
    assert!(dir.path().join("company-preferences.json").exists());
    assert!(dir.path().join("task-patterns.json").exists());
    assert!(dir.path().join("learning-metrics.json").exists());
}
