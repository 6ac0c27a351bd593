//! Coverage scoring: which requirement slots are satisfied, and what to do next.
//!
//! Coverage is computed per section, either against the built-in
//! [`catalog`] or against a checklist discovered from the RFP
//! ([`discovered`]). Each section ends up `missing`, `partial` or
//! `complete`; the snapshot score averages those at 0 / 0.5 / 1.

pub mod catalog;
mod discovered;
mod fix_next;
mod status;

use std::collections::HashMap;

use chrono::Utc;

pub use discovered::{create_coverage_from_dod, DodCoverage};
pub use fix_next::{rank_fix_suggestions, select_fix_next};
pub use status::{best_fact, evaluate_fact_status, FactStatus, HIGH_CONFIDENCE, MEDIUM_CONFIDENCE};

use crate::facts::{is_marked_na, FactsBySlot};
use crate::models::{CoverageItem, CoverageQuestion, CoverageSlot, CoverageSnapshot, CoverageStatus};

/// Questions surfaced per section.
pub const MAX_QUESTIONS_PER_SECTION: usize = 3;

const DEFAULT_SUMMARY: &str = "Tracking active RFP sections.";

/// Section id to the status recorded on its draft.
pub type DraftStatuses = HashMap<String, CoverageStatus>;

pub fn compute_coverage_score(slots: &[CoverageSlot]) -> f64 {
    if slots.is_empty() {
        return 0.0;
    }
    let points: f64 = slots.iter().map(|slot| slot.status.points()).sum();
    (points / slots.len() as f64).min(1.0)
}

pub fn create_snapshot(slots: Vec<CoverageSlot>, summary: Option<String>) -> CoverageSnapshot {
    CoverageSnapshot {
        score: compute_coverage_score(&slots),
        summary: summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        slots,
        requirements: None,
        updated_at: Utc::now(),
    }
}

/// One-line human summary of a set of section statuses.
pub fn summarize(slots: &[CoverageSlot]) -> String {
    if slots.is_empty() {
        return "No sections detected yet. Share the solicitation to build the map.".to_string();
    }
    let complete = slots
        .iter()
        .filter(|s| s.status == CoverageStatus::Complete)
        .count();
    let partial = slots
        .iter()
        .filter(|s| s.status == CoverageStatus::Partial)
        .count();
    format!(
        "{} of {} sections complete, {} in progress.",
        complete,
        slots.len(),
        partial
    )
}

/// A drafted section can lift its status: a complete draft completes the
/// section, a partial draft lifts `missing` to `partial`. Drafts never lower it.
pub fn apply_draft_status(status: CoverageStatus, draft: Option<CoverageStatus>) -> CoverageStatus {
    match draft {
        Some(CoverageStatus::Complete) => CoverageStatus::Complete,
        Some(CoverageStatus::Partial) if status == CoverageStatus::Missing => {
            CoverageStatus::Partial
        }
        _ => status,
    }
}

/// Coverage for every catalog section.
pub fn build_catalog_coverage(facts_by_slot: &FactsBySlot, drafts: &DraftStatuses) -> Vec<CoverageSlot> {
    catalog::SECTIONS
        .iter()
        .map(|section| {
            let fact_ids = section.fact_ids();
            let evaluation =
                evaluate_fact_status(&fact_ids, Some(1), Some(fact_ids.len()), facts_by_slot);
            let status = apply_draft_status(
                evaluation.status,
                drafts.get(section.id).copied(),
            );

            let items: Vec<CoverageItem> = section
                .items
                .iter()
                .map(|item| {
                    let bests: Vec<_> = item
                        .fact_ids
                        .iter()
                        .map(|id| best_fact(facts_by_slot, id))
                        .collect();
                    let satisfied = bests
                        .iter()
                        .all(|best| best.map(|f| f.confidence >= HIGH_CONFIDENCE).unwrap_or(false));
                    let not_applicable = bests
                        .iter()
                        .any(|best| best.map(is_marked_na).unwrap_or(false));
                    CoverageItem {
                        id: item.id.to_string(),
                        label: item.label.to_string(),
                        fact_ids: item.fact_ids.iter().map(|s| s.to_string()).collect(),
                        satisfied,
                        not_applicable,
                        requiredness: None,
                        satisfaction_policy: None,
                        condition: None,
                    }
                })
                .collect();

            let questions: Vec<CoverageQuestion> = if status == CoverageStatus::Complete {
                Vec::new()
            } else {
                section
                    .items
                    .iter()
                    .zip(items.iter())
                    .filter(|(_, item)| !item.satisfied)
                    .take(MAX_QUESTIONS_PER_SECTION)
                    .map(|(definition, _)| CoverageQuestion {
                        id: format!("{}-{}", section.id, definition.id),
                        section_id: section.id.to_string(),
                        prompt: definition.question.to_string(),
                        fact_ids: definition.fact_ids.iter().map(|s| s.to_string()).collect(),
                        answer_kind: definition.answer_kind,
                    })
                    .collect()
            };

            CoverageSlot {
                id: section.id.to_string(),
                label: section.label.to_string(),
                status,
                notes: Some(section.description.to_string()),
                facts: evaluation.facts,
                missing_fact_slot_ids: evaluation.missing_slots,
                items,
                questions,
                weight: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::group_by_slot;
    use crate::models::{FactOrigin, RfpFact};
    use uuid::Uuid;

    fn fact(slot_id: &str, confidence: f64) -> RfpFact {
        RfpFact {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            slot_id: slot_id.to_string(),
            value_text: "value".to_string(),
            value_json: None,
            confidence,
            evidence: None,
            hash: Uuid::new_v4().to_string(),
            origin: FactOrigin::Ingested,
            annotations: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn score_weights_partial_as_half() {
        let slots = vec![
            CoverageSlot::new("a", "A", CoverageStatus::Complete),
            CoverageSlot::new("b", "B", CoverageStatus::Partial),
            CoverageSlot::new("c", "C", CoverageStatus::Missing),
            CoverageSlot::new("d", "D", CoverageStatus::Missing),
        ];
        assert!((compute_coverage_score(&slots) - 0.375).abs() < 1e-9);
    }

    #[test]
    fn score_of_no_slots_is_zero() {
        assert_eq!(compute_coverage_score(&[]), 0.0);
    }

    #[test]
    fn snapshot_uses_default_summary() {
        let snapshot = create_snapshot(vec![], None);
        assert_eq!(snapshot.summary, "Tracking active RFP sections.");
        assert_eq!(snapshot.score, 0.0);
    }

    #[test]
    fn drafts_lift_but_never_lower_status() {
        use CoverageStatus::*;
        assert_eq!(apply_draft_status(Missing, Some(Complete)), Complete);
        assert_eq!(apply_draft_status(Missing, Some(Partial)), Partial);
        assert_eq!(apply_draft_status(Complete, Some(Partial)), Complete);
        assert_eq!(apply_draft_status(Partial, Some(Missing)), Partial);
        assert_eq!(apply_draft_status(Partial, None), Partial);
    }

    #[test]
    fn empty_session_has_every_section_missing_with_questions() {
        let slots = build_catalog_coverage(&FactsBySlot::new(), &DraftStatuses::new());
        assert_eq!(slots.len(), catalog::SECTIONS.len());
        assert!(slots.iter().all(|s| s.status == CoverageStatus::Missing));
        assert_eq!(slots[0].questions.len(), 3);
        assert_eq!(slots[0].questions[0].id, "rfp-overview-solicitation_title");
    }

    #[test]
    fn overview_needs_all_three_facts_at_high_confidence() {
        let facts = group_by_slot(vec![fact("rfp.title", 0.9), fact("rfp.deadline", 0.85)]);
        let slots = build_catalog_coverage(&facts, &DraftStatuses::new());
        let overview = &slots[0];
        assert_eq!(overview.status, CoverageStatus::Partial);
        assert_eq!(overview.questions.len(), 1);
        assert_eq!(overview.questions[0].fact_ids, vec!["rfp.portal"]);

        let facts = group_by_slot(vec![
            fact("rfp.title", 0.9),
            fact("rfp.deadline", 0.85),
            fact("rfp.portal", 0.81),
        ]);
        let slots = build_catalog_coverage(&facts, &DraftStatuses::new());
        assert_eq!(slots[0].status, CoverageStatus::Complete);
        assert!(slots[0].questions.is_empty());
    }

    #[test]
    fn complete_draft_completes_a_section_without_facts() {
        let mut drafts = DraftStatuses::new();
        drafts.insert("budget".to_string(), CoverageStatus::Complete);
        let slots = build_catalog_coverage(&FactsBySlot::new(), &drafts);
        let budget = slots.iter().find(|s| s.id == "budget").unwrap();
        assert_eq!(budget.status, CoverageStatus::Complete);
        assert!(budget.questions.is_empty());
    }

    #[test]
    fn summary_counts_statuses() {
        let slots = vec![
            CoverageSlot::new("a", "A", CoverageStatus::Complete),
            CoverageSlot::new("b", "B", CoverageStatus::Partial),
        ];
        assert_eq!(summarize(&slots), "1 of 2 sections complete, 1 in progress.");
    }
}
