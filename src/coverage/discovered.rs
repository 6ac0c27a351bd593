//! Coverage against a checklist discovered from the RFP.

use std::collections::HashSet;

use chrono::Utc;

use super::{apply_draft_status, summarize, DraftStatuses, MAX_QUESTIONS_PER_SECTION};
use crate::facts::{is_marked_na, is_verified, FactsBySlot};
use crate::models::{
    AnswerKind, CoverageItem, CoverageQuestion, CoverageSlot, CoverageSlotFact, CoverageSnapshot,
    CoverageStatus, DiscoveredDod, DiscoveredSlot, RequirementTally, RfpFact, SatisfactionPolicy,
    SlotType,
};

/// Facts shown per discovered slot.
const FACTS_PER_SLOT: usize = 2;
/// Without a verified citation, an evidence-only slot is partial at this confidence.
const UNVERIFIED_PARTIAL_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct DodCoverage {
    pub slots: Vec<CoverageSlot>,
    pub weighted_score: f64,
    pub must_active: usize,
    pub must_satisfied: usize,
    pub should_total: usize,
    pub should_satisfied: usize,
}

impl DodCoverage {
    pub fn tally(&self) -> RequirementTally {
        RequirementTally {
            must_active: self.must_active,
            must_satisfied: self.must_satisfied,
            should_total: self.should_total,
            should_satisfied: self.should_satisfied,
        }
    }

    /// Snapshot scored by the weighted requirement score rather than
    /// section points.
    pub fn into_snapshot(self) -> CoverageSnapshot {
        let requirements = self.tally();
        CoverageSnapshot {
            score: self.weighted_score,
            summary: summarize(&self.slots),
            slots: self.slots,
            requirements: Some(requirements),
            updated_at: Utc::now(),
        }
    }
}

struct SlotEvaluation<'a> {
    slot: &'a DiscoveredSlot,
    facts: Vec<CoverageSlotFact>,
    status: CoverageStatus,
    satisfied: bool,
    not_applicable: bool,
    needs_citation: bool,
}

fn answer_kind(slot_type: SlotType) -> AnswerKind {
    match slot_type {
        SlotType::Date => AnswerKind::Date,
        SlotType::File | SlotType::Email | SlotType::Url => AnswerKind::Url,
        SlotType::Text | SlotType::Money | SlotType::Enum => AnswerKind::Text,
    }
}

fn to_coverage_facts(facts: &[&RfpFact]) -> Vec<CoverageSlotFact> {
    facts
        .iter()
        .take(FACTS_PER_SLOT)
        .map(|fact| CoverageSlotFact {
            slot_id: fact.slot_id.clone(),
            value_text: fact.value_text.clone(),
            confidence: fact.confidence,
            evidence: fact.evidence.clone(),
            verified: Some(is_verified(fact)),
        })
        .collect()
}

/// Facts filed under the slot id or any alias, strongest first.
fn facts_for_slot<'a>(slot: &DiscoveredSlot, facts_by_slot: &'a FactsBySlot) -> Vec<&'a RfpFact> {
    let mut facts: Vec<&RfpFact> = std::iter::once(&slot.slot_id)
        .chain(slot.aliases.iter())
        .filter_map(|id| facts_by_slot.get(id))
        .flatten()
        .collect();
    facts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    facts
}

fn evaluate_slot<'a>(slot: &'a DiscoveredSlot, facts: &[&RfpFact]) -> SlotEvaluation<'a> {
    if let Some(na) = facts.iter().find(|fact| is_marked_na(fact)) {
        return SlotEvaluation {
            slot,
            facts: to_coverage_facts(&[*na]),
            status: CoverageStatus::Complete,
            satisfied: true,
            not_applicable: true,
            needs_citation: false,
        };
    }

    let ordered: Vec<&RfpFact> = facts.iter().copied().filter(|f| !is_marked_na(f)).collect();
    let coverage_facts = to_coverage_facts(&ordered);
    let has_facts = !ordered.is_empty();
    let has_verified = coverage_facts.iter().any(|f| f.verified == Some(true));
    let top_confidence = ordered.first().map(|f| f.confidence).unwrap_or(0.0);

    let mut status = CoverageStatus::Missing;
    let mut satisfied = false;
    let mut needs_citation = false;

    if has_facts {
        match slot.satisfaction_policy {
            SatisfactionPolicy::RequiresEvidence => {
                if has_verified {
                    status = CoverageStatus::Complete;
                    satisfied = true;
                } else {
                    status = if top_confidence >= UNVERIFIED_PARTIAL_CONFIDENCE {
                        CoverageStatus::Partial
                    } else {
                        CoverageStatus::Missing
                    };
                    needs_citation = true;
                }
            }
            SatisfactionPolicy::Either => {
                status = CoverageStatus::Complete;
                satisfied = true;
                needs_citation = !has_verified;
            }
            SatisfactionPolicy::UserAffirmationOk => {
                status = CoverageStatus::Complete;
                satisfied = true;
            }
        }
    } else if slot.satisfaction_policy == SatisfactionPolicy::RequiresEvidence {
        needs_citation = true;
    }

    SlotEvaluation {
        slot,
        facts: coverage_facts,
        status,
        satisfied,
        not_applicable: false,
        needs_citation,
    }
}

/// Score a discovered checklist.
///
/// The weighted score counts must (and conditional) slots fully and should
/// slots at half weight; slots marked N/A drop out of the must total.
pub fn create_coverage_from_dod(
    dod: &DiscoveredDod,
    facts_by_slot: &FactsBySlot,
    drafts: &DraftStatuses,
) -> DodCoverage {
    let mut slots = Vec::with_capacity(dod.sections.len());
    let mut must_active = 0;
    let mut must_satisfied = 0;
    let mut should_total = 0;
    let mut should_satisfied = 0;

    for section in &dod.sections {
        let evaluations: Vec<SlotEvaluation> = section
            .slots
            .iter()
            .map(|slot| evaluate_slot(slot, &facts_for_slot(slot, facts_by_slot)))
            .collect();

        let mut facts = Vec::new();
        let mut items = Vec::with_capacity(evaluations.len());
        let mut missing = Vec::new();
        let mut seen_missing = HashSet::new();
        let mut questions = Vec::new();

        for evaluation in &evaluations {
            facts.extend(evaluation.facts.iter().cloned());
            items.push(CoverageItem {
                id: evaluation.slot.slot_id.clone(),
                label: evaluation.slot.label.clone(),
                fact_ids: vec![evaluation.slot.slot_id.clone()],
                satisfied: evaluation.satisfied,
                not_applicable: evaluation.not_applicable,
                requiredness: Some(evaluation.slot.requiredness),
                satisfaction_policy: Some(evaluation.slot.satisfaction_policy),
                condition: evaluation.slot.condition.clone(),
            });

            if evaluation.slot.requiredness.is_must() {
                if !evaluation.not_applicable {
                    must_active += 1;
                    if evaluation.satisfied {
                        must_satisfied += 1;
                    }
                }
            } else {
                should_total += 1;
                if evaluation.satisfied {
                    should_satisfied += 1;
                }
            }

            if !evaluation.satisfied || evaluation.needs_citation {
                if seen_missing.insert(evaluation.slot.slot_id.clone()) {
                    missing.push(evaluation.slot.slot_id.clone());
                }
                let prompt = if evaluation.needs_citation {
                    format!("Add a cited answer for {}.", evaluation.slot.label)
                } else {
                    format!("Provide {}.", evaluation.slot.label)
                };
                questions.push(CoverageQuestion {
                    id: format!("{}-{}", section.id, evaluation.slot.slot_id),
                    section_id: section.id.clone(),
                    prompt,
                    fact_ids: vec![evaluation.slot.slot_id.clone()],
                    answer_kind: answer_kind(evaluation.slot.slot_type),
                });
            }
        }

        let musts: Vec<&SlotEvaluation> = evaluations
            .iter()
            .filter(|e| e.slot.requiredness.is_must())
            .collect();
        let musts_done = musts.iter().filter(|e| e.satisfied || e.not_applicable).count();
        let musts_live = musts.iter().filter(|e| !e.not_applicable).count();
        let partial_must = musts.iter().any(|e| e.status == CoverageStatus::Partial);
        let any_progress = evaluations
            .iter()
            .any(|e| e.satisfied || e.status == CoverageStatus::Partial);

        let status = if musts_live > 0 && musts_done == musts_live && !partial_must {
            CoverageStatus::Complete
        } else if any_progress {
            CoverageStatus::Partial
        } else {
            CoverageStatus::Missing
        };

        questions.truncate(MAX_QUESTIONS_PER_SECTION);
        slots.push(CoverageSlot {
            id: section.id.clone(),
            label: section.label.clone(),
            status: apply_draft_status(status, drafts.get(&section.id).copied()),
            notes: None,
            facts,
            missing_fact_slot_ids: missing,
            items,
            questions,
            weight: None,
        });
    }

    let denominator = must_active as f64 + should_total as f64 * 0.5;
    let weighted_score = if denominator > 0.0 {
        ((must_satisfied as f64 + should_satisfied as f64 * 0.5) / denominator).min(1.0)
    } else {
        0.0
    };

    DodCoverage {
        slots,
        weighted_score,
        must_active,
        must_satisfied,
        should_total,
        should_satisfied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::group_by_slot;
    use crate::models::{DiscoveredSection, Evidence, FactOrigin, Requiredness};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn slot(id: &str, requiredness: Requiredness, policy: SatisfactionPolicy) -> DiscoveredSlot {
        DiscoveredSlot {
            slot_id: id.to_string(),
            label: id.to_uppercase(),
            requiredness,
            slot_type: SlotType::Text,
            condition: None,
            evidence: vec![],
            satisfaction_policy: policy,
            aliases: vec![],
        }
    }

    fn fact(slot_id: &str, confidence: f64, value: &str, evidence: Option<Evidence>) -> RfpFact {
        RfpFact {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            slot_id: slot_id.to_string(),
            value_text: value.to_string(),
            value_json: None,
            confidence,
            evidence,
            hash: Uuid::new_v4().to_string(),
            origin: FactOrigin::Ingested,
            annotations: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cited() -> Option<Evidence> {
        Some(Evidence {
            snippet: Some("Proposals are due March 1".to_string()),
            ..Default::default()
        })
    }

    fn dod(slots: Vec<DiscoveredSlot>) -> DiscoveredDod {
        DiscoveredDod {
            version: 1,
            sections: vec![DiscoveredSection {
                id: "submission".to_string(),
                label: "Submission".to_string(),
                order: None,
                evidence: vec![],
                slots,
            }],
        }
    }

    #[test]
    fn evidence_slot_without_citation_is_partial_and_asks_for_one() {
        let checklist = dod(vec![slot("deadline", Requiredness::Must, SatisfactionPolicy::RequiresEvidence)]);
        let facts = group_by_slot(vec![fact("deadline", 0.7, "March 1", None)]);
        let result = create_coverage_from_dod(&checklist, &facts, &DraftStatuses::new());

        let section = &result.slots[0];
        assert_eq!(section.status, CoverageStatus::Partial);
        assert_eq!(section.questions[0].prompt, "Add a cited answer for DEADLINE.");
        assert_eq!(result.must_active, 1);
        assert_eq!(result.must_satisfied, 0);
        assert_eq!(result.weighted_score, 0.0);
    }

    #[test]
    fn evidence_slot_with_citation_is_complete() {
        let checklist = dod(vec![slot("deadline", Requiredness::Must, SatisfactionPolicy::RequiresEvidence)]);
        let facts = group_by_slot(vec![fact("deadline", 0.7, "March 1", cited())]);
        let result = create_coverage_from_dod(&checklist, &facts, &DraftStatuses::new());

        assert_eq!(result.slots[0].status, CoverageStatus::Complete);
        assert!(result.slots[0].questions.is_empty());
        assert_eq!(result.weighted_score, 1.0);
    }

    #[test]
    fn not_applicable_must_drops_out_of_the_total() {
        let checklist = dod(vec![
            slot("match", Requiredness::Must, SatisfactionPolicy::RequiresEvidence),
            slot("narrative", Requiredness::Must, SatisfactionPolicy::UserAffirmationOk),
        ]);
        let mut na = fact("match", 0.95, "N/A", None);
        na.annotations = Some(json!({ "na": true }));
        let facts = group_by_slot(vec![na, fact("narrative", 0.95, "We build things", None)]);

        let result = create_coverage_from_dod(&checklist, &facts, &DraftStatuses::new());
        assert_eq!(result.must_active, 1);
        assert_eq!(result.must_satisfied, 1);
        assert_eq!(result.slots[0].status, CoverageStatus::Complete);
        assert!(result.slots[0].items[0].not_applicable);
    }

    #[test]
    fn should_slots_count_half() {
        let checklist = dod(vec![
            slot("a", Requiredness::Must, SatisfactionPolicy::UserAffirmationOk),
            slot("b", Requiredness::Should, SatisfactionPolicy::UserAffirmationOk),
        ]);
        let facts = group_by_slot(vec![fact("b", 0.9, "yes", None)]);
        let result = create_coverage_from_dod(&checklist, &facts, &DraftStatuses::new());

        assert_eq!(result.should_total, 1);
        assert_eq!(result.should_satisfied, 1);
        assert!((result.weighted_score - 0.5 / 1.5).abs() < 1e-9);
        assert_eq!(result.slots[0].status, CoverageStatus::Partial);
    }

    #[test]
    fn either_policy_completes_but_still_requests_citation() {
        let checklist = dod(vec![slot("goal", Requiredness::Must, SatisfactionPolicy::Either)]);
        let facts = group_by_slot(vec![fact("goal", 0.6, "Reduce costs", None)]);
        let result = create_coverage_from_dod(&checklist, &facts, &DraftStatuses::new());

        assert_eq!(result.slots[0].status, CoverageStatus::Complete);
        assert_eq!(result.slots[0].missing_fact_slot_ids, vec!["goal"]);
        assert_eq!(result.slots[0].questions.len(), 1);
    }

    #[test]
    fn aliases_resolve_to_the_canonical_slot() {
        let mut s = slot("submission.deadline-abc123", Requiredness::Must, SatisfactionPolicy::UserAffirmationOk);
        s.aliases = vec!["rfp.deadline".to_string()];
        let facts = group_by_slot(vec![fact("rfp.deadline", 0.9, "March 1", None)]);
        let result = create_coverage_from_dod(&dod(vec![s]), &facts, &DraftStatuses::new());
        assert_eq!(result.slots[0].status, CoverageStatus::Complete);
    }

    #[test]
    fn empty_checklist_scores_zero() {
        let result = create_coverage_from_dod(
            &DiscoveredDod { version: 1, sections: vec![] },
            &FactsBySlot::new(),
            &DraftStatuses::new(),
        );
        assert!(result.slots.is_empty());
        assert_eq!(result.weighted_score, 0.0);
    }
}
