//! Confidence-threshold classification of fact slots.

use crate::facts::FactsBySlot;
use crate::models::{CoverageSlotFact, CoverageStatus, RfpFact};

/// Facts at or above this confidence count toward completion.
pub const HIGH_CONFIDENCE: f64 = 0.8;
/// Facts at or above this confidence (but below high) count toward partial.
pub const MEDIUM_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct FactStatus {
    pub status: CoverageStatus,
    pub facts: Vec<CoverageSlotFact>,
    pub missing_slots: Vec<String>,
}

/// Highest-confidence fact for a slot. Ties keep the earlier fact.
pub fn best_fact<'a>(facts_by_slot: &'a FactsBySlot, slot_id: &str) -> Option<&'a RfpFact> {
    facts_by_slot.get(slot_id)?.iter().fold(None, |best, fact| match best {
        Some(current) if current.confidence >= fact.confidence => Some(current),
        _ => Some(fact),
    })
}

/// Classify a group of slots by the confidence of their best facts.
///
/// `partial_threshold` is how many slots need at least medium confidence for
/// `Partial`; `complete_threshold` is how many need high confidence for
/// `Complete`. They default to `min(1, n)` and `n` respectively.
pub fn evaluate_fact_status<S: AsRef<str>>(
    slot_ids: &[S],
    partial_threshold: Option<usize>,
    complete_threshold: Option<usize>,
    facts_by_slot: &FactsBySlot,
) -> FactStatus {
    if slot_ids.is_empty() {
        return FactStatus {
            status: CoverageStatus::Missing,
            facts: Vec::new(),
            missing_slots: Vec::new(),
        };
    }

    let all_slots: Vec<String> = slot_ids.iter().map(|s| s.as_ref().to_string()).collect();

    let facts: Vec<CoverageSlotFact> = all_slots
        .iter()
        .filter_map(|slot_id| {
            best_fact(facts_by_slot, slot_id).map(|best| CoverageSlotFact {
                slot_id: slot_id.clone(),
                value_text: best.value_text.clone(),
                confidence: best.confidence,
                evidence: best.evidence.clone(),
                verified: None,
            })
        })
        .collect();

    if facts.is_empty() {
        return FactStatus {
            status: CoverageStatus::Missing,
            facts,
            missing_slots: all_slots,
        };
    }

    let high = facts
        .iter()
        .filter(|f| f.confidence >= HIGH_CONFIDENCE)
        .count();
    let medium = facts
        .iter()
        .filter(|f| f.confidence >= MEDIUM_CONFIDENCE && f.confidence < HIGH_CONFIDENCE)
        .count();
    let required_partial = partial_threshold.unwrap_or_else(|| all_slots.len().min(1));
    let required_complete = complete_threshold.unwrap_or(all_slots.len());

    let missing_slots: Vec<String> = all_slots
        .iter()
        .filter(|slot_id| !facts.iter().any(|f| &f.slot_id == *slot_id))
        .cloned()
        .collect();

    if required_complete > 0 && high >= required_complete {
        return FactStatus {
            status: CoverageStatus::Complete,
            facts,
            missing_slots,
        };
    }

    if required_partial > 0 && high + medium >= required_partial {
        return FactStatus {
            status: CoverageStatus::Partial,
            facts,
            missing_slots,
        };
    }

    FactStatus {
        status: CoverageStatus::Missing,
        facts,
        missing_slots: all_slots,
    }
}
