use super::catalog;
use crate::models::{
    CoverageSlot, CoverageSnapshot, CoverageStatus, FixAction, FixNextKind, FixNextSuggestion,
    FixSuggestion,
};

const ACTION_KEYWORDS: &[(&str, FixAction, &str)] = &[
    ("bio", FixAction::Upload, "Upload team bios"),
    ("budget", FixAction::Answer, "Add budget summary"),
    ("commercialization", FixAction::Draft, "Describe commercialization plan"),
    ("narrative", FixAction::Draft, "Draft project narrative"),
];

fn export_suggestion() -> FixNextSuggestion {
    FixNextSuggestion {
        id: "export".to_string(),
        label: "Export a DOCX draft".to_string(),
        description: Some("Everything is mapped. Generate a downloadable draft.".to_string()),
        kind: FixNextKind::Export,
    }
}

/// Pick the next question to ask, in catalog priority order.
///
/// Sections outside the catalog sort after it, by label. When no section has
/// an open question the suggestion is to export.
pub fn select_fix_next(coverage: &CoverageSnapshot) -> FixNextSuggestion {
    let mut ordered: Vec<&CoverageSlot> = coverage.slots.iter().collect();
    ordered.sort_by(|a, b| {
        let pa = catalog::priority(&a.id).unwrap_or(usize::MAX);
        let pb = catalog::priority(&b.id).unwrap_or(usize::MAX);
        pa.cmp(&pb).then_with(|| a.label.cmp(&b.label))
    });

    ordered
        .into_iter()
        .filter(|slot| slot.status != CoverageStatus::Complete)
        .find_map(|slot| {
            slot.questions.first().map(|question| FixNextSuggestion {
                id: slot.id.clone(),
                label: question.prompt.clone(),
                description: Some(format!("Resolve {} to keep drafting moving.", slot.label)),
                kind: FixNextKind::Question,
            })
        })
        .unwrap_or_else(export_suggestion)
}

fn infer_action(requirement_id: &str) -> (FixAction, &'static str) {
    let lower = requirement_id.to_lowercase();
    ACTION_KEYWORDS
        .iter()
        .find(|(keyword, _, _)| lower.contains(keyword))
        .map(|(_, action, label)| (*action, *label))
        .unwrap_or((FixAction::Draft, "Draft missing content"))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Rank open sections by value over effort.
///
/// Value grows with the section weight and with how much cited evidence is
/// already attached; missing sections are worth twice partial ones but cost
/// more to close.
pub fn rank_fix_suggestions(coverage: &CoverageSnapshot) -> Vec<FixSuggestion> {
    let mut suggestions: Vec<FixSuggestion> = coverage
        .slots
        .iter()
        .filter(|slot| slot.status != CoverageStatus::Complete)
        .map(|slot| {
            let (action, label) = infer_action(&slot.id);
            let weight = slot.weight.unwrap_or(1.0);
            let evidence_rank = slot
                .facts
                .iter()
                .filter(|fact| fact.evidence.as_ref().is_some_and(|e| e.is_provided()))
                .count() as f64;
            let (status_weight, effort) = match slot.status {
                CoverageStatus::Missing => (1.0, 0.6),
                _ => (0.5, 0.4),
            };
            let value = weight * (1.0 + evidence_rank) * status_weight;
            FixSuggestion {
                id: format!("fix-{}", slot.id),
                requirement_id: slot.id.clone(),
                action,
                label: label.to_string(),
                value_score: round3(value),
                effort_score: round3(effort),
                ratio: round3(value / effort),
            }
        })
        .collect();

    suggestions.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    suggestions
}
