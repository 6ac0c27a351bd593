//! Built-in proposal checklist and the RFP fact slots that feed it.
//!
//! Section order doubles as fix-next priority: earlier sections are asked
//! about first.

use crate::models::AnswerKind;

/// A proposal section and the facts that define "done" for it.
#[derive(Debug, Clone, Copy)]
pub struct SectionDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub items: &'static [ItemDefinition],
}

impl SectionDefinition {
    /// Every fact slot referenced by this section's items, in item order.
    pub fn fact_ids(&self) -> Vec<&'static str> {
        self.items
            .iter()
            .flat_map(|item| item.fact_ids.iter().copied())
            .collect()
    }
}

/// One checklist line with the question the coach asks to fill it.
#[derive(Debug, Clone, Copy)]
pub struct ItemDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub fact_ids: &'static [&'static str],
    pub question: &'static str,
    pub answer_kind: AnswerKind,
}

/// How extracted text for a slot is turned into a structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactParser {
    DateTime,
    Money,
    Text,
}

/// A fact the extractor is asked to find in the RFP.
#[derive(Debug, Clone, Copy)]
pub struct FactSlotDefinition {
    pub slot_id: &'static str,
    pub coverage_id: &'static str,
    pub summary: &'static str,
    pub parser: FactParser,
    pub instruction: &'static str,
}

pub const SECTIONS: &[SectionDefinition] = &[
    SectionDefinition {
        id: "rfp-overview",
        label: "Opportunity overview",
        description: "Lock in title, deadline, portal, and funder basics.",
        items: &[
            ItemDefinition {
                id: "solicitation_title",
                label: "Solicitation title",
                fact_ids: &["rfp.title"],
                question: "What is the official solicitation title?",
                answer_kind: AnswerKind::Text,
            },
            ItemDefinition {
                id: "deadline",
                label: "Submission deadline",
                fact_ids: &["rfp.deadline"],
                question: "When is the proposal due (include time zone)?",
                answer_kind: AnswerKind::Date,
            },
            ItemDefinition {
                id: "portal",
                label: "Submission portal",
                fact_ids: &["rfp.portal"],
                question: "Where do you submit (portal name or URL)?",
                answer_kind: AnswerKind::Url,
            },
        ],
    },
    SectionDefinition {
        id: "eligibility",
        label: "Eligibility & compliance",
        description: "Confirm applicant type, registrations, and compliance checkpoints.",
        items: &[ItemDefinition {
            id: "eligibility_summary",
            label: "Eligibility requirements",
            fact_ids: &["eligibility.summary"],
            question: "Who is eligible and which registrations (SAM/UEI/etc.) are required?",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "project-narrative",
        label: "Project narrative",
        description: "Summarize the problem, solution, beneficiaries, and impact.",
        items: &[ItemDefinition {
            id: "project_focus",
            label: "Project focus",
            fact_ids: &["project.focus"],
            question: "Summarize the project's problem, beneficiaries, and approach.",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "org-capacity",
        label: "Organizational capacity",
        description: "Highlight past performance, facilities, partnerships.",
        items: &[ItemDefinition {
            id: "org_capacity",
            label: "Organizational qualifications",
            fact_ids: &["org.capacity"],
            question: "What experience or capabilities prove your organization can deliver?",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "key-personnel",
        label: "Key personnel",
        description: "Capture key roles, resumes, and effort commitments.",
        items: &[ItemDefinition {
            id: "personnel_requirements",
            label: "Personnel requirements",
            fact_ids: &["personnel.requirements"],
            question: "Who are the key people (roles + short bios) on this proposal?",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "budget",
        label: "Budget & cost share",
        description: "Budget ceiling, match, indirect rates.",
        items: &[
            ItemDefinition {
                id: "budget_cap",
                label: "Budget ceiling",
                fact_ids: &["budget.cap"],
                question: "What is the maximum award or budget cap?",
                answer_kind: AnswerKind::Text,
            },
            ItemDefinition {
                id: "cost_share",
                label: "Cost share / match",
                fact_ids: &["budget.match"],
                question: "Are cost share or match requirements specified?",
                answer_kind: AnswerKind::Text,
            },
        ],
    },
    SectionDefinition {
        id: "timeline",
        label: "Timeline & milestones",
        description: "Phases, milestones, and key dates.",
        items: &[ItemDefinition {
            id: "timeline_requirements",
            label: "Timeline expectations",
            fact_ids: &["timeline.requirements"],
            question: "What major milestones or schedule expectations does the RFP call out?",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "evaluation",
        label: "Evaluation plan",
        description: "Metrics, success criteria, and data sources.",
        items: &[ItemDefinition {
            id: "evaluation_criteria",
            label: "Evaluation criteria",
            fact_ids: &["evaluation.criteria"],
            question: "How will reviewers evaluate proposals (criteria or scoring rubric)?",
            answer_kind: AnswerKind::Text,
        }],
    },
    SectionDefinition {
        id: "appendices",
        label: "Attachments & appendices",
        description: "Required forms, letters, supplements.",
        items: &[ItemDefinition {
            id: "attachments_requirements",
            label: "Required attachments",
            fact_ids: &["appendices.requirements"],
            question: "List required attachments or forms that must be included.",
            answer_kind: AnswerKind::Text,
        }],
    },
];

pub const FACT_SLOTS: &[FactSlotDefinition] = &[
    FactSlotDefinition {
        slot_id: "rfp.title",
        coverage_id: "rfp-overview",
        summary: "Solicitation title",
        parser: FactParser::Text,
        instruction: "Provide the official solicitation or opportunity title exactly as written in the RFP.",
    },
    FactSlotDefinition {
        slot_id: "rfp.deadline",
        coverage_id: "rfp-overview",
        summary: "Application deadline",
        parser: FactParser::DateTime,
        instruction: "Provide the full application deadline including any time zone or time of day, if stated.",
    },
    FactSlotDefinition {
        slot_id: "rfp.portal",
        coverage_id: "rfp-overview",
        summary: "Submission portal",
        parser: FactParser::Text,
        instruction: "Provide the submission portal URL or instructions describing where/how to submit.",
    },
    FactSlotDefinition {
        slot_id: "eligibility.summary",
        coverage_id: "eligibility",
        summary: "Eligibility requirements",
        parser: FactParser::Text,
        instruction: "Summarize applicant eligibility requirements (who can apply, mandatory registrations, key thresholds).",
    },
    FactSlotDefinition {
        slot_id: "project.focus",
        coverage_id: "project-narrative",
        summary: "Project focus",
        parser: FactParser::Text,
        instruction: "Summarize the stated project focus, goals, or priority areas the funder expects.",
    },
    FactSlotDefinition {
        slot_id: "org.capacity",
        coverage_id: "org-capacity",
        summary: "Organizational capacity expectations",
        parser: FactParser::Text,
        instruction: "Capture organizational qualifications or capabilities the RFP calls for.",
    },
    FactSlotDefinition {
        slot_id: "personnel.requirements",
        coverage_id: "key-personnel",
        summary: "Personnel requirements",
        parser: FactParser::Text,
        instruction: "List personnel qualifications, required roles, or staffing expectations mentioned.",
    },
    FactSlotDefinition {
        slot_id: "budget.cap",
        coverage_id: "budget",
        summary: "Budget ceiling",
        parser: FactParser::Money,
        instruction: "State the maximum award amount, budget cap, or ceiling if specified.",
    },
    FactSlotDefinition {
        slot_id: "budget.match",
        coverage_id: "budget",
        summary: "Cost share requirements",
        parser: FactParser::Text,
        instruction: "Describe any cost share, match, or in-kind contribution requirements.",
    },
    FactSlotDefinition {
        slot_id: "timeline.requirements",
        coverage_id: "timeline",
        summary: "Timeline expectations",
        parser: FactParser::Text,
        instruction: "Summarize schedule expectations, period of performance, or milestones required.",
    },
    FactSlotDefinition {
        slot_id: "evaluation.criteria",
        coverage_id: "evaluation",
        summary: "Evaluation criteria",
        parser: FactParser::Text,
        instruction: "List the evaluation criteria or scoring rubric used to assess proposals.",
    },
    FactSlotDefinition {
        slot_id: "appendices.requirements",
        coverage_id: "appendices",
        summary: "Required attachments",
        parser: FactParser::Text,
        instruction: "List required attachments, forms, or appendices that must be submitted.",
    },
    FactSlotDefinition {
        slot_id: "format.page_limit",
        coverage_id: "project-narrative",
        summary: "Formatting constraints",
        parser: FactParser::Text,
        instruction: "Capture any page limits or formatting constraints (font, spacing) for the narrative.",
    },
];

pub fn section(id: &str) -> Option<&'static SectionDefinition> {
    SECTIONS.iter().find(|section| section.id == id)
}

pub fn fact_slot(slot_id: &str) -> Option<&'static FactSlotDefinition> {
    FACT_SLOTS.iter().find(|slot| slot.slot_id == slot_id)
}

/// Position of a catalog section in fix-next order.
pub fn priority(section_id: &str) -> Option<usize> {
    SECTIONS.iter().position(|section| section.id == section_id)
}

/// The coach question and answer kind for a fact slot, if any item asks for it.
pub fn question_for_fact(slot_id: &str) -> Option<(&'static SectionDefinition, &'static ItemDefinition)> {
    SECTIONS.iter().find_map(|section| {
        section
            .items
            .iter()
            .find(|item| item.fact_ids.contains(&slot_id))
            .map(|item| (section, item))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_item_fact_is_an_extraction_slot() {
        for section in SECTIONS {
            for fact_id in section.fact_ids() {
                assert!(fact_slot(fact_id).is_some(), "{} has no slot definition", fact_id);
            }
        }
    }

    #[test]
    fn extraction_slots_point_at_known_sections() {
        for slot in FACT_SLOTS {
            assert!(section(slot.coverage_id).is_some(), "{}", slot.slot_id);
        }
    }

    #[test]
    fn priority_follows_declaration_order() {
        assert_eq!(priority("rfp-overview"), Some(0));
        assert_eq!(priority("appendices"), Some(SECTIONS.len() - 1));
        assert_eq!(priority("nope"), None);
    }

    #[test]
    fn question_lookup_finds_owning_item() {
        let (section, item) = question_for_fact("rfp.deadline").unwrap();
        assert_eq!(section.id, "rfp-overview");
        assert_eq!(item.answer_kind, AnswerKind::Date);
        assert!(question_for_fact("format.page_limit").is_none());
    }
}
