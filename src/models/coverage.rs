use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dod::{Requiredness, SatisfactionPolicy};
use super::fact::{AnswerKind, Evidence};

/// How far a requirement slot is from being satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Missing,
    Partial,
    Complete,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Partial => "partial",
            Self::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "missing" => Some(Self::Missing),
            "partial" => Some(Self::Partial),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }

    /// Points contributed to the coverage score.
    pub fn points(&self) -> f64 {
        match self {
            Self::Complete => 1.0,
            Self::Partial => 0.5,
            Self::Missing => 0.0,
        }
    }
}

/// The best fact backing one slot, as shown in coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSlotFact {
    pub slot_id: String,
    pub value_text: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// A question that would move a section forward if answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageQuestion {
    pub id: String,
    pub section_id: String,
    pub prompt: String,
    pub fact_ids: Vec<String>,
    pub answer_kind: AnswerKind,
}

/// One checklist line within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageItem {
    pub id: String,
    pub label: String,
    pub fact_ids: Vec<String>,
    pub satisfied: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_applicable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requiredness: Option<Requiredness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction_policy: Option<SatisfactionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Coverage for a single proposal section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSlot {
    pub id: String,
    pub label: String,
    pub status: CoverageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub facts: Vec<CoverageSlotFact>,
    #[serde(default)]
    pub missing_fact_slot_ids: Vec<String>,
    #[serde(default)]
    pub items: Vec<CoverageItem>,
    #[serde(default)]
    pub questions: Vec<CoverageQuestion>,
    /// Relative importance when ranking suggestions. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl CoverageSlot {
    pub fn new(id: impl Into<String>, label: impl Into<String>, status: CoverageStatus) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status,
            notes: None,
            facts: Vec::new(),
            missing_fact_slot_ids: Vec::new(),
            items: Vec::new(),
            questions: Vec::new(),
            weight: None,
        }
    }
}

/// A scored view of every section at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    pub score: f64,
    pub summary: String,
    pub slots: Vec<CoverageSlot>,
    /// Set when the score was weighted from a discovered checklist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<RequirementTally>,
    pub updated_at: DateTime<Utc>,
}

/// Must and should requirement counts behind a discovered checklist's score.
/// N/A must slots are excluded from `must_active`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementTally {
    pub must_active: usize,
    pub must_satisfied: usize,
    pub should_total: usize,
    pub should_satisfied: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixNextKind {
    Question,
    Tighten,
    Export,
}

impl FixNextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Tighten => "tighten",
            Self::Export => "export",
        }
    }
}

/// The single next action surfaced to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixNextSuggestion {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub kind: FixNextKind,
}

impl FixNextSuggestion {
    pub fn is_export(&self) -> bool {
        self.kind == FixNextKind::Export
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    Upload,
    Answer,
    Draft,
}

/// A ranked candidate action, scored by value over effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub id: String,
    pub requirement_id: String,
    pub action: FixAction,
    pub label: String,
    pub value_score: f64,
    pub effort_score: f64,
    pub ratio: f64,
}

/// Response body for coverage endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageResponse {
    pub coverage: CoverageSnapshot,
    pub fix_next: FixNextSuggestion,
    pub suggestions: Vec<FixSuggestion>,
}
