use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How strongly the solicitation demands a slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Requiredness {
    Must,
    Should,
    Conditional,
}

impl Requiredness {
    /// Must and conditional slots both count against the must total.
    pub fn is_must(&self) -> bool {
        matches!(self, Self::Must | Self::Conditional)
    }
}

/// What it takes for a slot to count as satisfied.
///
/// - `RequiresEvidence`: only a verified, cited fact satisfies it
/// - `UserAffirmationOk`: any fact, including a bare user answer
/// - `Either`: any fact, but a citation is still requested when unverified
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SatisfactionPolicy {
    RequiresEvidence,
    UserAffirmationOk,
    Either,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    #[default]
    Text,
    Date,
    Money,
    Enum,
    File,
    Email,
    Url,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Date => "date",
            Self::Money => "money",
            Self::Enum => "enum",
            Self::File => "file",
            Self::Email => "email",
            Self::Url => "url",
        }
    }
}

/// A pointer back into the RFP supporting a discovered requirement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceAnchor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSlot {
    pub slot_id: String,
    pub label: String,
    pub requiredness: Requiredness,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceAnchor>,
    pub satisfaction_policy: SatisfactionPolicy,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSection {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default)]
    pub evidence: Vec<EvidenceAnchor>,
    pub slots: Vec<DiscoveredSlot>,
}

/// A checklist derived from the RFP itself rather than the built-in catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDod {
    pub version: i64,
    pub sections: Vec<DiscoveredSection>,
}

/// A stored discovered checklist and the source set it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DodRecord {
    pub session_id: Uuid,
    pub version: i64,
    pub dod: DiscoveredDod,
    pub sources_signature: String,
    pub model_id: String,
    pub created_job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of a source file for change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub id: String,
    pub name: String,
    pub bytes: i64,
}
