use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured fact about the solicitation, bound to a catalog slot.
///
/// Facts come from two places: extraction over uploaded sources
/// ([`FactOrigin::Ingested`]) and direct answers from the user
/// ([`FactOrigin::User`]). The `hash` is a canonical digest of slot, value,
/// parsed value and evidence, and is unique per session and slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfpFact {
    pub id: Uuid,
    pub session_id: Uuid,
    pub slot_id: String,
    pub value_text: String,
    pub value_json: Option<serde_json::Value>,
    pub confidence: f64,
    pub evidence: Option<Evidence>,
    pub hash: String,
    pub origin: FactOrigin,
    pub annotations: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where in the source material a fact was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source_id: Option<String>,
    pub page: Option<i64>,
    pub snippet: Option<String>,
    pub href: Option<String>,
}

impl Evidence {
    /// True when the evidence names something a reader could check.
    pub fn is_provided(&self) -> bool {
        self.snippet
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
            || self.source_id.is_some()
            || self.href.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FactOrigin {
    Ingested,
    User,
}

impl FactOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::User => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingested" => Some(Self::Ingested),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// The shape of answer a coach question expects.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    #[default]
    Text,
    Date,
    Url,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Date => "date",
            Self::Url => "url",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "date" => Some(Self::Date),
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

/// A fact ready to be written, produced by normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub slot_id: String,
    pub value_text: String,
    pub value_json: Option<serde_json::Value>,
    pub confidence: f64,
    pub evidence: Option<Evidence>,
    pub hash: String,
    pub origin: FactOrigin,
    pub annotations: Option<serde_json::Value>,
}

/// An audit record written whenever a fact is inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEvent {
    pub id: Uuid,
    pub fact_id: Uuid,
    pub session_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for answering one or more coach questions with the same value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    pub fact_ids: Vec<String>,
    pub value_text: String,
    #[serde(default)]
    pub answer_kind: AnswerKind,
    pub annotations: Option<serde_json::Value>,
}

/// Input for marking a slot as not applicable (or undoing it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkNotApplicableInput {
    pub slot_id: String,
    pub na: bool,
    pub reason: Option<String>,
}
