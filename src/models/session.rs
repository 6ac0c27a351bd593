use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coverage::{CoverageSnapshot, FixNextSuggestion};
use super::snapshot::{ProvenanceSnapshot, TightenSnapshot};
use super::source::Source;

/// A drafting session within a project.
///
/// The session is the unit everything else hangs off: uploaded sources,
/// extracted facts, section drafts, coverage snapshots and background jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub project_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// A chat turn in a session.
///
/// Assistant turns may carry an [`Envelope`] with the coverage and next
/// action that were current when the turn was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub envelope: Option<Envelope>,
    pub created_at: DateTime<Utc>,
}

/// Structured payload attached to an assistant turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub coverage: Option<CoverageSnapshot>,
    #[serde(default)]
    pub fix_next: Option<FixNextSuggestion>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub tighten: Option<TightenSnapshot>,
    #[serde(default)]
    pub provenance: Option<ProvenanceSnapshot>,
}

/// Input for posting a user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageInput {
    pub content: String,
}

/// An assistant turn plus the snapshots it should persist alongside.
#[derive(Debug, Clone, Default)]
pub struct AssistantTurn {
    pub content: String,
    pub coverage: Option<CoverageSnapshot>,
    pub fix_next: Option<FixNextSuggestion>,
    pub tighten: Option<TightenSnapshot>,
    pub provenance: Option<ProvenanceSnapshot>,
}

/// Everything a client needs to render a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub project_id: Uuid,
    pub messages: Vec<Message>,
    pub sources: Vec<Source>,
    pub coverage: Option<CoverageSnapshot>,
    pub fix_next: Option<FixNextSuggestion>,
    pub tighten: Option<TightenSnapshot>,
    pub provenance: Option<ProvenanceSnapshot>,
}
