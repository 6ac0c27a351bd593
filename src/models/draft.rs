use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coverage::CoverageStatus;

/// The current markdown for one proposal section.
///
/// There is at most one draft per section per session; saving replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub session_id: Uuid,
    pub section_id: String,
    pub markdown: String,
    pub status: CoverageStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftMode {
    #[default]
    Save,
    Generate,
}

/// Input for saving or generating a section draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftInput {
    #[serde(default)]
    pub mode: DraftMode,
    pub markdown: Option<String>,
    pub prompt: Option<String>,
    pub word_target: Option<u32>,
    pub status: Option<CoverageStatus>,
}

/// Response body for draft endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftResponse {
    pub section_id: String,
    pub markdown: String,
}
