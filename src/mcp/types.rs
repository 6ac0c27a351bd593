//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCoverageRequest {
    #[schemars(description = "The UUID of the drafting session")]
    pub session_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PersistFactRequest {
    #[schemars(description = "The UUID of the drafting session")]
    pub session_id: String,
    #[schemars(
        description = "Fact slot ids this answer fills, e.g. 'rfp.deadline' or 'budget.cap'. One value may fill several slots."
    )]
    pub fact_ids: Vec<String>,
    #[schemars(description = "The answer exactly as it should be recorded")]
    pub value: String,
    #[schemars(description = "How to read the value: 'text' (default), 'date', or 'url'")]
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DraftSectionRequest {
    #[schemars(description = "The UUID of the drafting session")]
    pub session_id: String,
    #[schemars(description = "Section id from get_coverage, e.g. 'need-statement'")]
    pub section_id: String,
    #[schemars(
        description = "Markdown to store verbatim. When omitted the section is generated from the recorded facts."
    )]
    #[serde(default)]
    pub markdown: Option<String>,
    #[schemars(description = "Extra drafting instructions used when generating")]
    #[serde(default)]
    pub prompt: Option<String>,
    #[schemars(description = "Approximate length in words when generating")]
    #[serde(default)]
    pub word_target: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TightenSectionRequest {
    #[schemars(description = "The UUID of the drafting session")]
    pub session_id: String,
    #[schemars(description = "Markdown to check")]
    pub markdown: String,
    #[schemars(description = "Word limit imposed by the funder, if any")]
    #[serde(default)]
    pub limit_words: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnqueueJobRequest {
    #[schemars(description = "The UUID of the drafting session")]
    pub session_id: String,
    #[schemars(description = "Job kind: 'normalize', 'autodraft', or 'discover'")]
    pub kind: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExportDocxRequest {
    #[schemars(
        description = "Session whose drafted sections are exported. Ignored when markdown is given."
    )]
    #[serde(default)]
    pub session_id: Option<String>,
    #[schemars(description = "Markdown to export directly")]
    #[serde(default)]
    pub markdown: Option<String>,
    #[schemars(description = "File name for the document (default grant-draft.docx)")]
    #[serde(default)]
    pub filename: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CoverageReport {
    pub session_id: String,
    /// Coverage score rounded to a whole percent
    pub percent: i64,
    pub summary: String,
    pub sections: Vec<SectionStatus>,
    /// What to work on next
    pub fix_next: FixNextInfo,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SectionStatus {
    pub id: String,
    pub label: String,
    pub status: String,
    /// Open questions, with the fact slots each one fills
    pub questions: Vec<QuestionInfo>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QuestionInfo {
    pub prompt: String,
    pub fact_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FixNextInfo {
    pub id: String,
    pub label: String,
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DraftInfo {
    pub section_id: String,
    pub status: String,
    pub word_count: usize,
    pub markdown: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TightenReport {
    pub within_limit: bool,
    pub word_count: usize,
    pub page_estimate: usize,
    pub limit_words: Option<usize>,
    pub paragraphs_with_provenance: usize,
    pub total_paragraphs: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct JobInfo {
    pub id: String,
    pub kind: String,
    pub status: String,
    /// False when an equivalent job was already queued or running
    pub created: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExportInfo {
    pub filename: String,
    pub base64: String,
}
