use serde::{Deserialize, Serialize};

/// Length check of a section against its word limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TightenSnapshot {
    pub within_limit: bool,
    pub word_count: usize,
    pub page_estimate: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_words: Option<usize>,
}

/// How many paragraphs of a draft carry an inline citation tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceSnapshot {
    pub paragraphs_with_provenance: usize,
    pub total_paragraphs: usize,
}

/// Input for the tighten endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TightenInput {
    pub markdown: String,
    pub limit_words: Option<usize>,
}

/// Input for exporting markdown as DOCX.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportInput {
    pub markdown: String,
    pub filename: Option<String>,
}
