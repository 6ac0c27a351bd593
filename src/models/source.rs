use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reference document attached to a session.
///
/// Sources hold extracted plain text; the solicitation itself is marked with
/// [`SourceRole::Rfp`] so fact extraction can look there first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub session_id: Uuid,
    pub label: String,
    pub kind: SourceKind,
    pub role: SourceRole,
    pub href: Option<String>,
    /// Extracted text. Omitted from list responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "url" => Some(Self::Url),
            _ => None,
        }
    }
}

/// What a source is for.
///
/// - `Rfp`: the solicitation being answered
/// - `Reference`: organization material, bios, prior proposals
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Rfp,
    #[default]
    Reference,
}

impl SourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rfp => "rfp",
            Self::Reference => "reference",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rfp" => Some(Self::Rfp),
            "reference" => Some(Self::Reference),
            _ => None,
        }
    }
}

/// Input for attaching a source to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSourceInput {
    pub label: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub role: SourceRole,
    pub href: Option<String>,
    pub content: String,
}

/// Input for importing remote documents by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportUrlsInput {
    pub urls: Vec<String>,
    #[serde(default)]
    pub role: SourceRole,
}
