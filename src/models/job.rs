use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of background work for a session.
///
/// Jobs live in a plain table polled by the worker. A job moves
/// `queued → running → done | error | canceled`; claiming is a conditional
/// update on `status = 'queued'`, so each job runs at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Normalize,
    Autodraft,
    Discover,
    Tighten,
    IngestUrl,
    IngestFile,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Autodraft => "autodraft",
            Self::Discover => "discover",
            Self::Tighten => "tighten",
            Self::IngestUrl => "ingest_url",
            Self::IngestFile => "ingest_file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "normalize" => Some(Self::Normalize),
            "autodraft" => Some(Self::Autodraft),
            "discover" => Some(Self::Discover),
            "tighten" => Some(Self::Tighten),
            "ingest_url" => Some(Self::IngestUrl),
            "ingest_file" => Some(Self::IngestFile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A log line recorded while a job ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub id: Uuid,
    pub job_id: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for enqueueing a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueJobInput {
    pub session_id: Uuid,
    pub kind: JobKind,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Result of enqueueing: the new job, or the existing one that made it a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub job: Job,
    pub created: bool,
}

/// Input for a manual worker tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickInput {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResponse {
    pub processed: bool,
    pub job: Option<Job>,
}
