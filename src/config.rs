//! Runtime configuration loaded from environment variables.
//!
//! - `GRANTED_DB_PATH` - SQLite file (default: platform data dir)
//! - `OPENAI_API_KEY` - Enables the hosted model; without it drafting falls back to stubs
//! - `OPENAI_BASE_URL` - Responses API base (default: `https://api.openai.com/v1`)
//! - `GRANTED_MODEL` - Default model id
//! - `GRANTED_INGEST_MODEL` / `GRANTED_DRAFT_MODEL` - Per-task overrides
//! - `GRANTED_WORKER_INTERVAL_MS` - Job worker poll interval

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{OfflineModel, OpenAiClient, SharedModel};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_WORKER_INTERVAL_MS: u64 = 5_000;
const MIN_WORKER_INTERVAL_MS: u64 = 1;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub ingest_model: String,
    pub draft_model: String,
    pub worker_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let model = var("GRANTED_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let worker_interval = worker_interval_from(var("GRANTED_WORKER_INTERVAL_MS").as_deref());

        Self {
            db_path: var("GRANTED_DB_PATH").map(PathBuf::from),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ingest_model: var("GRANTED_INGEST_MODEL").unwrap_or_else(|| model.clone()),
            draft_model: var("GRANTED_DRAFT_MODEL").unwrap_or_else(|| model.clone()),
            model,
            worker_interval,
        }
    }

    /// Defaults with no model access, for tests and offline use.
    pub fn offline() -> Self {
        Self {
            db_path: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            ingest_model: DEFAULT_MODEL.to_string(),
            draft_model: DEFAULT_MODEL.to_string(),
            worker_interval: Duration::from_millis(DEFAULT_WORKER_INTERVAL_MS),
        }
    }

    /// The hosted model when a key is configured, otherwise the offline stand-in.
    pub fn language_model(&self) -> SharedModel {
        match &self.openai_api_key {
            Some(key) => Arc::new(OpenAiClient::new(
                self.openai_base_url.clone(),
                key.clone(),
                self.model.clone(),
            )),
            None => {
                tracing::warn!("OPENAI_API_KEY not set; drafting and extraction run offline");
                Arc::new(OfflineModel)
            }
        }
    }
}

/// Parse the worker poll interval. Unparseable values fall back to the
/// default; zero is raised to the minimum since the worker cannot tick at 0.
pub fn worker_interval_from(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return Duration::from_millis(DEFAULT_WORKER_INTERVAL_MS);
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms < MIN_WORKER_INTERVAL_MS => {
            tracing::warn!(
                value = ms,
                min = MIN_WORKER_INTERVAL_MS,
                "GRANTED_WORKER_INTERVAL_MS below minimum, clamping"
            );
            Duration::from_millis(MIN_WORKER_INTERVAL_MS)
        }
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => {
            tracing::warn!(value = %raw, "Invalid GRANTED_WORKER_INTERVAL_MS, using default");
            Duration::from_millis(DEFAULT_WORKER_INTERVAL_MS)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
