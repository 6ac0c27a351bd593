//! Language model access.
//!
//! Everything that talks to a model goes through [`LanguageModel`], so the
//! hosted client, the offline stand-in and the scripted test double are
//! interchangeable.

mod mock;
mod openai;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use mock::ScriptedModel;
pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unauthorized: model API key missing or invalid")]
    Unauthorized,

    #[error("Model returned no output")]
    EmptyResponse,

    #[error("No language model configured")]
    NotConfigured,
}

/// A single instruction + input exchange.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Overrides the client's default model.
    pub model: Option<String>,
    pub instructions: String,
    pub input: String,
    pub max_output_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    /// Identifier recorded alongside generated artifacts.
    fn name(&self) -> &str;

    /// Run the request and return the model's text output.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

pub type SharedModel = Arc<dyn LanguageModel>;

/// Used when no API key is configured. Every call fails with
/// [`LlmError::NotConfigured`], which callers treat as "fall back".
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}
