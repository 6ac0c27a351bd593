//! A scripted model for tests.
//!
//! Replies are chosen by the first rule whose needle appears in the request's
//! instructions or input; unmatched requests get the fallback, which fails by
//! default.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CompletionRequest, LanguageModel, LlmError};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    rules: Vec<(String, Reply)>,
    fallback: Option<String>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` when `needle` appears in the request.
    pub fn reply_when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(text.into())));
        self
    }

    /// Fail with an API error when `needle` appears in the request.
    pub fn fail_when(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail));
        self
    }

    /// Reply to anything unmatched with `text`.
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.instructions.contains(needle) || request.input.contains(needle))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone().map(Reply::Text));

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request);
        }

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) | None => Err(LlmError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let model = ScriptedModel::new()
            .reply_when("extract", "facts")
            .reply_when("draft", "prose")
            .otherwise("default");

        let reply = model
            .complete(CompletionRequest::new("You draft sections", "please extract"))
            .await
            .unwrap();
        assert_eq!(reply, "facts");

        let reply = model.complete(CompletionRequest::new("x", "y")).await.unwrap();
        assert_eq!(reply, "default");
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn unmatched_without_fallback_fails() {
        let model = ScriptedModel::new().fail_when("boom");
        assert!(model.complete(CompletionRequest::new("boom", "")).await.is_err());
        assert!(model.complete(CompletionRequest::new("quiet", "")).await.is_err());
    }
}
