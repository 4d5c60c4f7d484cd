//! Reasoning provider seam used by the analysis and patch workflows.

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;

use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_used: Option<i64>,
}

/// An external model that turns a conversation into a completion.
///
/// Network failures, timeouts and non-success statuses surface as
/// `TriageError::UpstreamUnavailable` so the workflows can retry them.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}
