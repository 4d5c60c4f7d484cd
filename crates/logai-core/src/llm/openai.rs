use std::time::Duration;

use async_trait::async_trait;
use logai_types::TriageError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, Completion, ReasoningProvider};
use crate::Result;
use crate::config::LlmConfig;

// ── OpenAI-compatible request/response ──

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: Option<i64>,
}

/// Chat completions client for any OpenAI-compatible endpoint.
pub struct OpenAiProvider {
    config: LlmConfig,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TriageError::UpstreamUnavailable(format!("http client: {}", e)))?;
        Ok(Self {
            config,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    /// Same request as [`ReasoningProvider::complete`] with a key supplied by
    /// the caller, so one client (and its connection pool) can serve keys
    /// that change at runtime.
    pub async fn complete_with_key(
        &self,
        api_key: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<Completion> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            TriageError::UpstreamUnavailable(format!(
                "no API key configured (set {} or the openai_api_key setting)",
                self.config.api_key_env
            ))
        })?;

        let req = OpenAiRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let res = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TriageError::UpstreamUnavailable(format!(
                        "reasoning service timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    TriageError::UpstreamUnavailable(format!("reasoning service unreachable: {}", e))
                }
            })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| TriageError::UpstreamUnavailable(format!("reading response: {}", e)))?;
        if !status.is_success() {
            return Err(TriageError::UpstreamUnavailable(format!(
                "reasoning service returned {}: {}",
                status,
                truncate(&body, 500)
            )));
        }
        parse_completion(&body, &self.config.model)
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        self.complete_with_key(self.api_key.as_deref(), messages).await
    }
}

fn parse_completion(body: &str, requested_model: &str) -> Result<Completion> {
    let parsed: OpenAiResponse = serde_json::from_str(body).map_err(|e| {
        TriageError::UpstreamUnavailable(format!("malformed completion response: {}", e))
    })?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    Ok(Completion {
        text,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
        tokens_used: parsed.usage.and_then(|u| u.total_tokens),
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_model_and_usage() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion = parse_completion(body, "gpt-4o-mini").unwrap();
        assert_eq!(completion.text, "hello");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(completion.tokens_used, Some(15));
    }

    #[test]
    fn missing_fields_fall_back() {
        let completion = parse_completion(r#"{"choices": []}"#, "local-model").unwrap();
        assert_eq!(completion.text, "");
        assert_eq!(completion.model, "local-model");
        assert_eq!(completion.tokens_used, None);
    }

    #[test]
    fn garbage_is_an_upstream_error() {
        assert!(matches!(
            parse_completion("<html>bad gateway</html>", "m"),
            Err(TriageError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_a_request() {
        let provider = OpenAiProvider::new(LlmConfig::default(), Some("  ".into())).unwrap();
        let err = provider.complete(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, TriageError::UpstreamUnavailable(ref m) if m.contains("OPENAI_API_KEY")));

        let err = provider
            .complete_with_key(Some(""), &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::UpstreamUnavailable(_)));
    }
}
