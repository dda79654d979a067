//! Text-completion providers.
//!
//! [`MessagesProvider`] speaks a messages-style completion API. Response
//! bodies are decoded as a tagged union so that chat-completions and legacy
//! completion shapes served from the same endpoint are also accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use stockroom_core::ClassifierProviderConfig;

use crate::error::ClassifierError;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 512;

/// One completion backend: prompt in, free-form text out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassifierError>;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [RequestMessage<'a>; 1],
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompletionBody {
    Messages { content: Vec<ContentBlock> },
    Chat { choices: Vec<Choice> },
    Legacy { completion: String },
}

impl CompletionBody {
    fn into_text(self) -> Option<String> {
        let text = match self {
            CompletionBody::Messages { content } => content
                .into_iter()
                .filter(|b| b.kind.is_empty() || b.kind == "text")
                .filter_map(|b| b.text)
                .collect::<Vec<_>>()
                .join(""),
            CompletionBody::Chat { choices } => choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default(),
            CompletionBody::Legacy { completion } => completion,
        };
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[derive(Clone)]
pub struct MessagesProvider {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for MessagesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagesProvider")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl MessagesProvider {
    /// # Errors
    ///
    /// Returns [`ClassifierError::Http`] if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        config: &ClassifierProviderConfig,
        timeout_secs: u64,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            name: name.into(),
            client,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn error_for_status(&self, response: reqwest::Response) -> ClassifierError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return ClassifierError::RateLimited {
                provider: self.name.clone(),
                retry_after_secs: parse_retry_after(&response),
            };
        }
        // 529 is an overload signal some providers use.
        if status.is_server_error() || status.as_u16() == 529 {
            return ClassifierError::Unavailable {
                provider: self.name.clone(),
                status: status.as_u16(),
            };
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        ClassifierError::Api {
            provider: self.name.clone(),
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl CompletionProvider for MessagesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, system, prompt), fields(provider = %self.name, model = %self.model))]
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassifierError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: [RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }

        let bytes = response.bytes().await?;
        let body: CompletionBody =
            serde_json::from_slice(&bytes).map_err(|source| ClassifierError::Deserialize {
                context: format!("{} completion body", self.name),
                source,
            })?;

        body.into_text().ok_or_else(|| ClassifierError::EmptyResponse {
            provider: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Option<String> {
        serde_json::from_str::<CompletionBody>(json)
            .ok()
            .and_then(CompletionBody::into_text)
    }

    #[test]
    fn messages_shape_joins_text_blocks() {
        let text = decode(
            r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}]}"#,
        );
        assert_eq!(text.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn chat_shape_uses_first_choice() {
        let text = decode(r#"{"choices":[{"message":{"content":"hello"}}]}"#);
        assert_eq!(text.as_deref(), Some("hello"));
    }

    #[test]
    fn legacy_shape() {
        assert_eq!(decode(r#"{"completion":"hi"}"#).as_deref(), Some("hi"));
    }

    #[test]
    fn blank_or_unknown_shapes_carry_no_text() {
        assert_eq!(decode(r#"{"content":[]}"#), None);
        assert_eq!(decode(r#"{"content":[{"type":"tool_use"}]}"#), None);
        assert_eq!(decode(r#"{"result":"x"}"#), None);
    }

    #[test]
    fn debug_redacts_api_key() {
        let provider = MessagesProvider::new(
            "primary",
            &ClassifierProviderConfig {
                base_url: "http://localhost/".to_string(),
                api_key: "sk-secret".to_string(),
                model: "m".to_string(),
            },
            5,
        )
        .unwrap();
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("http://localhost/v1/messages"));
    }
}
