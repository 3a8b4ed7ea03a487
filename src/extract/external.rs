//! OpenAI-compatible chat-completions backend for field extraction.
//!
//! The request pins the response to a JSON object carrying exactly the three
//! punchlist fields; parsing and validation of that object stay in the
//! [`FieldExtractor`](super::FieldExtractor), which treats this client as an
//! opaque text-in/text-out service.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{ExtractionRequest, ExtractionService};

/// Configuration for the hosted extraction service
#[derive(Debug, Clone)]
pub struct ExternalExtractorConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Bearer token, if the deployment requires one
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature; extraction wants determinism
    pub temperature: f32,
    /// Response token budget
    pub max_tokens: u32,
}

impl Default for ExternalExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Debug, Deserialize)]
struct ChatMessageBody {
    content: Option<String>,
}

/// Client for an OpenAI-compatible structured-extraction deployment
pub struct ExternalExtractor {
    config: ExternalExtractorConfig,
    client: reqwest::Client,
}

impl ExternalExtractor {
    pub fn new(config: ExternalExtractorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .context("Invalid authorization header value")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    fn system_message(categories: &[String]) -> String {
        format!(
            "Respond with a single JSON object containing exactly the keys \
             \"room\", \"description\" and \"category\". \"category\" must be \
             one of: {}.",
            categories.join(", ")
        )
    }
}

#[async_trait]
impl ExtractionService for ExternalExtractor {
    async fn complete(&self, request: &ExtractionRequest) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_message(&request.categories),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(anyhow!(
                "API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let completion_body = response
            .text()
            .await
            .context("Failed to read API response")?;

        parse_completion(&completion_body)
    }
}

/// Pull the assistant message text out of a chat-completion body.
fn parse_completion(body: &str) -> Result<String> {
    let completion: ChatCompletionResponse =
        serde_json::from_str(body).context("Failed to parse API response")?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("API response contained no content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_extracts_message_content() {
        let body = r#"{"choices":[{"message":{"content":"{\"room\":\"101\"}"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), r#"{"room":"101"}"#);
    }

    #[test]
    fn test_parse_completion_rejects_empty_choices() {
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
    }

    #[test]
    fn test_parse_completion_rejects_blank_content() {
        let body = r#"{"choices":[{"message":{"content":"  "}}]}"#;
        assert!(parse_completion(body).is_err());
    }

    #[test]
    fn test_system_message_lists_categories() {
        let message = ExternalExtractor::system_message(&[
            "Division 22 - Plumbing".to_string(),
            "Division 23 - HVAC".to_string(),
        ]);
        assert!(message.contains("Division 22 - Plumbing, Division 23 - HVAC"));
    }

    #[test]
    fn test_default_config() {
        let config = ExternalExtractorConfig::default();
        assert_eq!(config.temperature, 0.0);
        assert!(config.api_key.is_none());
    }
}
