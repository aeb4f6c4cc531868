//! Pluggable vision backend that produces a short descriptive caption for
//! an image (component C6). Grounded on `ferrex-core`'s provider error
//! shape (`tmdb_api_provider.rs`) for the cloud backend and on the image
//! service's retry/backoff usage for the shared policy.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::metrics::MetricsCollector;
use crate::retry::BackoffPolicy;

const MAX_LOCAL_CAPTION_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("caption backend not implemented: {0}")]
    NotImplemented(String),

    #[error("caption backend returned an error: {0}")]
    Backend(String),

    #[error("caption backend network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("caption backend returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("no api key configured for caption backend")]
    MissingApiKey,
}

fn prompt_for(ocr_text: Option<&str>) -> String {
    match ocr_text {
        Some(text) if !text.trim().is_empty() => {
            "describe the image scene and contents. short response.".to_string()
        }
        _ => {
            "describe the image scene and contents. short response. If there is any visible text, include what it says.".to_string()
        }
    }
}

pub(crate) fn truncate_caption(caption: &str) -> String {
    let trimmed = caption.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= MAX_LOCAL_CAPTION_CHARS {
        return trimmed.to_string();
    }
    let mut truncated: String = chars[..MAX_LOCAL_CAPTION_CHARS].iter().collect();
    truncated.push('…');
    truncated
}

#[async_trait]
pub trait CaptionBackend: Send + Sync {
    async fn caption(&self, image_bytes: &[u8], mime: &str, ocr_text: Option<&str>) -> Result<String, CaptionError>;
}

/// `http://localhost:11434/api/generate` — single JSON POST, response is
/// either a `response` field or `message.content`.
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(client: Client, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl CaptionBackend for OllamaBackend {
    async fn caption(&self, image_bytes: &[u8], _mime: &str, ocr_text: Option<&str>) -> Result<String, CaptionError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt_for(ocr_text),
            "images": [STANDARD.encode(image_bytes)],
            "stream": false,
        });
        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        let body: OllamaResponse = response.json().await?;
        let caption = body
            .response
            .or_else(|| body.message.map(|m| m.content))
            .ok_or_else(|| CaptionError::UnexpectedResponse("missing response/message.content".into()))?;
        Ok(truncate_caption(&caption))
    }
}

/// `https://api.openai.com/v1/responses` — Responses API shape with one
/// user message carrying `input_image` and `input_text`.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    backoff: BackoffPolicy,
    metrics: Option<MetricsCollector>,
}

impl OpenAiBackend {
    /// API-key precedence: an explicit `api_key` wins over `OPENAI_API_KEY`.
    pub fn new(client: Client, endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Result<Self, CaptionError> {
        let api_key = api_key
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or(CaptionError::MissingApiKey)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            backoff: BackoffPolicy::default(),
            metrics: None,
        })
    }

    /// Records `usage.input_tokens`/`output_tokens` from each successful
    /// call under `caption_openai_input_tokens`/`caption_openai_output_tokens`.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[derive(Serialize)]
struct ResponsesContentImage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    image_url: &'a str,
}

#[derive(Serialize)]
struct ResponsesContentText<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ResponsesBody {
    output: Vec<ResponsesOutputItem>,
    usage: Option<ResponsesUsage>,
}

#[derive(Deserialize)]
struct ResponsesOutputItem {
    content: Vec<ResponsesOutputContent>,
}

#[derive(Deserialize)]
struct ResponsesOutputContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponsesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl CaptionBackend for OpenAiBackend {
    async fn caption(&self, image_bytes: &[u8], mime: &str, ocr_text: Option<&str>) -> Result<String, CaptionError> {
        let data_url = format!("data:{mime};base64,{}", STANDARD.encode(image_bytes));
        let prompt = prompt_for(ocr_text);
        let payload = json!({
            "model": self.model,
            "input": [{
                "role": "user",
                "content": [
                    { "type": "input_image", "image_url": data_url },
                    { "type": "input_text", "text": prompt },
                ],
            }],
        });

        for attempt in 0..self.backoff.total_attempts() {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt + 1 >= self.backoff.total_attempts() {
                    return Err(CaptionError::Backend(format!("cloud caption call failed with {status}")));
                }
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                tokio::time::sleep(self.backoff.delay_for(attempt + 1, retry_after)).await;
                continue;
            }
            if !status.is_success() {
                return Err(CaptionError::Backend(format!("cloud caption call failed with {status}")));
            }

            let body: ResponsesBody = response.json().await?;
            if let (Some(usage), Some(metrics)) = (&body.usage, &self.metrics) {
                metrics.increment("caption_openai_input_tokens", usage.input_tokens);
                metrics.increment("caption_openai_output_tokens", usage.output_tokens);
            }
            let text = body
                .output
                .into_iter()
                .flat_map(|item| item.content)
                .find(|c| c.kind == "output_text")
                .and_then(|c| c.text)
                .ok_or_else(|| CaptionError::UnexpectedResponse("no output_text item found".into()))?;
            return Ok(text);
        }
        unreachable!("loop always returns or errors before exhausting attempts")
    }
}

/// Placeholder for a future on-device multimodal model. Fails immediately
/// with a well-defined error rather than silently degrading.
pub struct UnimplementedBackend;

#[async_trait]
impl CaptionBackend for UnimplementedBackend {
    async fn caption(&self, _image_bytes: &[u8], _mime: &str, _ocr_text: Option<&str>) -> Result<String, CaptionError> {
        Err(CaptionError::NotImplemented(
            "on-device multimodal caption backend is not yet available".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_visible_text_only_when_ocr_absent() {
        assert!(!prompt_for(Some("hello")).contains("visible text"));
        assert!(prompt_for(None).contains("visible text"));
        assert!(prompt_for(Some("  ")).contains("visible text"));
    }

    #[test]
    fn caption_is_truncated_with_ellipsis_over_200_chars() {
        let long = "a".repeat(250);
        let truncated = truncate_caption(&long);
        assert_eq!(truncated.chars().count(), 201);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn caption_under_limit_is_untouched() {
        assert_eq!(truncate_caption("a short caption"), "a short caption");
    }

    #[tokio::test]
    async fn unimplemented_backend_fails_with_well_defined_error() {
        let err = UnimplementedBackend.caption(&[], "image/png", None).await.unwrap_err();
        assert!(matches!(err, CaptionError::NotImplemented(_)));
    }

    #[test]
    fn responses_body_parses_usage_alongside_output_text() {
        let raw = r#"{
            "output": [{"content": [{"type": "output_text", "text": "a dog on a beach"}]}],
            "usage": {"input_tokens": 120, "output_tokens": 14}
        }"#;
        let body: ResponsesBody = serde_json::from_str(raw).unwrap();
        let usage = body.usage.unwrap();
        assert_eq!(usage.input_tokens, 120);
        assert_eq!(usage.output_tokens, 14);
    }

    #[test]
    fn responses_body_tolerates_missing_usage() {
        let raw = r#"{"output": [{"content": [{"type": "output_text", "text": "ok"}]}]}"#;
        let body: ResponsesBody = serde_json::from_str(raw).unwrap();
        assert!(body.usage.is_none());
    }

    #[test]
    fn explicit_api_key_wins_over_environment() {
        std::env::set_var("OPENAI_API_KEY", "env-key");
        let backend = OpenAiBackend::new(
            Client::new(),
            "https://api.openai.com/v1/responses",
            "gpt-4o-mini",
            Some("explicit-key".to_string()),
        )
        .unwrap();
        assert_eq!(backend.api_key, "explicit-key");
        std::env::remove_var("OPENAI_API_KEY");
    }
}
