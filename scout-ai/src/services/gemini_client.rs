//! Generative model client
//!
//! One-shot `generateContent` calls against the Gemini REST API: an
//! instruction text plus ordered inline images in, raw response text out.
//! Labelled example images may precede the instruction (few-shot mode).
//! No streaming and no retries. Every call is bounded by a deadline.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::services::image_preprocessor::NormalizedImage;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const USER_AGENT: &str = concat!("scout-ai/", env!("CARGO_PKG_VERSION"));
const JSON_MIME_TYPE: &str = "application/json";

/// Remote model failures, kept distinct from "no match"
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode model response: {0}")]
    Decode(String),
}

/// Sampling and output settings for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Response-format hint (`application/json` for structured output)
    pub response_mime_type: Option<String>,
}

impl GenerationOptions {
    /// Options requesting strict JSON output
    pub fn json(temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            max_output_tokens,
            response_mime_type: Some(JSON_MIME_TYPE.to_string()),
        }
    }
}

/// A labelled example image
#[derive(Debug, Clone)]
pub struct Exemplar {
    pub category: String,
    pub image: NormalizedImage,
    /// Caption text sent right after the image
    pub caption: String,
}

/// Introduction followed by labelled examples, sent ahead of the prompt
#[derive(Debug, Clone)]
pub struct ExampleSection {
    pub intro: String,
    pub examples: Arc<Vec<Exemplar>>,
}

/// Instruction text plus ordered images
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<NormalizedImage>,
    pub options: GenerationOptions,
    pub examples: Option<ExampleSection>,
}

/// One content part in send order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestPart<'a> {
    Text(&'a str),
    Image(&'a NormalizedImage),
}

impl GenerationRequest {
    /// Parts in the order they go on the wire:
    /// example intro, each example image then its caption, the prompt, the images
    pub fn parts(&self) -> Vec<RequestPart<'_>> {
        let example_parts = self
            .examples
            .as_ref()
            .map_or(0, |section| 1 + section.examples.len() * 2);
        let mut parts = Vec::with_capacity(example_parts + 1 + self.images.len());

        if let Some(section) = &self.examples {
            parts.push(RequestPart::Text(&section.intro));
            for example in section.examples.iter() {
                parts.push(RequestPart::Image(&example.image));
                parts.push(RequestPart::Text(&example.caption));
            }
        }
        parts.push(RequestPart::Text(&self.prompt));
        parts.extend(self.images.iter().map(RequestPart::Image));
        parts
    }
}

/// Anything that turns a generation request into raw text
///
/// The pipeline depends on this trait, not on the HTTP client, so tests can
/// substitute a scripted model.
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier, for logs
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError>;
}

/// Gemini REST client
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    deadline: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, deadline: Duration) -> Result<Self, ModelError> {
        Self::with_base_url(GEMINI_BASE_URL.to_string(), api_key, model, deadline)
    }

    /// Client against a non-default endpoint (proxies, local stubs)
    pub fn with_base_url(
        base_url: String,
        api_key: String,
        model: String,
        deadline: Duration,
    ) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(deadline)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            deadline,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let body = build_request_body(request);

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.deadline)
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        extract_text(parsed)
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError> {
        tracing::debug!(
            model = %self.model,
            images = request.images.len(),
            examples = request.examples.as_ref().map_or(0, |s| s.examples.len()),
            prompt_chars = request.prompt.chars().count(),
            "Calling generateContent"
        );

        let text = tokio::time::timeout(self.deadline, self.send(&request))
            .await
            .map_err(|_| ModelError::Timeout(self.deadline))??;

        tracing::debug!(model = %self.model, response_chars = text.chars().count(), "Model responded");
        Ok(text)
    }
}

fn map_status(status: u16, body: String) -> ModelError {
    let message = api_error_message(&body).unwrap_or(body);
    match status {
        401 | 403 => ModelError::Auth(message),
        429 => ModelError::Quota(message),
        _ => ModelError::Api { status, message },
    }
}

/// `error.message` from a Gemini error body, if it has one
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_request_body(request: &GenerationRequest) -> GenerateContentRequest {
    let parts = request
        .parts()
        .into_iter()
        .map(|part| match part {
            RequestPart::Text(text) => Part::Text {
                text: text.to_string(),
            },
            RequestPart::Image(image) => Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type().to_string(),
                    data: BASE64.encode(&image.data),
                },
            },
        })
        .collect();

    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            temperature: request.options.temperature,
            max_output_tokens: request.options.max_output_tokens,
            response_mime_type: request.options.response_mime_type.clone(),
        },
    }
}

/// Concatenated text parts of the first candidate
fn extract_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        tracing::warn!(block_reason = %reason, "Prompt blocked by model");
        return Err(ModelError::EmptyResponse);
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        tracing::warn!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "Model candidate carried no text"
        );
        return Err(ModelError::EmptyResponse);
    }

    Ok(text)
}
