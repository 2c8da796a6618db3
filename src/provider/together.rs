//! Together AI chat-completions adapter.
//!
//! Together's API is OpenAI-compatible for successful responses, but its
//! error bodies are not always wrapped in the `{"error": {...}}` envelope,
//! so this adapter tolerates both the nested and the flat shape.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, ProviderConfig};
use crate::provider::types::{Completion, GenerationRequest, TokenUsage};
use crate::provider::{classify_http_status, transport_error, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";

/// Adapter for the Together AI API.
#[derive(Debug, Clone)]
pub struct TogetherProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

impl TogetherProvider {
    pub fn from_config(config: &ProviderConfig, client: Client) -> Self {
        Self {
            name: config.name.clone(),
            client,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: config.api_key.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One call to `POST {base}/chat/completions`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(TogetherMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(TogetherMessage {
            role: "user",
            content: &request.prompt,
        });

        let payload = TogetherRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let mut req = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status.as_u16(), &body);
            return Err(classify_http_status(status, message));
        }

        let body: TogetherResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("response contained no choices".to_string())
        })?;

        let text = choice
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(Completion {
            text,
            usage: body.usage.map(TogetherUsage::into_usage),
        })
    }
}

/// Pull a human-readable message out of a Together error body.
///
/// Tries `{"error": {"message": ...}}` first, then a flat `{"message": ...}`,
/// then falls back to a body snippet.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<TogetherErrorEnvelope>(body) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }
    if let Ok(flat) = serde_json::from_str::<TogetherFlatError>(body) {
        if !flat.message.is_empty() {
            return flat.message;
        }
    }
    let snippet: String = body.chars().take(200).collect();
    if snippet.trim().is_empty() {
        format!("HTTP {} with empty body", status)
    } else {
        snippet
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct TogetherRequest<'a> {
    model: &'a str,
    messages: Vec<TogetherMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct TogetherMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TogetherResponse {
    choices: Vec<TogetherChoice>,
    usage: Option<TogetherUsage>,
}

#[derive(Debug, Deserialize)]
struct TogetherChoice {
    message: TogetherResponseMessage,
}

#[derive(Debug, Deserialize)]
struct TogetherResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TogetherUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl TogetherUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TogetherErrorEnvelope {
    error: TogetherErrorDetail,
}

#[derive(Debug, Deserialize)]
struct TogetherErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TogetherFlatError {
    #[serde(default)]
    message: String,
}
