//! OpenAI chat-completions adapter.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKey, ProviderConfig};
use crate::provider::types::{Completion, GenerationRequest, TokenUsage};
use crate::provider::{classify_http_status, transport_error, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Adapter for the OpenAI API (and any endpoint speaking its dialect).
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

impl OpenAiProvider {
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
        let payload = OpenAiRequest {
            model: &self.model,
            messages: build_messages(request),
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
            let message = extract_error_message(&body)
                .unwrap_or_else(|| fallback_message(status.as_u16(), &body));
            return Err(classify_http_status(status, message));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            ProviderError::MalformedResponse("response contained no choices".to_string())
        })?;

        // An empty completion is a valid model response, not an error.
        let text = choice
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(Completion {
            text,
            usage: body.usage.map(OpenAiUsage::into_usage),
        })
    }
}

fn build_messages<'a>(request: &'a GenerationRequest) -> Vec<OpenAiMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(OpenAiMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(OpenAiMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

/// OpenAI error bodies look like `{"error": {"message": "...", ...}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let envelope: OpenAiErrorEnvelope = serde_json::from_str(body).ok()?;
    let message = envelope.error.message;
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    let snippet: String = body.chars().take(200).collect();
    if snippet.trim().is_empty() {
        format!("HTTP {} with empty body", status)
    } else {
        snippet
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    #[serde(default)]
    message: String,
}
