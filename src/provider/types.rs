//! Request and completion types shared by every provider adapter.

use serde::{Deserialize, Serialize};

/// A text-generation request.
///
/// This is both the gateway's wire format (`POST /v1/generate` body) and the
/// library entry point. Sampling defaults match the original deployment:
/// temperature 0.7, max_tokens 1000.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// User prompt; must be non-empty after trimming
    pub prompt: String,
    /// Optional system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling temperature in 0.0..=2.0
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-attempt timeout override in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Check the request before any provider is contacted.
    ///
    /// An empty (or whitespace-only) prompt never reaches a provider.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be at least 1".to_string());
        }
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be nonzero".to_string());
        }
        Ok(())
    }
}

/// What a single successful provider call yields.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text, whitespace-trimmed. May legitimately be empty.
    pub text: String,
    /// Token accounting, when the vendor reports it
    pub usage: Option<TokenUsage>,
}

/// Token usage as reported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
