//! Provider adapters and the uniform provider error taxonomy.
//!
//! Each vendor gets its own self-contained adapter module speaking that
//! vendor's chat-completions dialect. The router only ever sees the
//! [`ProviderClient`] enum and [`ProviderError`], never vendor wire types.

pub mod openai;
pub mod together;
pub mod types;

use reqwest::StatusCode;
use std::time::Duration;

use crate::config::{ProviderConfig, ProviderKind};

use self::openai::OpenAiProvider;
use self::together::TogetherProvider;
use self::types::{Completion, GenerationRequest};

/// Uniform failure classification for provider calls.
///
/// `Clone` because every attempt's error is retained in the exhaustion
/// report; transport errors are therefore captured as strings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The attempt did not complete within the per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 429 from the vendor.
    #[error("rate limited by upstream: {message}")]
    RateLimited { message: String },

    /// HTTP 5xx (or otherwise unexpected status) from the vendor.
    #[error("upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Connection-level failure before any HTTP status was produced.
    #[error("transport failure: {0}")]
    Transport(String),

    /// HTTP 401/403: the configured credentials were rejected.
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 4xx other than auth/rate-limit: the vendor refused the request.
    #[error("request rejected by provider (HTTP {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// A 2xx response whose body could not be decoded.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether retrying the same provider can plausibly help.
    ///
    /// Auth and invalid-request failures are configuration problems; the
    /// identical call will fail identically, so the router fails over
    /// immediately instead of burning the retry budget. A malformed body on
    /// a 2xx gets the 5xx treatment: it looks exactly like an overloaded or
    /// misbehaving upstream from here.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ProviderError::Auth { .. } | ProviderError::InvalidRequest { .. }
        )
    }

    /// Stable machine-readable kind, used in logs, storage, and the
    /// exhaustion report envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Upstream { .. } => "upstream_error",
            ProviderError::Transport(_) => "transport",
            ProviderError::Auth { .. } => "auth",
            ProviderError::InvalidRequest { .. } => "invalid_request",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Map a non-success HTTP status to the uniform taxonomy.
///
/// `message` should already be extracted from the vendor's error envelope
/// (adapters know their own envelope shape).
pub(crate) fn classify_http_status(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth {
            status: status.as_u16(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { message },
        s if s.is_client_error() => ProviderError::InvalidRequest {
            status: s.as_u16(),
            message,
        },
        s => ProviderError::Upstream {
            status: s.as_u16(),
            message,
        },
    }
}

/// Map a `reqwest` send/body failure to the uniform taxonomy.
///
/// The per-attempt timeout is enforced by the router, so anything surfacing
/// here is a transport-level problem (DNS, refused connection, closed
/// socket), which is transient by definition.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

/// The closed set of provider clients, dispatched by match.
///
/// One variant per [`ProviderKind`]; construction is infallible because
/// every kind has usable defaults for URL and model.
#[derive(Debug, Clone)]
pub enum ProviderClient {
    OpenAi(OpenAiProvider),
    Together(TogetherProvider),
}

impl ProviderClient {
    /// Build the adapter matching the config entry's kind.
    pub fn from_config(config: &ProviderConfig, http: reqwest::Client) -> Self {
        match config.kind {
            ProviderKind::OpenAi => ProviderClient::OpenAi(OpenAiProvider::from_config(config, http)),
            ProviderKind::Together => {
                ProviderClient::Together(TogetherProvider::from_config(config, http))
            }
        }
    }

    /// Configured (unique) provider name, used for attribution.
    pub fn name(&self) -> &str {
        match self {
            ProviderClient::OpenAi(p) => p.name(),
            ProviderClient::Together(p) => p.name(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderClient::OpenAi(_) => ProviderKind::OpenAi,
            ProviderClient::Together(_) => ProviderKind::Together,
        }
    }

    /// Effective model after applying the adapter default.
    pub fn model(&self) -> &str {
        match self {
            ProviderClient::OpenAi(p) => p.model(),
            ProviderClient::Together(p) => p.model(),
        }
    }

    /// Effective base URL after applying the adapter default.
    pub fn base_url(&self) -> &str {
        match self {
            ProviderClient::OpenAi(p) => p.base_url(),
            ProviderClient::Together(p) => p.base_url(),
        }
    }

    /// One generation attempt against this provider. No retries, no
    /// timeout: both are the router's job.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        match self {
            ProviderClient::OpenAi(p) => p.generate(request).await,
            ProviderClient::Together(p) => p.generate(request).await,
        }
    }
}

/// Build provider clients in config (priority) order over a shared HTTP client.
pub fn build_providers(configs: &[ProviderConfig], http: &reqwest::Client) -> Vec<ProviderClient> {
    configs
        .iter()
        .map(|c| ProviderClient::from_config(c, http.clone()))
        .collect()
}
