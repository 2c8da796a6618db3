//! HTTP request handlers.

use axum::{
    extract::{Extension, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use super::server::{AppState, RequestId};
use crate::error::Error;
use crate::provider::types::GenerationRequest;
use crate::router::RouteError;
use crate::storage::logging::{spawn_log_write, RequestLog};

/// Response header: correlation ID (UUID v4).
pub const BACKSTOP_REQUEST_ID_HEADER: &str = "x-backstop-request-id";
/// Response header: provider name that served the request.
pub const BACKSTOP_PROVIDER_HEADER: &str = "x-backstop-provider";
/// Response header: attempts across all providers (integer).
pub const BACKSTOP_ATTEMPTS_HEADER: &str = "x-backstop-attempts";
/// Response header: wall-clock latency in milliseconds (integer).
pub const BACKSTOP_LATENCY_MS_HEADER: &str = "x-backstop-latency-ms";

/// Attach backstop metadata headers to a response.
///
/// Request id and latency are always present. Provider is present when one
/// served the request; attempts whenever at least one provider was tried
/// (so exhaustion responses carry the attempt count too).
fn attach_backstop_headers(
    response: &mut Response,
    request_id: &str,
    latency_ms: i64,
    provider: Option<&str>,
    attempts: Option<u32>,
) {
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static(BACKSTOP_REQUEST_ID_HEADER),
        HeaderValue::from_str(request_id).unwrap(),
    );
    headers.insert(
        HeaderName::from_static(BACKSTOP_LATENCY_MS_HEADER),
        HeaderValue::from(latency_ms as u64),
    );

    if let Some(provider_name) = provider {
        if let Ok(value) = HeaderValue::from_str(provider_name) {
            headers.insert(HeaderName::from_static(BACKSTOP_PROVIDER_HEADER), value);
        }
    }

    if let Some(attempts) = attempts {
        headers.insert(
            HeaderName::from_static(BACKSTOP_ATTEMPTS_HEADER),
            HeaderValue::from(attempts),
        );
    }
}

/// Handle POST /v1/generate
pub async fn generate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, Error> {
    let start = std::time::Instant::now();
    let correlation_id = request_id.0.to_string();
    let prompt_chars = request.prompt.chars().count() as i64;

    tracing::info!(
        prompt_chars,
        timeout_ms = ?request.timeout_ms,
        "Received generation request"
    );

    let result = state.router.generate(&request).await;

    // Log the outcome (fire-and-forget)
    let latency_ms = start.elapsed().as_millis() as i64;
    if let Some(pool) = &state.db {
        let log_entry = match &result {
            Ok(outcome) => RequestLog {
                correlation_id: correlation_id.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                provider: Some(outcome.provider.clone()),
                attempts: outcome.total_attempts as i64,
                prompt_chars,
                input_tokens: outcome.usage.map(|u| u.prompt_tokens),
                output_tokens: outcome.usage.map(|u| u.completion_tokens),
                latency_ms,
                success: true,
                error_kind: None,
                error_message: None,
            },
            Err(route_err) => {
                let attempts = match route_err {
                    RouteError::Invalid(_) => 0,
                    RouteError::Exhausted(report) => report.total_attempts() as i64,
                };
                RequestLog {
                    correlation_id: correlation_id.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    provider: None,
                    attempts,
                    prompt_chars,
                    input_tokens: None,
                    output_tokens: None,
                    latency_ms,
                    success: false,
                    error_kind: Some(route_error_kind(route_err).to_string()),
                    error_message: Some(route_err.to_string()),
                }
            }
        };
        spawn_log_write(pool, log_entry);
    }

    // Convert outcome to HTTP response, attaching backstop metadata headers
    match result {
        Ok(outcome) => {
            let mut response = Json(&outcome).into_response();
            attach_backstop_headers(
                &mut response,
                &correlation_id,
                latency_ms,
                Some(&outcome.provider),
                Some(outcome.total_attempts),
            );
            Ok(response)
        }
        Err(route_err) => {
            let attempts = match &route_err {
                RouteError::Invalid(_) => None,
                RouteError::Exhausted(report) => Some(report.total_attempts()),
            };
            let mut error_response = Error::from(route_err).into_response();
            attach_backstop_headers(
                &mut error_response,
                &correlation_id,
                latency_ms,
                None,
                attempts,
            );
            Ok(error_response)
        }
    }
}

fn route_error_kind(err: &RouteError) -> &'static str {
    match err {
        RouteError::Invalid(_) => "validation_error",
        RouteError::Exhausted(_) => "all_providers_exhausted",
    }
}

/// Handle GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "backstop"
    }))
}

/// Handle GET /providers - the configured provider set in priority order.
///
/// Key material never appears here; only the provenance of each key.
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .router
        .providers()
        .iter()
        .enumerate()
        .map(|(priority, p)| {
            let key_source = state
                .key_sources
                .iter()
                .find(|(name, _)| name == p.name())
                .map(|(_, source)| source.to_string());
            serde_json::json!({
                "name": p.name(),
                "kind": p.kind().as_str(),
                "model": p.model(),
                "url": p.base_url(),
                "priority": priority,
                "key_source": key_source,
            })
        })
        .collect();

    Json(serde_json::json!({
        "providers": providers,
        "failover_enabled": state.router.policy().failover_enabled,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    #[test]
    fn test_attach_headers_success() {
        let mut response = Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap();
        attach_backstop_headers(
            &mut response,
            "550e8400-e29b-41d4-a716-446655440000",
            1523,
            Some("openai-main"),
            Some(3),
        );
        let headers = response.headers();
        assert_eq!(
            headers.get("x-backstop-request-id").unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(headers.get("x-backstop-latency-ms").unwrap(), "1523");
        assert_eq!(headers.get("x-backstop-provider").unwrap(), "openai-main");
        assert_eq!(headers.get("x-backstop-attempts").unwrap(), "3");
    }

    #[test]
    fn test_attach_headers_validation_error_has_no_provider_or_attempts() {
        let mut response = Response::builder()
            .status(StatusCode::BAD_REQUEST)
            .body(Body::empty())
            .unwrap();
        attach_backstop_headers(
            &mut response,
            "abcd1234-0000-0000-0000-000000000000",
            4,
            None,
            None,
        );
        let headers = response.headers();
        assert_eq!(
            headers.get("x-backstop-request-id").unwrap(),
            "abcd1234-0000-0000-0000-000000000000"
        );
        assert_eq!(headers.get("x-backstop-latency-ms").unwrap(), "4");
        assert!(headers.get("x-backstop-provider").is_none());
        assert!(headers.get("x-backstop-attempts").is_none());
    }

    #[test]
    fn test_attach_headers_exhaustion_carries_attempts_without_provider() {
        let mut response = Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::empty())
            .unwrap();
        attach_backstop_headers(
            &mut response,
            "11111111-2222-3333-4444-555555555555",
            2750,
            None,
            Some(4),
        );
        let headers = response.headers();
        assert!(headers.get("x-backstop-provider").is_none());
        assert_eq!(headers.get("x-backstop-attempts").unwrap(), "4");
    }
}
