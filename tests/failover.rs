//! End-to-end failover tests through the HTTP gateway.
//!
//! Spins up wiremock upstreams playing the role of OpenAI-compatible
//! providers, wires them into a real axum app, and exercises the failover
//! semantics over POST /v1/generate:
//! - primary success never touches the fallback
//! - transient errors burn the retry budget, then the next provider serves
//! - fatal errors (401) fail over without retrying
//! - full exhaustion returns 503 with a per-provider report
//! - failover disabled stops after the primary
//! - invalid requests are rejected before any provider call

use std::sync::Arc;

use axum::body::Body;
use http::Request;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use backstop::config::{Config, FailoverConfig, ProviderConfig, ProviderKind, ServerConfig};
use backstop::gateway::{create_router, AppState};
use backstop::provider::build_providers;
use backstop::router::{FailoverPolicy, FailoverRouter};

/// Standard failover policy for tests: 2 attempts per provider, no delay.
fn fast_failover(max_retries: u32, enabled: bool) -> FailoverConfig {
    FailoverConfig {
        enabled,
        max_retries,
        retry_delay_ms: 0,
        request_timeout_ms: 5_000,
    }
}

/// Build a config whose providers point at the given mock upstream URLs,
/// named "p1", "p2", ... in priority order.
fn test_config(urls: &[String], failover: FailoverConfig) -> Config {
    Config {
        server: ServerConfig {
            listen: "127.0.0.1:0".to_string(),
        },
        database: None,
        providers: urls
            .iter()
            .enumerate()
            .map(|(i, url)| ProviderConfig {
                name: format!("p{}", i + 1),
                kind: ProviderKind::OpenAi,
                url: Some(url.clone()),
                api_key: None,
                model: None,
            })
            .collect(),
        failover,
        logging: Default::default(),
    }
}

fn build_app(config: Config) -> axum::Router {
    let http_client = reqwest::Client::new();
    let providers = build_providers(&config.providers, &http_client);
    let policy = FailoverPolicy::from_config(&config.failover);
    let failover_router = FailoverRouter::new(providers, policy);

    let state = AppState {
        router: Arc::new(failover_router),
        config: Arc::new(config),
        key_sources: Arc::new(Vec::new()),
        db: None,
    };

    create_router(state)
}

/// A well-formed chat completion body with the given content.
fn completion_json(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    })
}

/// Mount a mock that always answers POST /chat/completions with `template`.
async fn mount_always(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Mount a mock that answers `n` times with `template`, then stops matching
/// so later-mounted mocks take over.
async fn mount_n_times(server: &MockServer, template: ResponseTemplate, n: u64) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .up_to_n_times(n)
        .mount(server)
        .await;
}

async fn hits(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |r| r.len())
}

/// POST a generation request and return (status, headers, json body).
async fn post_generate(
    app: axum::Router,
    body: serde_json::Value,
) -> (http::StatusCode, http::HeaderMap, serde_json::Value) {
    let request = Request::post("/v1/generate")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, headers, json)
}

// ──────────────────────────────────────────────────
// Test 1: Primary success on first attempt
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_primary_success_single_attempt() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(200).set_body_json(completion_json("  hello  ")))
        .await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("nope")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(2, true),
    ));

    let (status, headers, body) =
        post_generate(app, serde_json::json!({"prompt": "say hello"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["text"], "hello", "completion text should be trimmed");
    assert_eq!(body["provider"], "p1");
    assert_eq!(body["total_attempts"], 1);
    assert_eq!(body["usage"]["prompt_tokens"], 5);
    assert_eq!(body["usage"]["completion_tokens"], 7);

    assert_eq!(headers.get("x-backstop-provider").unwrap(), "p1");
    assert_eq!(headers.get("x-backstop-attempts").unwrap(), "1");
    assert!(headers.get("x-backstop-latency-ms").is_some());
    let request_id = headers.get("x-backstop-request-id").unwrap().to_str().unwrap();
    assert!(
        uuid::Uuid::parse_str(request_id).is_ok(),
        "request id should be a UUID, got: {}",
        request_id
    );

    assert_eq!(hits(&primary).await, 1);
    assert_eq!(hits(&fallback).await, 0, "fallback must not be contacted");
}

// ──────────────────────────────────────────────────
// Test 2: Transient exhaustion on primary, fallback serves
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_transient_exhaustion_fails_over() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(503).set_body_string("overloaded")).await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("rescued")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(2, true),
    ));

    let (status, headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["text"], "rescued");
    assert_eq!(body["provider"], "p2");
    assert_eq!(body["total_attempts"], 3, "2 on primary + 1 on fallback");
    assert_eq!(headers.get("x-backstop-attempts").unwrap(), "3");

    assert_eq!(hits(&primary).await, 2, "primary gets its full retry budget");
    assert_eq!(hits(&fallback).await, 1);
}

// ──────────────────────────────────────────────────
// Test 3: Fatal auth error fails over without retrying
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_fatal_auth_fails_over_immediately() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(
        &primary,
        ResponseTemplate::new(401)
            .set_body_json(serde_json::json!({"error": {"message": "Invalid API key"}})),
    )
    .await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("ok")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(3, true),
    ));

    let (status, _headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["provider"], "p2");
    assert_eq!(body["total_attempts"], 2);
    assert_eq!(
        hits(&primary).await,
        1,
        "auth failures must not be retried on the same provider"
    );
}

// ──────────────────────────────────────────────────
// Test 4: All providers exhausted -> 503 with per-provider report
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_all_providers_exhausted_returns_503_with_report() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(503).set_body_string("down")).await;
    mount_always(&fallback, ResponseTemplate::new(500).set_body_string("broken")).await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(2, true),
    ));

    let (status, headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 503);
    assert_eq!(body["error"]["type"], "all_providers_exhausted");
    assert_eq!(body["error"]["code"], 503);
    assert_eq!(body["error"]["total_attempts"], 4);

    let providers = body["error"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2, "one report entry per provider attempted");
    assert_eq!(providers[0]["provider"], "p1");
    assert_eq!(providers[0]["attempts"], 2);
    assert_eq!(providers[0]["error_kind"], "upstream_error");
    assert_eq!(providers[1]["provider"], "p2");
    assert_eq!(providers[1]["attempts"], 2);

    assert_eq!(headers.get("x-backstop-attempts").unwrap(), "4");
    assert!(
        headers.get("x-backstop-provider").is_none(),
        "no provider served, so no provider header"
    );

    assert_eq!(hits(&primary).await, 2);
    assert_eq!(hits(&fallback).await, 2);
}

// ──────────────────────────────────────────────────
// Test 5: Failover disabled -> only the primary is attempted
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_failover_disabled_stops_after_primary() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(503).set_body_string("down")).await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("unused")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(2, false),
    ));

    let (status, _headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 503);
    let providers = body["error"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1, "report covers only the primary");
    assert_eq!(providers[0]["provider"], "p1");
    assert_eq!(hits(&fallback).await, 0, "fallback exists but is never tried");
}

// ──────────────────────────────────────────────────
// Test 6: Empty prompt rejected before any provider call
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_empty_prompt_rejected_without_provider_calls() {
    let primary = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(200).set_body_json(completion_json("unused")))
        .await;

    let app = build_app(test_config(&[primary.uri()], fast_failover(2, true)));

    let (status, headers, body) =
        post_generate(app, serde_json::json!({"prompt": "   \n\t  "})).await;

    assert_eq!(status, 400);
    assert_eq!(body["error"]["type"], "validation_error");
    assert!(headers.get("x-backstop-attempts").is_none());
    assert_eq!(hits(&primary).await, 0, "validation must precede provider calls");
}

// ──────────────────────────────────────────────────
// Test 7: Malformed 2xx body counts as a transient failure
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_malformed_success_body_is_transient() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    mount_always(
        &primary,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})),
    )
    .await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("good")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(2, true),
    ));

    let (status, _headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["provider"], "p2");
    assert_eq!(body["total_attempts"], 3);
    assert_eq!(
        hits(&primary).await,
        2,
        "undecodable success bodies consume the retry budget like a 5xx"
    );
}

// ──────────────────────────────────────────────────
// Test 8: 429 is transient; recovery within budget stays on primary
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_rate_limited_recovers_within_budget() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    // First two attempts hit the rate limit, the third succeeds.
    mount_n_times(
        &primary,
        ResponseTemplate::new(429).set_body_string("slow down"),
        2,
    )
    .await;
    mount_always(&primary, ResponseTemplate::new(200).set_body_json(completion_json("finally")))
        .await;
    mount_always(&fallback, ResponseTemplate::new(200).set_body_json(completion_json("unused")))
        .await;

    let app = build_app(test_config(
        &[primary.uri(), fallback.uri()],
        fast_failover(3, true),
    ));

    let (status, _headers, body) = post_generate(app, serde_json::json!({"prompt": "hi"})).await;

    assert_eq!(status, 200);
    assert_eq!(body["text"], "finally");
    assert_eq!(body["provider"], "p1");
    assert_eq!(body["total_attempts"], 3);
    assert_eq!(hits(&primary).await, 3);
    assert_eq!(hits(&fallback).await, 0);
}

// ──────────────────────────────────────────────────
// Test 9: Body with no prompt field never reaches the router
// ──────────────────────────────────────────────────
#[tokio::test]
async fn test_missing_prompt_field_is_client_error() {
    let primary = MockServer::start().await;
    mount_always(&primary, ResponseTemplate::new(200).set_body_json(completion_json("unused")))
        .await;

    let app = build_app(test_config(&[primary.uri()], fast_failover(2, true)));

    let (status, _headers, _body) = post_generate(app, serde_json::json!({"echo": "hi"})).await;

    assert!(status.is_client_error(), "got {}", status);
    assert_eq!(hits(&primary).await, 0);
}
