//! Wire-level tests for the provider adapters against wiremock upstreams.
//!
//! Covers request shaping (model defaults, message list, auth header),
//! response parsing (trimming, usage, empty content), and the HTTP status
//! classification that drives failover decisions.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use backstop::config::{ApiKey, ProviderConfig, ProviderKind};
use backstop::provider::types::GenerationRequest;
use backstop::provider::ProviderClient;

fn provider_config(
    name: &str,
    kind: ProviderKind,
    url: &str,
    api_key: Option<&str>,
    model: Option<&str>,
) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        kind,
        url: Some(url.to_string()),
        api_key: api_key.map(ApiKey::from),
        model: model.map(str::to_string),
    }
}

fn openai_client(url: &str, api_key: Option<&str>) -> ProviderClient {
    ProviderClient::from_config(
        &provider_config("openai-test", ProviderKind::OpenAi, url, api_key, None),
        reqwest::Client::new(),
    )
}

fn together_client(url: &str) -> ProviderClient {
    ProviderClient::from_config(
        &provider_config("together-test", ProviderKind::Together, url, None, None),
        reqwest::Client::new(),
    )
}

fn completion_body(content: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 11, "completion_tokens": 3, "total_tokens": 14}
    })
}

async fn mount_completions(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(template)
        .mount(server)
        .await;
}

// ──────────────────────────────────────────────────
// Parsing
// ──────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_parses_completion_and_usage() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(200).set_body_json(completion_body("  trimmed output\n".into())),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    let completion = client.generate(&GenerationRequest::new("hi")).await.unwrap();

    assert_eq!(completion.text, "trimmed output");
    let usage = completion.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 11);
    assert_eq!(usage.completion_tokens, 3);
    assert_eq!(usage.total_tokens, 14);
}

#[tokio::test]
async fn test_openai_missing_content_yields_empty_text() {
    let server = MockServer::start().await;
    // Assistant message with no content field at all -- a legitimate,
    // if empty, completion.
    mount_completions(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant"}, "finish_reason": "stop"}],
            "usage": null
        })),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    let completion = client.generate(&GenerationRequest::new("hi")).await.unwrap();

    assert_eq!(completion.text, "");
    assert!(completion.usage.is_none());
}

#[tokio::test]
async fn test_openai_empty_choices_is_malformed() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "malformed_response");
    assert!(err.is_transient(), "malformed bodies must allow failover");
}

#[tokio::test]
async fn test_openai_undecodable_body_is_malformed() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(200).set_body_string("<html>load balancer error page</html>"),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "malformed_response");
    assert!(err.is_transient());
}

// ──────────────────────────────────────────────────
// Request shaping
// ──────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_sends_bearer_auth_and_default_model() {
    let server = MockServer::start().await;
    // The mock only matches when the auth header and payload are right, so
    // a successful generate proves the request shape.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test-123"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok".into())))
        .mount(&server)
        .await;

    let client = openai_client(&server.uri(), Some("sk-test-123"));
    let completion = client.generate(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(completion.text, "ok");
}

#[tokio::test]
async fn test_openai_omits_auth_header_without_key() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(200).set_body_json(completion_body("ok".into())),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    client.generate(&GenerationRequest::new("hi")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0].headers.get("authorization").is_none(),
        "no key configured, so no Authorization header"
    );
}

#[tokio::test]
async fn test_openai_system_message_precedes_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok".into())))
        .mount(&server)
        .await;

    let client = openai_client(&server.uri(), None);
    let request = GenerationRequest::new("hi").with_system("be brief");
    let completion = client.generate(&request).await.unwrap();
    assert_eq!(completion.text, "ok");
}

#[tokio::test]
async fn test_openai_sampling_params_forwarded() {
    let server = MockServer::start().await;
    // 0.5 is exactly representable, so the JSON matches bit-for-bit.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "temperature": 0.5,
            "max_tokens": 64
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok".into())))
        .mount(&server)
        .await;

    let client = openai_client(&server.uri(), None);
    let request = GenerationRequest::new("hi")
        .with_temperature(0.5)
        .with_max_tokens(64);
    let completion = client.generate(&request).await.unwrap();
    assert_eq!(completion.text, "ok");
}

#[tokio::test]
async fn test_configured_model_overrides_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4o"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok".into())))
        .mount(&server)
        .await;

    let client = ProviderClient::from_config(
        &provider_config(
            "openai-custom",
            ProviderKind::OpenAi,
            &server.uri(),
            None,
            Some("gpt-4o"),
        ),
        reqwest::Client::new(),
    );
    let completion = client.generate(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(completion.text, "ok");
}

// ──────────────────────────────────────────────────
// Status classification
// ──────────────────────────────────────────────────

#[tokio::test]
async fn test_openai_status_classification() {
    let cases: Vec<(u16, &str, bool)> = vec![
        (400, "invalid_request", false),
        (401, "auth", false),
        (403, "auth", false),
        (404, "invalid_request", false),
        (422, "invalid_request", false),
        (429, "rate_limited", true),
        (500, "upstream_error", true),
        (502, "upstream_error", true),
        (503, "upstream_error", true),
    ];

    for (status, expected_kind, expected_transient) in cases {
        let server = MockServer::start().await;
        mount_completions(&server, ResponseTemplate::new(status).set_body_string("nope")).await;

        let client = openai_client(&server.uri(), None);
        let err = client
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), expected_kind, "status {}", status);
        assert_eq!(err.is_transient(), expected_transient, "status {}", status);
    }
}

#[tokio::test]
async fn test_openai_error_message_surfaced() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(503)
            .set_body_json(serde_json::json!({"error": {"message": "scheduled maintenance"}})),
    )
    .await;

    let client = openai_client(&server.uri(), None);
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("scheduled maintenance"),
        "vendor detail should survive: {}",
        err
    );
}

#[tokio::test]
async fn test_transport_error_is_transient() {
    // Nothing listens on port 1.
    let client = openai_client("http://127.0.0.1:1/v1", None);
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "transport");
    assert!(err.is_transient());
}

// ──────────────────────────────────────────────────
// Together adapter
// ──────────────────────────────────────────────────

#[tokio::test]
async fn test_together_parses_completion_and_default_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "mistralai/Mixtral-8x7B-Instruct-v0.1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("  mixtral says hi ".into())))
        .mount(&server)
        .await;

    let client = together_client(&server.uri());
    let completion = client.generate(&GenerationRequest::new("hi")).await.unwrap();

    assert_eq!(completion.text, "mixtral says hi");
    assert_eq!(completion.usage.unwrap().total_tokens, 14);
}

#[tokio::test]
async fn test_together_nested_error_envelope() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(500)
            .set_body_json(serde_json::json!({"error": {"message": "no capacity"}})),
    )
    .await;

    let client = together_client(&server.uri());
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "upstream_error");
    assert!(err.to_string().contains("no capacity"));
}

#[tokio::test]
async fn test_together_flat_error_message() {
    let server = MockServer::start().await;
    mount_completions(
        &server,
        ResponseTemplate::new(429).set_body_json(serde_json::json!({"message": "slow down"})),
    )
    .await;

    let client = together_client(&server.uri());
    let err = client
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "rate_limited");
    assert!(err.to_string().contains("slow down"));
}
