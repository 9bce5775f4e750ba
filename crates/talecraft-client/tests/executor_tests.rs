mod fixtures;

use std::time::{Duration, Instant};

use fixtures::{CountingAuth, StoryMockServer};
use pretty_assertions::assert_eq;
use talecraft_client::{ApiError, BackoffPolicy, CancelToken, ClientConfig, GenerationClient, RequestSpec};
use talecraft_types::{GenerateRequest, Length, Tone};

fn request() -> GenerateRequest {
    GenerateRequest::new("The lighthouse keeper heard a knock", Tone::Mysterious, Length::Short)
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let server = StoryMockServer::new().await;
    server.mock_failures("GET", "/health", 503, 2).await;
    server.mock_health(true).await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let started = Instant::now();
    let response = client.execute(RequestSpec::get("/health")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(server.request_count().await, 3);
    // 10ms then 20ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_exhausted_budget_surfaces_service_unavailable() {
    let server = StoryMockServer::new().await;
    server.mock_error("GET", "/health", 503, "model warming up").await;

    let client = GenerationClient::anonymous(server.config().with_max_retries(3, 1)).unwrap();
    let err = client.execute(RequestSpec::get("/health")).await.unwrap_err();

    assert_eq!(
        err,
        ApiError::ServiceUnavailable {
            status: 503,
            message: Some("model warming up".to_string()),
        }
    );
    assert!(err.is_transient());
    assert_eq!(server.request_count().await, 4);
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    let server = StoryMockServer::new().await;
    server.mock_error("POST", "/generate", 400, "prompt is empty").await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let err = client.generate(&request(), &CancelToken::new()).await.unwrap_err();

    assert_eq!(
        err,
        ApiError::RequestRejected {
            status: 400,
            message: "prompt is empty".to_string(),
        }
    );
    assert_eq!(err.user_message(), "prompt is empty");
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_unauthorized_refreshes_credential_and_retries() {
    let server = StoryMockServer::new().await;
    server.mock_requires_token("POST", "/generate", "fresh").await;

    let auth = CountingAuth::new("fresh");
    let client = GenerationClient::new(server.config(), auth.clone()).unwrap();
    let options = client.generate(&request(), &CancelToken::new()).await.unwrap();

    assert!(options.is_empty());
    assert_eq!(auth.refreshes(), 1);
    assert_eq!(server.request_count().await, 2);
    assert_eq!(
        server.last_request_header("authorization").await.as_deref(),
        Some("Bearer fresh")
    );
}

#[tokio::test]
async fn test_unauthorized_shares_the_retry_budget() {
    let server = StoryMockServer::new().await;
    server.mock_error("POST", "/generate", 401, "token expired").await;

    let auth = CountingAuth::new("still-bad");
    let client = GenerationClient::new(server.config().with_max_retries(3, 2), auth.clone()).unwrap();
    let err = client.generate(&request(), &CancelToken::new()).await.unwrap_err();

    assert_eq!(err, ApiError::AuthExpired);
    // three attempts, one refresh per 401 including the last
    assert_eq!(server.request_count().await, 3);
    assert_eq!(auth.refreshes(), server.request_count().await);
}

#[tokio::test]
async fn test_generate_sends_defaults_and_parses_options() {
    let server = StoryMockServer::new().await;
    server
        .mock_generate_success(&["The knock came again.", "Nobody was there."])
        .await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let options = client.generate(&request(), &CancelToken::new()).await.unwrap();

    assert_eq!(options.len(), 2);
    assert_eq!(options[0].id, "opt-1");
    assert_eq!(options[1].text, "Nobody was there.");
    assert_eq!(options[0].tone, Tone::Mysterious);
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_generate_request_body_on_the_wire() {
    let server = StoryMockServer::new().await;
    server.mock_generate_success(&["ok"]).await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    client.generate(&request(), &CancelToken::new()).await.unwrap();

    let body = server.last_request_json().await.unwrap();
    assert_eq!(body["prompt"], "The lighthouse keeper heard a knock");
    assert_eq!(body["tone"], "Mysterious");
    assert_eq!(body["length"], "Short");
    assert_eq!(body["max_length"], 150);
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let server = StoryMockServer::new().await;
    server.mock_error("POST", "/generate", 200, "not a list").await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let err = client.generate(&request(), &CancelToken::new()).await.unwrap_err();

    assert!(matches!(err, ApiError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_cancelled_before_send_makes_no_request() {
    let server = StoryMockServer::new().await;
    server.mock_generate_success(&["never"]).await;

    let cancel = CancelToken::new();
    cancel.cancel();

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let err = client.generate(&request(), &cancel).await.unwrap_err();

    assert_eq!(err, ApiError::Cancelled);
    assert_eq!(server.request_count().await, 0);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff_sleep() {
    let server = StoryMockServer::new().await;
    server.mock_error("GET", "/health", 503, "busy").await;

    let config = server
        .config()
        .with_backoff(BackoffPolicy::without_jitter(Duration::from_secs(5), Duration::from_secs(10)));
    let client = GenerationClient::anonymous(config).unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute(RequestSpec::get("/health").with_cancel(cancel))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_attempt_timeout_surfaces_timeout() {
    let server = StoryMockServer::new().await;
    server.mock_slow_stream("", Duration::from_millis(500)).await;

    let config = server
        .config()
        .with_timeouts(Duration::from_millis(100), Duration::from_millis(100))
        .with_max_retries(3, 1);
    let client = GenerationClient::anonymous(config).unwrap();

    let err = client
        .execute(RequestSpec::post("/generate/stream").with_max_retries(1))
        .await
        .unwrap_err();

    assert_eq!(err, ApiError::Timeout);
}

#[tokio::test]
async fn test_unreachable_host_is_network_unavailable() {
    let config = ClientConfig::new("http://127.0.0.1:1").with_max_retries(0, 0);
    let client = GenerationClient::anonymous(config).unwrap();

    let err = client.execute(RequestSpec::get("/health")).await.unwrap_err();
    assert!(matches!(err, ApiError::NetworkUnavailable { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let server = StoryMockServer::new().await;
    server.mock_health(true).await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    let health = client.health().await.unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.model.as_deref(), Some("gpt2-story"));
    assert!(health.model_loaded);
    assert!(client.is_healthy().await);
}

#[tokio::test]
async fn test_health_is_not_retried() {
    let server = StoryMockServer::new().await;
    server.mock_error("GET", "/health", 503, "down").await;

    let client = GenerationClient::anonymous(server.config()).unwrap();
    assert!(!client.is_healthy().await);
    assert_eq!(server.request_count().await, 1);
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let config = ClientConfig {
        base_url: "ftp://stories.example.com".to_string(),
        ..ClientConfig::default()
    };
    assert!(matches!(
        GenerationClient::anonymous(config),
        Err(ApiError::InvalidConfig { .. })
    ));
}
