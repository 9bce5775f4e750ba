#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use talecraft_client::{AuthError, AuthProvider, BackoffPolicy, ClientConfig, Credential};
use wiremock::matchers::*;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Canned stream from a healthy generation
pub const LIGHTHOUSE_STREAM: &str = concat!(
    "data: {\"type\":\"start\"}\n\n",
    "data: {\"type\":\"chunk\",\"text\":\"The \"}\n\n",
    "data: {\"type\":\"chunk\",\"text\":\"lighthouse \"}\n\n",
    "data: {\"type\":\"chunk\",\"text\":\"groaned.\"}\n\n",
    "data: {\"type\":\"done\",\"fullText\":\"The lighthouse groaned.\"}\n\n",
);

/// Mock story-generation service
pub struct StoryMockServer {
    server: MockServer,
}

impl StoryMockServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Config pointed at the mock with millisecond-scale delays
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.uri())
            .with_backoff(BackoffPolicy::without_jitter(Duration::from_millis(10), Duration::from_millis(50)))
            .with_auth_retry_delay(Duration::from_millis(10))
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5))
    }

    /// Requests the server has seen so far
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.map(|r| r.len()).unwrap_or(0)
    }

    /// JSON body of the most recent request
    pub async fn last_request_json(&self) -> Option<serde_json::Value> {
        let requests = self.server.received_requests().await?;
        requests.last()?.body_json().ok()
    }

    /// Value of `name` on the most recent request
    pub async fn last_request_header(&self, name: &str) -> Option<String> {
        let requests = self.server.received_requests().await?;
        let value = requests.last()?.headers.get(name)?;
        value.to_str().ok().map(|v| v.to_string())
    }

    pub async fn mock_generate_success(&self, texts: &[&str]) {
        let options: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                json!({
                    "id": format!("opt-{}", i + 1),
                    "text": text,
                    "tone": "Mysterious",
                    "length": "Short"
                })
            })
            .collect();

        Mock::given(method("POST"))
            .and(path("/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(options)))
            .mount(&self.server)
            .await;
    }

    /// `status` for the first `times` calls to `route`, then whatever else is mounted
    pub async fn mock_failures(&self, http_method: &str, route: &str, status: u16, times: u64) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"detail": "try later"})))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_error(&self, http_method: &str, route: &str, status: u16, detail: &str) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"detail": detail})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_stream(&self, body: &str) {
        Mock::given(method("POST"))
            .and(path("/generate/stream"))
            .and(header("accept", "text/event-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// Stream endpoint that only answers after `delay`
    pub async fn mock_slow_stream(&self, body: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/generate/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_health(&self, model_loaded: bool) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "healthy",
                "model": "gpt2-story",
                "model_loaded": model_loaded,
                "device": "cpu"
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept only `token` on `route`; everything else is a 401
    pub async fn mock_requires_token(&self, http_method: &str, route: &str, token: &str) {
        Mock::given(method(http_method))
            .and(path(route))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .with_priority(1)
            .mount(&self.server)
            .await;

        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "token expired"})))
            .with_priority(2)
            .mount(&self.server)
            .await;
    }
}

/// Auth provider that hands out `stale` until refreshed, counting refreshes
pub struct CountingAuth {
    refreshes: AtomicUsize,
    fresh_token: String,
}

impl CountingAuth {
    pub fn new(fresh_token: &str) -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
            fresh_token: fresh_token.to_string(),
        })
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for CountingAuth {
    async fn current_token(&self) -> Option<Credential> {
        if self.refreshes() == 0 {
            Some(Credential::new("stale"))
        } else {
            Some(Credential::new(self.fresh_token.clone()))
        }
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(self.fresh_token.clone()))
    }
}
