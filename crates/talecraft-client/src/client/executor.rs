use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};

use crate::auth::{AuthProvider, Credential};
use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::error::{status_message, transport_error, ApiError, TRANSIENT_STATUSES};

/// Upper bound for reading the body of an error response
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(10);

/// One request/response exchange, built per call and consumed by the executor
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub cancel: Option<CancelToken>,
    pub accept: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            timeout: None,
            max_retries: None,
            cancel: None,
            accept: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }
}

/// Retry bookkeeping for a single `execute` call
#[derive(Debug)]
pub struct RetryState {
    attempt: u32,
    max_retries: u32,
    last_error: Option<ApiError>,
    next_delay: Duration,
    refresh_pending: bool,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
            last_error: None,
            next_delay: Duration::ZERO,
            refresh_pending: false,
        }
    }

    /// Zero-based index of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_retries
    }

    fn schedule(&mut self, error: ApiError, delay: Duration) {
        self.last_error = Some(error);
        self.next_delay = delay;
    }

    fn schedule_refresh(&mut self, delay: Duration) {
        self.schedule(ApiError::AuthExpired, delay);
        self.refresh_pending = true;
    }

    fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_pending)
    }

    fn advance(&mut self) {
        self.attempt += 1;
    }
}

/// How a status code is handled by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Transient,
    Unauthorized,
    Rejected,
}

pub(crate) fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::UNAUTHORIZED {
        StatusClass::Unauthorized
    } else if TRANSIENT_STATUSES.contains(&status.as_u16()) {
        StatusClass::Transient
    } else {
        StatusClass::Rejected
    }
}

/// Result of a single network attempt
enum Attempt {
    Response(Response),
    TimedOut,
    Network(String),
    Cancelled,
}

/// Wraps a request/response exchange with credentials, timeout and retries
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    auth: Arc<dyn AuthProvider>,
}

impl RequestExecutor {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { http, config, auth }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute `spec`, retrying transient failures per the configured backoff.
    ///
    /// Returns the first 2xx response. Total attempts are `max_retries + 1`;
    /// a 401 shares that budget and triggers exactly one credential refresh,
    /// followed by the fixed auth delay when attempts remain.
    pub async fn execute(&self, spec: RequestSpec) -> Result<Response, ApiError> {
        let url = self.config.url(&spec.path);
        let timeout = spec.timeout.unwrap_or(self.config.default_timeout);
        let cancel = spec.cancel.clone().unwrap_or_default();
        let mut state = RetryState::new(spec.max_retries.unwrap_or(self.config.max_retries));

        loop {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }

            let credential = if state.take_refresh() {
                match cancellable(&cancel, self.auth.refresh()).await? {
                    Ok(credential) => Some(credential),
                    Err(e) => {
                        log::warn!("{}; continuing without credentials", e);
                        None
                    }
                }
            } else {
                cancellable(&cancel, self.auth.current_token()).await?
            };

            talecraft_logging::log_request(
                spec.method.as_str(),
                &url,
                spec.body.as_ref(),
                credential.as_ref().map(|c| c.token()),
                state.attempt(),
                self.config.verbose,
            );

            let response = match self.send(&spec, &url, timeout, credential.as_ref(), &cancel).await {
                Attempt::Cancelled => return Err(ApiError::Cancelled),
                Attempt::TimedOut => {
                    if !state.has_attempts_left() {
                        return Err(ApiError::Timeout);
                    }
                    let delay = self.config.backoff.delay(state.attempt());
                    log::warn!("Request timeout, retrying in {}ms...", delay.as_millis());
                    state.schedule(ApiError::Timeout, delay);
                    None
                }
                Attempt::Network(message) => {
                    if !state.has_attempts_left() {
                        return Err(ApiError::NetworkUnavailable { message });
                    }
                    let delay = self.config.backoff.delay(state.attempt());
                    log::warn!("Network error ({}), retrying in {}ms...", message, delay.as_millis());
                    state.schedule(ApiError::NetworkUnavailable { message }, delay);
                    None
                }
                Attempt::Response(response) => Some(response),
            };

            if let Some(response) = response {
                let status = response.status();
                talecraft_logging::log_response_status(&status, response.headers(), self.config.verbose);

                match classify_status(status) {
                    StatusClass::Success => return Ok(response),
                    StatusClass::Unauthorized => {
                        if !state.has_attempts_left() {
                            // One refresh per 401, the last one included.
                            if let Err(e) = cancellable(&cancel, self.auth.refresh()).await? {
                                log::warn!("{}", e);
                            }
                            return Err(ApiError::AuthExpired);
                        }
                        log::info!("Got 401, refreshing credential and retrying...");
                        state.schedule_refresh(self.config.auth_retry_delay);
                    }
                    StatusClass::Transient => {
                        if !state.has_attempts_left() {
                            let message = read_error_detail(response, &cancel).await;
                            return Err(ApiError::ServiceUnavailable {
                                status: status.as_u16(),
                                message,
                            });
                        }
                        let delay = self.config.backoff.delay(state.attempt());
                        log::warn!(
                            "Request failed ({}), retrying in {}ms...",
                            status.as_u16(),
                            delay.as_millis()
                        );
                        state.schedule(
                            ApiError::ServiceUnavailable {
                                status: status.as_u16(),
                                message: None,
                            },
                            delay,
                        );
                    }
                    StatusClass::Rejected => {
                        let detail = read_error_detail(response, &cancel).await;
                        return Err(ApiError::RequestRejected {
                            status: status.as_u16(),
                            message: status_message(status.as_u16(), detail.as_deref()),
                        });
                    }
                }
            }

            cancellable(&cancel, tokio::time::sleep(state.next_delay())).await?;
            state.advance();
        }
    }

    async fn send(
        &self,
        spec: &RequestSpec,
        url: &str,
        timeout: Duration,
        credential: Option<&Credential>,
        cancel: &CancelToken,
    ) -> Attempt {
        let mut builder = self
            .http
            .request(spec.method.clone(), url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(accept) = &spec.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }
        if let Some(credential) = credential {
            builder = builder.bearer_auth(credential.token());
        }
        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }

        // Dropping the in-flight future on cancel closes the connection.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Attempt::Cancelled,
            result = tokio::time::timeout(timeout, builder.send()) => match result {
                Err(_) => Attempt::TimedOut,
                Ok(Ok(response)) => Attempt::Response(response),
                Ok(Err(e)) => match transport_error(&e) {
                    ApiError::Timeout => Attempt::TimedOut,
                    _ => Attempt::Network(e.to_string()),
                },
            },
        }
    }
}

/// Race `future` against cancellation
pub(crate) async fn cancellable<F: Future>(cancel: &CancelToken, future: F) -> Result<F::Output, ApiError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        output = future => Ok(output),
    }
}

/// Pull a `detail` message out of an error body, if the server sent one
async fn read_error_detail(response: Response, cancel: &CancelToken) -> Option<String> {
    let body = tokio::time::timeout(ERROR_BODY_TIMEOUT, cancellable(cancel, response.text()))
        .await
        .ok()?
        .ok()?
        .ok()?;

    let value: serde_json::Value = serde_json::from_str(&body).ok()?;
    match value.get("detail") {
        Some(serde_json::Value::String(detail)) => Some(detail.clone()),
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => value
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string()),
    }
}
