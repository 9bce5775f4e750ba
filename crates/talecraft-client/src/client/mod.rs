use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use talecraft_types::{GenerateRequest, GeneratedOption, HealthStatus, StreamMessage, DEFAULT_OPTION_COUNT};

use crate::auth::{Anonymous, AuthProvider, CoalescingAuth};
use crate::cancel::CancelToken;
use crate::config::{ClientConfig, GENERATE_PATH, GENERATE_STREAM_PATH, HEALTH_PATH};
use crate::error::{transport_error, ApiError};
use crate::stream::{ByteStream, StreamDecoder};

pub mod executor;

pub use executor::{RequestExecutor, RequestSpec, RetryState};

const EVENT_STREAM: &str = "text/event-stream";

/// Opens a generation stream. Implemented by [`GenerationClient`]; tests and
/// embedders may supply their own source.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open a streaming generation and return its raw body.
    ///
    /// Establishing the connection may be retried; reading the body never is.
    async fn open_stream(&self, request: &GenerateRequest, cancel: &CancelToken) -> Result<ByteStream, ApiError>;
}

/// Client for the story-generation service
#[derive(Clone)]
pub struct GenerationClient {
    executor: RequestExecutor,
    config: Arc<ClientConfig>,
}

impl GenerationClient {
    pub fn new(config: ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, ApiError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let config = Arc::new(config);
        let auth: Arc<dyn AuthProvider> = Arc::new(CoalescingAuth::new(auth));
        log::debug!("generation client for {}", config.base_url);

        Ok(Self {
            executor: RequestExecutor::new(http, config.clone(), auth),
            config,
        })
    }

    /// Client that never attaches credentials
    pub fn anonymous(config: ClientConfig) -> Result<Self, ApiError> {
        Self::new(config, Arc::new(Anonymous))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run an arbitrary request through the retrying executor
    pub async fn execute(&self, spec: RequestSpec) -> Result<reqwest::Response, ApiError> {
        self.executor.execute(spec).await
    }

    /// Non-streaming generation returning every option the server produced
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<GeneratedOption>, ApiError> {
        let mut request = request.clone();
        request.count.get_or_insert(DEFAULT_OPTION_COUNT);

        let spec = RequestSpec::post(GENERATE_PATH)
            .with_json(to_json(&request)?)
            .with_timeout(self.config.generation_timeout(request.max_length))
            .with_max_retries(self.config.generation_max_retries)
            .with_cancel(cancel.clone());

        let response = self.executor.execute(spec).await?;
        let options: Vec<GeneratedOption> = read_json(response, cancel, self.config.verbose).await?;
        log::info!("received {} generated option(s)", options.len());
        Ok(options)
    }

    /// Stream a generation, invoking `on_message` for each decoded message.
    ///
    /// Returns once a `done` or `error` message was delivered. A server `error`
    /// message is delivered to `on_message`, not turned into an `Err`.
    pub async fn stream_generation<F>(
        &self,
        request: &GenerateRequest,
        cancel: &CancelToken,
        on_message: F,
    ) -> Result<(), ApiError>
    where
        F: FnMut(StreamMessage),
    {
        let body = self.open_stream(request, cancel).await?;
        StreamDecoder::new()
            .with_verbose(self.config.verbose)
            .run(body, cancel, on_message)
            .await
    }

    /// Query service health. Not retried: callers poll instead.
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let cancel = CancelToken::new();
        let spec = RequestSpec::get(HEALTH_PATH)
            .with_max_retries(0)
            .with_cancel(cancel.clone());

        let response = self.executor.execute(spec).await?;
        read_json(response, &cancel, self.config.verbose).await
    }

    /// True when the service answers and reports a loaded model
    pub async fn is_healthy(&self) -> bool {
        match self.health().await {
            Ok(health) => health.status == "healthy" && health.model_loaded,
            Err(e) => {
                log::debug!("health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl StreamSource for GenerationClient {
    async fn open_stream(&self, request: &GenerateRequest, cancel: &CancelToken) -> Result<ByteStream, ApiError> {
        // The streaming endpoint always produces a single option.
        let mut request = request.clone();
        request.count = None;

        let spec = RequestSpec::post(GENERATE_STREAM_PATH)
            .with_json(to_json(&request)?)
            .with_accept(EVENT_STREAM)
            .with_timeout(self.config.generation_timeout(request.max_length))
            .with_max_retries(self.config.generation_max_retries)
            .with_cancel(cancel.clone());

        let response = self.executor.execute(spec).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(EVENT_STREAM) {
            log::warn!("stream response has content type '{}', decoding anyway", content_type);
        }

        let mut bytes = response.bytes_stream();
        let body = stream! {
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        yield Err(transport_error(&e));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(body))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::InvalidConfig {
        message: format!("failed to encode request: {}", e),
    })
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    cancel: &CancelToken,
    verbose: bool,
) -> Result<T, ApiError> {
    let status = response.status();
    let headers = response.headers().clone();

    let body = executor::cancellable(cancel, response.text())
        .await?
        .map_err(|e| transport_error(&e))?;
    talecraft_logging::log_response(&status, &headers, &body, verbose);

    serde_json::from_str(&body).map_err(|e| {
        log::error!(
            "failed to parse response: {} ({})",
            e,
            talecraft_logging::safe_truncate(&body, 200)
        );
        ApiError::invalid_response(e.to_string())
    })
}
