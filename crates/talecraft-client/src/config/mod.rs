use std::env;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::ApiError;

/// Default API URL for a locally running generation service
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default timeout for a single request attempt (until response headers)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Timeout for generations that ask for many tokens
pub const LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// `max_length` above which a generation counts as long
pub const LONG_GENERATION_THRESHOLD: u32 = 500;

/// Default retry budget for read and metadata calls
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry budget for generation calls (connection establishment only)
pub const GENERATION_MAX_RETRIES: u32 = 1;

/// Fixed wait after a 401 before retrying with a refreshed credential
pub const AUTH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Endpoint paths
pub const GENERATE_PATH: &str = "/generate";
pub const GENERATE_STREAM_PATH: &str = "/generate/stream";
pub const HEALTH_PATH: &str = "/health";

/// Environment variable names read by [`ClientConfig::from_env`]
pub const ENV_API_URL: &str = "TALECRAFT_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "TALECRAFT_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "TALECRAFT_MAX_RETRIES";
pub const ENV_VERBOSE: &str = "TALECRAFT_VERBOSE";

/// Client configuration, passed explicitly to each client instance
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub default_timeout: Duration,
    pub long_timeout: Duration,
    pub long_generation_threshold: u32,
    pub max_retries: u32,
    pub generation_max_retries: u32,
    pub auth_retry_delay: Duration,
    pub backoff: BackoffPolicy,
    pub verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            long_timeout: LONG_TIMEOUT,
            long_generation_threshold: LONG_GENERATION_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            generation_max_retries: GENERATION_MAX_RETRIES,
            auth_retry_delay: AUTH_RETRY_DELAY,
            backoff: BackoffPolicy::default(),
            verbose: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            ..Self::default()
        }
    }

    /// Defaults overridden by `TALECRAFT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            config.base_url = normalize_base_url(&url);
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS).and_then(|s| s.trim().parse::<u64>().ok()) {
            config.default_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES).and_then(|s| s.trim().parse::<u32>().ok()) {
            config.max_retries = retries;
        }
        if let Some(verbose) = lookup(ENV_VERBOSE) {
            config.verbose = matches!(verbose.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        config
    }

    pub fn with_timeouts(mut self, default_timeout: Duration, long_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self.long_timeout = long_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32, generation_max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self.generation_max_retries = generation_max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_auth_retry_delay(mut self, delay: Duration) -> Self {
        self.auth_retry_delay = delay;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Per-attempt timeout for a generation asking for `max_length` tokens
    pub fn generation_timeout(&self, max_length: u32) -> Duration {
        if max_length > self.long_generation_threshold {
            self.long_timeout
        } else {
            self.default_timeout
        }
    }

    /// Absolute URL for an endpoint path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        match reqwest::Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
            Ok(url) => Err(ApiError::InvalidConfig {
                message: format!("unsupported URL scheme '{}' in {}", url.scheme(), self.base_url),
            }),
            Err(e) => Err(ApiError::InvalidConfig {
                message: format!("invalid base URL '{}': {}", self.base_url, e),
            }),
        }
    }
}

/// Normalize a base URL: trim whitespace and trailing slashes, default to http
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');

    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
