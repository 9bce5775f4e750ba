use thiserror::Error;

/// Statuses that are retried with backoff before giving up
pub const TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Failure kinds surfaced by the client.
///
/// Transient kinds (`Timeout`, `NetworkUnavailable`, `ServiceUnavailable`) only
/// reach the caller once the retry budget is spent. `Cancelled` is a deliberate
/// outcome, not a failure, and should never be shown to the user as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("network unavailable: {message}")]
    NetworkUnavailable { message: String },

    #[error("authentication expired")]
    AuthExpired,

    #[error("service unavailable (status {status})")]
    ServiceUnavailable { status: u16, message: Option<String> },

    #[error("request rejected with status {status}: {message}")]
    RequestRejected { status: u16, message: String },

    #[error("stream protocol error: {message}")]
    StreamProtocol { message: String },

    #[error("generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("generation cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// Errors the UI should present with a "try again" affordance
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::NetworkUnavailable { .. } | ApiError::ServiceUnavailable { .. }
        )
    }

    /// HTTP status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Timeout => Some(408),
            ApiError::AuthExpired => Some(401),
            ApiError::ServiceUnavailable { status, .. } => Some(*status),
            ApiError::RequestRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for display in the editor
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Timeout => "Request timeout. Please check your connection.".to_string(),
            ApiError::NetworkUnavailable { .. } => "Network error. Please check your connection.".to_string(),
            ApiError::AuthExpired => "Session expired. Please sign in again.".to_string(),
            ApiError::ServiceUnavailable { status, message } => status_message(*status, message.as_deref()),
            ApiError::RequestRejected { message, .. } => message.clone(),
            ApiError::StreamProtocol { .. } => "The generation stream ended unexpectedly. Please try again.".to_string(),
            ApiError::GenerationFailed { message } => message.clone(),
            ApiError::InvalidResponse { .. } => "An unexpected error occurred.".to_string(),
            ApiError::InvalidConfig { message } => message.clone(),
            ApiError::Cancelled => String::new(),
        }
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        ApiError::NetworkUnavailable { message: message.into() }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ApiError::StreamProtocol { message: message.into() }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        ApiError::InvalidResponse { message: message.into() }
    }
}

/// Map a transport error raised while sending or while reading a body
pub(crate) fn transport_error(err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::network(err.to_string())
    }
}

/// Human readable message for a status, preferring the server's own detail
pub fn status_message(status: u16, server_message: Option<&str>) -> String {
    if let Some(message) = server_message.filter(|m| !m.trim().is_empty()) {
        return message.to_string();
    }

    match status {
        400 => "Invalid request. Please check your input.",
        401 => "Session expired. Please sign in again.",
        403 => "You don't have permission to perform this action.",
        404 => "Resource not found.",
        408 => "Request timeout. Please try again.",
        429 => "Too many requests. Please wait a moment.",
        500 => "Server error. We're working on it.",
        502 => "Server temporarily unavailable. Please try again.",
        503 => "Service unavailable. Please try again later.",
        504 => "Request timeout. Please try again.",
        _ => "An unexpected error occurred.",
    }
    .to_string()
}
