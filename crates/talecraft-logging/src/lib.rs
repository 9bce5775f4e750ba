// Logging module - verbose request, response and stream diagnostics
pub mod request_logger;

// Re-export request logging functions
pub use request_logger::{
    describe_url,
    log_request,
    log_response,
    log_response_status,
    log_stream_record,
    redact_token,
};

/// Safely truncate a string to a maximum number of characters
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        // Reserve space for "..." suffix
        let trunc_chars = if max_chars >= 3 { max_chars - 3 } else { 0 };
        format!("{}...", s.chars().take(trunc_chars).collect::<String>())
    }
}
