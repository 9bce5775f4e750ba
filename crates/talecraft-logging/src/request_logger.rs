use colored::Colorize;

use crate::safe_truncate;

/// Longest body printed before truncation
const MAX_BODY_CHARS: usize = 5000;

/// Longest stream record printed before truncation
const MAX_RECORD_CHARS: usize = 200;

/// Show only the first few characters of a bearer token
pub fn redact_token(token: &str) -> String {
    format!("{}***", token.chars().take(10).collect::<String>())
}

/// Describe a URL as `host:port (scheme)`, falling back to the raw string
pub fn describe_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed_url) => {
            let port = parsed_url.port().map(|p| p.to_string()).unwrap_or_else(|| {
                if parsed_url.scheme() == "https" {
                    "443 (default)".to_string()
                } else {
                    "80 (default)".to_string()
                }
            });
            format!(
                "{}:{} ({})",
                parsed_url.host_str().unwrap_or("unknown"),
                port,
                parsed_url.scheme()
            )
        }
        Err(_) => url.to_string(),
    }
}

/// Log HTTP request details for debugging (console output)
pub fn log_request(
    method: &str,
    url: &str,
    body: Option<&serde_json::Value>,
    token: Option<&str>,
    attempt: u32,
    verbose: bool,
) {
    log::debug!("{} {} (attempt {})", method, url, attempt + 1);

    if !verbose {
        return;
    }

    eprintln!("\n{}", "═".repeat(80).bright_cyan());
    eprintln!("{}", "🔍 HTTP REQUEST DEBUG".bright_cyan().bold());
    eprintln!("{}", "═".repeat(80).bright_cyan());

    eprintln!("{}: {} {}", "Request".bright_yellow(), method, url);
    eprintln!("{}: {}", "Endpoint".bright_yellow(), describe_url(url));
    eprintln!("{}: {}", "Attempt".bright_yellow(), attempt + 1);

    eprintln!("\n{}", "Headers:".bright_yellow());
    eprintln!("  Content-Type: application/json");
    match token {
        Some(token) => eprintln!("  Authorization: Bearer {}", redact_token(token)),
        None => eprintln!("  Authorization: {}", "(anonymous)".bright_black()),
    }

    if let Some(body) = body {
        eprintln!("\n{}", "Request Body:".bright_yellow());
        match serde_json::to_string_pretty(body) {
            Ok(json) => {
                // Truncate very long prompts for readability
                if json.chars().count() > MAX_BODY_CHARS {
                    eprintln!("{}", safe_truncate(&json, MAX_BODY_CHARS));
                    eprintln!("\n{}", format!("... (truncated, total {} bytes)", json.len()).bright_black());
                } else {
                    eprintln!("{}", json);
                }
            }
            Err(e) => eprintln!("{}", format!("Error serializing request: {}", e).red()),
        }
    }

    eprintln!("{}", "═".repeat(80).bright_cyan());
}

/// Log only the status line and headers of a response whose body is consumed elsewhere
pub fn log_response_status(status: &reqwest::StatusCode, headers: &reqwest::header::HeaderMap, verbose: bool) {
    log::debug!("response status {}", status.as_u16());

    if !verbose {
        return;
    }

    eprintln!(
        "{}: {} {}",
        "📥 Status".bright_green(),
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    for (name, value) in headers.iter() {
        if let Ok(val_str) = value.to_str() {
            eprintln!("  {}: {}", name.as_str().bright_white(), val_str);
        }
    }
}

/// Log HTTP response details for debugging (console output)
pub fn log_response(status: &reqwest::StatusCode, headers: &reqwest::header::HeaderMap, body: &str, verbose: bool) {
    if !verbose {
        log::debug!("response status {} ({} bytes)", status.as_u16(), body.len());
        return;
    }

    eprintln!("\n{}", "═".repeat(80).bright_green());
    eprintln!("{}", "📥 HTTP RESPONSE DEBUG".bright_green().bold());
    eprintln!("{}", "═".repeat(80).bright_green());

    log_response_status(status, headers, verbose);

    eprintln!("\n{}", "Response Body:".bright_yellow());
    // Try to pretty-print JSON, fall back to raw text
    let rendered = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json_val| serde_json::to_string_pretty(&json_val).ok())
        .unwrap_or_else(|| body.to_string());

    if rendered.chars().count() > MAX_BODY_CHARS {
        eprintln!("{}", safe_truncate(&rendered, MAX_BODY_CHARS));
        eprintln!("\n{}", format!("... (truncated, total {} bytes)", rendered.len()).bright_black());
    } else {
        eprintln!("{}", rendered);
    }

    eprintln!("{}", "═".repeat(80).bright_green());
}

/// Log a decoded stream record for debugging (console output)
pub fn log_stream_record(record_num: usize, data: &str, verbose: bool) {
    log::trace!("stream record #{}: {} bytes", record_num, data.len());

    if !verbose {
        return;
    }

    eprintln!("{}", format!("📦 Stream Record #{}: {}", record_num,
        if data.chars().count() > MAX_RECORD_CHARS {
            format!("{}... ({} bytes)", safe_truncate(data, MAX_RECORD_CHARS), data.len())
        } else {
            data.to_string()
        }
    ).bright_black());
}
