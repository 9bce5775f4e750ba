use std::sync::Arc;

use anyhow::{bail, Context, Result};
use talecraft_client::{Anonymous, AuthProvider, ClientConfig, GenerationClient, StaticToken};
use talecraft_types::{GenerateRequest, Length, Tone};

use crate::cli::{Cli, PromptArgs};

/// Application configuration derived from CLI arguments and environment
pub struct AppConfig {
    pub client_config: ClientConfig,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppConfig {
    pub fn client(&self) -> Result<GenerationClient> {
        GenerationClient::new(self.client_config.clone(), self.auth.clone())
            .with_context(|| format!("Failed to create client for {}", self.client_config.base_url))
    }
}

/// Set up application configuration from CLI arguments.
///
/// Precedence: CLI flags > TALECRAFT_* env > defaults
pub fn setup_from_cli(cli: &Cli) -> Result<AppConfig> {
    let mut client_config = ClientConfig::from_env();

    if let Some(url) = &cli.api_url {
        client_config.base_url = talecraft_client::normalize_base_url(url);
    }
    if cli.verbose {
        client_config.verbose = true;
    }
    client_config.validate().context("Invalid API URL")?;

    let auth: Arc<dyn AuthProvider> = match cli.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Arc::new(StaticToken::new(token)),
        _ => Arc::new(Anonymous),
    };

    Ok(AppConfig { client_config, auth })
}

/// Build the wire request from prompt arguments
pub fn build_request(args: &PromptArgs) -> Result<GenerateRequest> {
    if args.prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }

    let request = GenerateRequest::new(args.prompt.clone(), Tone::from_str(&args.tone), Length::from_str(&args.length))
        .with_max_length(args.max_length)
        .with_sampling(args.temperature, args.top_p);
    Ok(request)
}
