use anyhow::{bail, Result};
use colored::Colorize;

use super::setup::AppConfig;

pub async fn run_health(config: &AppConfig) -> Result<()> {
    let client = config.client()?;
    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => {
            eprintln!(
                "{} {} ({})",
                "✗".bright_red(),
                e.user_message(),
                client.config().base_url
            );
            return Err(e.into());
        }
    };

    let model = health.model.as_deref().unwrap_or("unknown");
    let device = health.device.as_deref().unwrap_or("unknown");

    if health.model_loaded {
        println!("{} {} - model {} on {}", "✓".bright_green(), health.status, model.bold(), device);
        Ok(())
    } else {
        println!("{} {} - model {} not loaded", "!".bright_yellow(), health.status, model.bold());
        bail!("Model is not loaded")
    }
}
