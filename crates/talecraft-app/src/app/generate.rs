use anyhow::Result;
use colored::Colorize;
use talecraft_client::CancelToken;

use super::setup::{build_request, AppConfig};
use crate::cli::PromptArgs;

/// Run a non-streaming generation and print every option
pub async fn run_generate(config: &AppConfig, args: &PromptArgs, count: u32) -> Result<()> {
    let client = config.client()?;
    let request = build_request(args)?.with_count(count.max(1));

    let options = match client.generate(&request, &CancelToken::new()).await {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red().bold(), e.user_message());
            return Err(e.into());
        }
    };

    if options.is_empty() {
        println!("{}", "The service returned no options.".yellow());
        return Ok(());
    }

    for (i, option) in options.iter().enumerate() {
        println!(
            "{} {}",
            format!("[{}/{}]", i + 1, options.len()).bright_cyan().bold(),
            format!("{} · {}", option.tone, option.length).dimmed()
        );
        println!("{}\n", option.text);
    }
    Ok(())
}
