use anyhow::Result;
use clap::Parser;

use talecraft::{run_generate, run_health, run_stream, setup_from_cli, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = setup_from_cli(&cli)?;

    match &cli.command {
        Commands::Generate { prompt, count } => run_generate(&config, prompt, *count).await,
        Commands::Stream { prompt, slot } => run_stream(&config, prompt, slot).await,
        Commands::Health => run_health(&config).await,
    }
}
