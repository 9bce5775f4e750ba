//! Command line front end for the talecraft generation service.

pub mod app;
pub mod cli;

pub use app::{run_generate, run_health, run_stream, setup_from_cli, AppConfig};
pub use cli::{Cli, Commands, PromptArgs};
