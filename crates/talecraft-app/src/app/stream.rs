use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use colored::Colorize;
use talecraft_client::ApiError;
use talecraft_session::{GenerationCoordinator, GenerationListener};
use talecraft_types::Slot;
use tokio::sync::oneshot;

use super::setup::{build_request, AppConfig};
use crate::cli::PromptArgs;

/// How a streamed session ended
#[derive(Debug)]
enum Outcome {
    Completed(String),
    Failed(ApiError),
    Cancelled,
}

/// Prints the new suffix of each cumulative update
struct ConsolePrinter {
    printed: Mutex<usize>,
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ConsolePrinter {
    fn new(outcome: oneshot::Sender<Outcome>) -> Self {
        Self {
            printed: Mutex::new(0),
            outcome: Mutex::new(Some(outcome)),
        }
    }

    fn print_new(&self, text: &str) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };
        if let Some(delta) = text.get(*printed..) {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        *printed = text.len();
    }

    fn finish(&self, outcome: Outcome) {
        if let Some(sender) = self.outcome.lock().ok().and_then(|mut o| o.take()) {
            let _ = sender.send(outcome);
        }
    }
}

impl GenerationListener for ConsolePrinter {
    fn on_chunk(&self, text: &str) {
        self.print_new(text);
    }

    fn on_complete(&self, text: &str) {
        self.print_new(text);
        println!();
        self.finish(Outcome::Completed(text.to_string()));
    }

    fn on_error(&self, error: &ApiError) {
        self.finish(Outcome::Failed(error.clone()));
    }

    fn on_cancelled(&self) {
        self.finish(Outcome::Cancelled);
    }
}

/// Stream one generation through the session coordinator
pub async fn run_stream(config: &AppConfig, args: &PromptArgs, slot: &str) -> Result<()> {
    let client = config.client()?;
    let request = build_request(args)?;
    let slot = Slot::from_str(slot);

    let coordinator = GenerationCoordinator::new(Arc::new(client)).with_verbose(config.client_config.verbose);
    let (tx, rx) = oneshot::channel();
    let printer = Arc::new(ConsolePrinter::new(tx));

    let id = coordinator.start(slot.clone(), request, printer).await;
    log::debug!("started {} in slot {}", id, slot);

    let outcome = tokio::select! {
        outcome = rx => outcome.unwrap_or(Outcome::Cancelled),
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel(&slot).await;
            Outcome::Cancelled
        }
    };

    match outcome {
        Outcome::Completed(text) => {
            log::info!("generated {} chars", text.chars().count());
            Ok(())
        }
        Outcome::Cancelled => {
            eprintln!("\n{}", "^C - Generation cancelled".bright_yellow());
            Ok(())
        }
        Outcome::Failed(e) => {
            eprintln!("\n{} {}", "Error:".bright_red().bold(), e.user_message());
            Err(e.into())
        }
    }
}
