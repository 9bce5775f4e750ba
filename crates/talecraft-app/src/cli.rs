use clap::{Args, Parser, Subcommand};

/// CLI arguments for talecraft
#[derive(Parser, Debug)]
#[command(name = "talecraft")]
#[command(about = "Talecraft - story generation from the command line")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the generation service (e.g., http://localhost:8000)
    #[arg(long, value_name = "URL", env = "TALECRAFT_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, value_name = "TOKEN", env = "TALECRAFT_API_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Print every request, response and stream record
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate one or more options in a single request
    Generate {
        #[command(flatten)]
        prompt: PromptArgs,

        /// Number of options to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Stream a generation, printing text as it arrives (Ctrl-C cancels)
    Stream {
        #[command(flatten)]
        prompt: PromptArgs,

        /// Session slot to run in (draft, continuation, rewrite)
        #[arg(long, default_value = "draft")]
        slot: String,
    },
    /// Check that the service is up and its model is loaded
    Health,
}

/// Prompt and sampling parameters shared by the generation commands
#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    /// Story text to continue
    pub prompt: String,

    /// Narrative tone (Dark, Emotional, Humorous, Inspirational, Mysterious, Adaptive)
    #[arg(short, long, default_value = "Adaptive")]
    pub tone: String,

    /// Length class (Short, Medium, Long)
    #[arg(short, long, default_value = "Medium")]
    pub length: String,

    /// Maximum tokens to generate
    #[arg(long, default_value_t = talecraft_types::DEFAULT_MAX_LENGTH)]
    pub max_length: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = talecraft_types::DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[arg(long, default_value_t = talecraft_types::DEFAULT_TOP_P)]
    pub top_p: f32,
}
