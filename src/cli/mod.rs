//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod model_list;
pub mod probe;
pub mod say;
pub mod transfer;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::chat::run_chat;
use crate::cli::model_list::list_models;
use crate::cli::probe::{run_analyze, run_test};
use crate::cli::say::run_say;
use crate::cli::transfer::{run_export, run_import};
use crate::core::context::{AppContext, ContextOptions, Overrides};
use crate::core::message::ChatMode;

#[derive(Parser, Debug)]
#[command(name = "solace")]
#[command(about = "An emotion-aware streaming companion chat in the terminal")]
#[command(
    long_about = "Solace is a companion chat client that reads the mood of each message \
and answers in a comforting, praising or adaptive voice. Replies are streamed from \
OpenAI, Anthropic or any OpenAI-compatible endpoint (such as a local Ollama proxy).\n\n\
Environment Variables:\n\
  OPENAI_API_KEY          Credential for -p openai\n\
  ANTHROPIC_API_KEY       Credential for -p anthropic\n\
  SOLACE_COMPAT_API_KEY   Optional credential for -p openai-compatible\n\
  SOLACE_LOG              Diagnostic filter, e.g. 'solace=debug' (default: warn)\n\n\
Modes:\n\
  smart     Classify the emotion first and pick a voice (default)\n\
  comfort   Gentle, validating replies\n\
  praise    Enthusiastic, encouraging replies"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Provider to use: openai, anthropic or openai-compatible
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Model to use for replies and classification
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Reply mode: smart, comfort or praise
    #[arg(long, global = true, value_name = "MODE")]
    pub mode: Option<ChatMode>,

    /// Write diagnostics to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Send a single message and stream the reply to stdout
    Say {
        /// The message; multiple words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// List the models offered by the selected provider
    Models,
    /// Check that the selected provider is reachable
    Test,
    /// Classify the emotion of a message without replying
    Analyze {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Write history, diversity records and settings to a JSON file
    Export {
        /// Destination file, or '-' for stdout
        file: PathBuf,
    },
    /// Replace local history and settings with an exported JSON file
    Import {
        file: PathBuf,
    },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            mode: self.mode,
        }
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            config_path: self.config.clone(),
            log_file: self.log.clone(),
            ephemeral: false,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut context = AppContext::init(args.context_options(), args.overrides())?;

    let result = match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&context).await,
        Commands::Say { text } => run_say(&context, &text.join(" ")).await,
        Commands::Models => list_models(&context).await,
        Commands::Test => run_test(&context).await,
        Commands::Analyze { text } => run_analyze(&context, &text.join(" ")).await,
        Commands::Export { file } => run_export(&context, &file),
        Commands::Import { file } => run_import(&mut context, &file),
    };
    context.teardown();
    result
}
