//! Ergrank - context-aware erg recommendation
//!
//! Command-line entry point for recording feedback, requesting
//! recommendations and inspecting per-context training state.

mod cli;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cli::ContextArgs;
use ergrank_core::ErgConfig;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "ergrank")]
#[command(about = "Context-aware erg recommendation that learns from user evaluations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, env = "ERGRANK_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database path (overrides config, ERGRANK_DB_PATH and default)
    #[arg(long)]
    db_path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize database
    Init,

    /// Recommend ergs for a context
    Recommend {
        #[command(flatten)]
        context: ContextArgs,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the evaluation a user gave an erg
    Feedback {
        #[command(flatten)]
        context: ContextArgs,

        /// Erg that was shown
        #[arg(long)]
        erg: String,

        /// Comma-separated survey scores, e.g. 4,5,3
        #[arg(long, value_delimiter = ',', required = true)]
        evaluation: Vec<u8>,
    },

    /// Train the context's model now if enough data exists
    Train {
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Show per-erg row counts and model state
    Status {
        #[command(flatten)]
        context: ContextArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!(
        "ergrank={0},ergrank_core={0},libsql=warn",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Ergrank v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = ErgConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(db_path) = cli.db_path {
        config.storage.db_path = Some(db_path);
    }

    match cli.command {
        Commands::Init => cli::init::handle(&config).await,
        Commands::Recommend { context, json } => {
            cli::recommend::handle(&config, context.into(), json).await
        }
        Commands::Feedback {
            context,
            erg,
            evaluation,
        } => cli::feedback::handle(&config, context.into(), &erg, &evaluation).await,
        Commands::Train { context } => cli::train::handle(&config, context.into()).await,
        Commands::Status { context } => cli::status::handle(&config, context.into()).await,
    }
}
