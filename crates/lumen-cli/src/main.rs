//! Lumen CLI - Command-line interface for Forge predictions

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{adapters, fetch, predict, setup};
use lumen_predict::LumenConfig;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(
    about = "Text-to-image predictions on a Forge engine with on-demand LoRA adapters",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Engine to use (forge, mock); overrides [engine] kind
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Config file to use instead of ~/.lumen and .lumen
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the base model if missing and apply engine options
    Setup,

    /// Generate images
    Predict(predict::PredictArgs),

    /// List the adapters the engine can activate
    Adapters,

    /// Download a file into the cache unless it is already there
    Fetch {
        /// Source URL
        url: String,

        /// Destination file
        dest: PathBuf,

        /// Treat the file as a base model checkpoint
        #[arg(long)]
        base_model: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<LumenConfig> {
    let config = match path {
        Some(p) => LumenConfig::load_from_file(p)?,
        None => LumenConfig::load()?,
    };
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    tracing::debug!(?config, "loaded config");
    let engine = cli.engine.as_deref();

    match cli.command {
        Commands::Setup => setup::run(config, engine),
        Commands::Predict(args) => predict::run(config, engine, args),
        Commands::Adapters => adapters::run(config, engine),
        Commands::Fetch {
            url,
            dest,
            base_model,
        } => fetch::run(&config, &url, &dest, base_model),
    }
}
