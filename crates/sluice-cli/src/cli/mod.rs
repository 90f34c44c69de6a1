//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sluice_core::core::interrupt;
use sluice_core::{config, logging};

use crate::modes::split::OutputFormat;

mod commands;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(version)]
#[command(about = "Split streamed assistant output into prose and fenced blocks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Stream a file or stdin through the fence splitter
    Split {
        /// Read from this file instead of stdin
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Re-split input into chunks of at most N characters
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        chunk_size: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Record a user message before the assistant stream
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults (for xtask)
    Generate,
    /// Print the effective configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load().context("load config")?;

    // Held until exit so the file writer flushes.
    let _log_guard = logging::init(&config.log).context("init logging")?;
    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli, &config).await })
}

async fn dispatch(cli: Cli, config: &config::Config) -> Result<()> {
    match cli.command {
        Commands::Split {
            file,
            chunk_size,
            format,
            prompt,
        } => {
            commands::split::run(commands::split::SplitRunOptions {
                file: file.as_deref(),
                chunk_size: chunk_size.map(|n| n as usize),
                format,
                prompt: prompt.as_deref(),
                config,
            })
            .await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
            ConfigCommands::Show => commands::config::show(config),
        },
    }
}
