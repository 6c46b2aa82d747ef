//! batchfetch CLI - fetch files, memory buffers and batches
//!
//! Thin front end over batchfetch-core. The main thread doubles as the
//! downloader's host thread: every callback runs here.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// batchfetch - concurrent batch downloader
#[derive(Parser)]
#[command(name = "batchfetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "BATCHFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Connection timeout in seconds, overriding the settings file
    #[arg(long)]
    timeout: Option<i64>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one file
    Get {
        /// URL to download
        url: String,

        /// Destination path (defaults to the URL's file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Identity reported with every notification
        #[arg(long)]
        id: Option<String>,
    },

    /// Download into a fixed-size memory buffer
    Mem {
        /// URL to download
        url: String,

        /// Buffer capacity in bytes
        #[arg(short, long)]
        capacity: usize,

        /// Identity reported with every notification
        #[arg(long)]
        id: Option<String>,
    },

    /// Download every entry of a manifest file
    Batch {
        /// Path to the JSON manifest
        manifest: PathBuf,

        /// Batch identity (defaults to the manifest's, then a random one)
        #[arg(long)]
        batch_id: Option<String>,

        /// Resume every entry from its temporary file where possible
        #[arg(long)]
        resume: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,batchfetch_core=debug,batchfetch=debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("batchfetch").join("settings.json"))
            .unwrap_or_else(|| PathBuf::from(".batchfetch.json"))
    });
    let settings = batchfetch_core::load_settings(&config_path)?;

    match cli.command {
        Commands::Get { url, output, id } => {
            commands::get(settings, cli.timeout, &url, output, id, cli.output)?
        }

        Commands::Mem { url, capacity, id } => {
            commands::mem(settings, cli.timeout, &url, capacity, id, cli.output)?
        }

        Commands::Batch {
            manifest,
            batch_id,
            resume,
        } => commands::batch(settings, cli.timeout, &manifest, batch_id, resume, cli.output)?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            clap_complete::generate(shell, &mut Cli::command(), "batchfetch", &mut std::io::stdout());
        }
    }

    Ok(())
}
