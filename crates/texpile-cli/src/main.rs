//! texpile - build a math LaTeX corpus from arXiv bulk sources
//!
//! Harvests the arXiv listing, unpacks the bulk-source shards, and keeps
//! clean English `.tex` documents grouped by period.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "texpile")]
#[command(about = "Build a math LaTeX corpus from arXiv bulk sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./texpile.toml or ~/.config/texpile/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline (index, shards, post-pass, splits)
    Run(cmd::run::RunArgs),
    /// Build or refresh the metadata index only
    Index(cmd::index::IndexArgs),
    /// Re-run the post-pass and split assignment on an existing corpus
    Filter(cmd::filter::FilterArgs),
    /// Show shard outcomes from the journal
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(texpile_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; progress bars show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    texpile_core::init_logging(quiet, cli.debug, multi);
    texpile_core::install_signal_handlers()?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // Apply HTTP settings (config file defaults, CLI overrides)
    texpile_core::set_http_config(texpile_core::HttpConfig {
        read_timeout: std::time::Duration::from_secs(
            cli.read_timeout.unwrap_or(config.http.read_timeout),
        ),
        max_retries: cli.max_retries.unwrap_or(config.http.max_retries),
    });

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, &progress),
        Command::Index(args) => cmd::index::run(args, &config, &progress),
        Command::Filter(args) => cmd::filter::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config),
        Command::Config => {
            let pipeline = config.pipeline(None)?;
            cmd::print_summary(
                "Setting",
                &[
                    ("Output directory", pipeline.output_dir.display().to_string()),
                    ("Shard source", pipeline.shard_base.clone()),
                    ("Listing", format!("{} (set {})", pipeline.listing_url, pipeline.listing_set)),
                    ("Legacy prefix", pipeline.legacy_prefix.clone()),
                    (
                        "Workers",
                        format!(
                            "{} (max: {}, downloads: {})",
                            pipeline.workers, config.workers.max, pipeline.max_downloads
                        ),
                    ),
                    ("Read timeout", format!("{}s", config.http.read_timeout)),
                    ("Max retries", config.http.max_retries.to_string()),
                    ("Page delay", format!("{}s", config.harvest.page_delay_secs)),
                    (
                        "Post-pass",
                        format!(
                            "> {} chars, language {}",
                            pipeline.postpass.min_chars,
                            pipeline.postpass.target_language.code()
                        ),
                    ),
                ],
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
