//! `texpile run` - full ingestion: index, shards, post-pass, splits

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use texpile_core::SharedProgress;

use super::OutputArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// Shard source: http(s):// mirror or local directory
    #[arg(short, long)]
    pub source: Option<String>,

    /// Number of parallel shard workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Concurrent shard downloads
    #[arg(short, long)]
    pub downloads: Option<usize>,

    /// Maximum number of shards to process
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Re-harvest the metadata listing even if index.txt exists
    #[arg(long)]
    pub refresh_index: bool,

    /// Stop after promotion; no post-pass or splits
    #[arg(long)]
    pub skip_postpass: bool,

    /// Documents must be longer than this many characters
    #[arg(long)]
    pub min_chars: Option<usize>,

    /// Reject documents without sectioning commands
    #[arg(long)]
    pub require_sectioning: bool,

    /// Remove bibdiv blocks during the post-pass
    #[arg(long)]
    pub strip_bibdiv: bool,
}

pub fn run(args: RunArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let mut pipeline = config.pipeline(args.output.output)?;
    if let Some(source) = args.source {
        pipeline.shard_base = source;
    }
    if args.workers.is_some() {
        pipeline.workers = config.workers.resolve(args.workers);
    }
    pipeline.max_downloads = args
        .downloads
        .unwrap_or(pipeline.max_downloads)
        .clamp(1, pipeline.workers);
    pipeline.max_shards = args.limit;
    pipeline.refresh_index = args.refresh_index;
    pipeline.skip_postpass = args.skip_postpass;
    if let Some(min_chars) = args.min_chars {
        pipeline.postpass.min_chars = min_chars;
    }
    pipeline.postpass.require_sectioning |= args.require_sectioning;
    pipeline.postpass.strip_bibdiv |= args.strip_bibdiv;

    log::info!("Ingesting arXiv sources");
    log::info!("  Source: {}", pipeline.shard_base);
    log::info!("  Output: {}", pipeline.output_dir.display());

    let summary = texpile_arxiv::run(&pipeline, progress.clone())?;
    if progress.is_tty() {
        progress.println(summary.format_tables());
    } else {
        summary.log();
    }

    if summary.interrupted {
        log::warn!("Interrupted; completed shards are journaled, re-run to resume");
        return Ok(ExitCode::from(130));
    }
    if summary.ingest.failed_shards > 0 {
        log::error!(
            "{} shards failed, see `texpile status`",
            summary.ingest.failed_shards
        );
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
