//! `texpile filter` - re-run the post-pass and split assignment

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use texpile_core::SharedProgress;

use super::{OutputArgs, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct FilterArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// Documents must be longer than this many characters
    #[arg(long)]
    pub min_chars: Option<usize>,

    /// Reject documents without sectioning commands
    #[arg(long)]
    pub require_sectioning: bool,

    /// Remove bibdiv blocks
    #[arg(long)]
    pub strip_bibdiv: bool,

    /// Only recompute splits.json
    #[arg(long)]
    pub splits_only: bool,
}

pub fn run(args: FilterArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let mut pipeline = config.pipeline(args.output.output)?;
    if let Some(min_chars) = args.min_chars {
        pipeline.postpass.min_chars = min_chars;
    }
    pipeline.postpass.require_sectioning |= args.require_sectioning;
    pipeline.postpass.strip_bibdiv |= args.strip_bibdiv;

    if !pipeline.corpus_dir().is_dir() {
        anyhow::bail!(
            "No corpus at {}. Run `texpile run` first.",
            pipeline.corpus_dir().display()
        );
    }

    if !args.splits_only {
        let stats = texpile_arxiv::run_postpass(&pipeline);
        if progress.is_tty() {
            progress.println(stats.format_table());
        } else {
            stats.log();
        }
    }

    let splits = texpile_arxiv::write_splits(&pipeline)?;
    print_summary(
        "Splits",
        &[
            ("Train periods", splits.train.len().to_string()),
            ("Validation periods", splits.valid.len().to_string()),
            ("Path", pipeline.splits_path().display().to_string()),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
