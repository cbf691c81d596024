//! `texpile index` - build or refresh the metadata index only

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use texpile_core::SharedProgress;

use super::{OutputArgs, print_summary};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// OAI set to harvest (default: [source].listing_set)
    #[arg(long)]
    pub set: Option<String>,

    /// Harvest even if index.txt exists
    #[arg(long)]
    pub refresh: bool,
}

pub fn run(args: IndexArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let mut pipeline = config.pipeline(args.output.output)?;
    if let Some(set) = args.set {
        pipeline.listing_set = set;
    }
    pipeline.refresh_index = args.refresh;
    std::fs::create_dir_all(&pipeline.output_dir)?;

    let index = texpile_arxiv::load_or_build_index(&pipeline, progress)?;
    print_summary(
        "Metadata index",
        &[
            ("Set", pipeline.listing_set.clone()),
            ("Record ids", index.len().to_string()),
            ("Path", pipeline.index_path().display().to_string()),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
