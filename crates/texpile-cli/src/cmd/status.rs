//! `texpile status` - shard outcomes from the completion journal

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use texpile_arxiv::{Journal, ShardStatus};

use super::OutputArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// List every shard, not only failures
    #[arg(short, long)]
    pub all: bool,
}

pub fn run(args: StatusArgs, config: &Config) -> Result<ExitCode> {
    let pipeline = config.pipeline(args.output.output)?;
    let path = pipeline.journal_path();
    let entries = Journal::latest(&path)
        .with_context(|| format!("Cannot read journal {}", path.display()))?;
    if entries.is_empty() {
        eprintln!("No shards recorded in {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let failed = entries
        .iter()
        .filter(|e| e.status == ShardStatus::Failed)
        .count();
    let documents: usize = entries.iter().map(|e| e.documents).sum();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Shard").fg(Color::Cyan),
            Cell::new("Period").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Documents").fg(Color::Cyan),
            Cell::new("Finished").fg(Color::Cyan),
            Cell::new("Error").fg(Color::Cyan),
        ]);
    for entry in entries
        .iter()
        .filter(|e| args.all || e.status == ShardStatus::Failed)
    {
        let status = match entry.status {
            ShardStatus::Completed => Cell::new("completed").fg(Color::Green),
            ShardStatus::Failed => Cell::new("failed").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&entry.shard),
            Cell::new(&entry.period),
            status,
            Cell::new(entry.documents),
            Cell::new(&entry.finished_at),
            Cell::new(entry.error.as_deref().unwrap_or("")),
        ]);
    }

    if args.all || failed > 0 {
        eprintln!("\n{table}");
    }
    eprintln!(
        "{} shards recorded: {} completed, {failed} failed, {documents} documents promoted",
        entries.len(),
        entries.len() - failed
    );
    Ok(if failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
