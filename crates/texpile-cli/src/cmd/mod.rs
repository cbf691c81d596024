//! Subcommands

pub mod filter;
pub mod index;
pub mod run;
pub mod status;

use std::path::PathBuf;

use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Output location shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output directory (default: [output].default_dir from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
