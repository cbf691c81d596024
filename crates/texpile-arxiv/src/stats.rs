//! Statistics collection and reporting for arXiv ingestion.
//!
//! - Shard-level: `ShardStats`, one per finished shard
//! - Run-level: `IngestSummary` (shard pass), `FilterStats` (post-pass)
//! - Final: `RunSummary`

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use texpile_core::progress::fmt_num;

use crate::era::Era;
use crate::postpass::FilterStats;
use crate::unpack::UnpackStats;

/// Statistics for one completed shard.
#[derive(Debug, Clone)]
pub struct ShardStats {
    pub shard: String,
    pub era: Era,
    pub bytes: u64,
    pub unpack: UnpackStats,
    pub elapsed: Duration,
}

impl ShardStats {
    /// Log shard completion (non-TTY mode only).
    pub fn log(&self) {
        log::info!(
            "{} [{}]: {} documents from {} members ({} skipped) [{:.1}s]",
            self.shard,
            self.era,
            fmt_num(self.unpack.documents),
            fmt_num(self.unpack.admitted),
            fmt_num(self.unpack.rejected),
            self.elapsed.as_secs_f64()
        );
    }
}

/// Aggregated statistics for the shard pass.
#[derive(Debug, Default, Clone)]
pub struct IngestSummary {
    pub total_shards: usize,
    /// Skipped because the journal marks them completed
    pub resumed_shards: usize,
    pub completed_shards: usize,
    pub failed_shards: usize,
    pub legacy_shards: usize,
    pub modern_shards: usize,
    pub bytes: u64,
    pub admitted: usize,
    pub rejected: usize,
    pub corrupt: usize,
    pub undecodable: usize,
    pub documents: usize,
    pub elapsed: Duration,
}

impl IngestSummary {
    pub fn from_shards(shards: &[ShardStats], total: usize, resumed: usize, failed: usize) -> Self {
        let mut summary = Self {
            total_shards: total,
            resumed_shards: resumed,
            completed_shards: shards.len(),
            failed_shards: failed,
            ..Default::default()
        };
        for s in shards {
            match s.era {
                Era::Legacy => summary.legacy_shards += 1,
                Era::Modern => summary.modern_shards += 1,
            }
            summary.bytes += s.bytes;
            summary.admitted += s.unpack.admitted;
            summary.rejected += s.unpack.rejected;
            summary.corrupt += s.unpack.corrupt;
            summary.undecodable += s.unpack.undecodable;
            summary.documents += s.unpack.documents;
        }
        summary
    }

    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Shard pass")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Shards"),
            Cell::new(format!(
                "{}/{} ({} resumed, {} failed)",
                self.completed_shards, self.total_shards, self.resumed_shards, self.failed_shards
            )),
        ]);
        table.add_row(vec![
            Cell::new("Legacy / modern"),
            Cell::new(format!("{} / {}", self.legacy_shards, self.modern_shards)),
        ]);
        table.add_row(vec![
            Cell::new("Downloaded"),
            Cell::new(format!("{:.1} GiB", self.bytes as f64 / (1u64 << 30) as f64)),
        ]);
        table.add_row(vec![Cell::new("Members admitted"), Cell::new(fmt_num(self.admitted))]);
        table.add_row(vec![Cell::new("Members skipped"), Cell::new(fmt_num(self.rejected))]);
        table.add_row(vec![Cell::new("Corrupt members"), Cell::new(fmt_num(self.corrupt))]);
        table.add_row(vec![Cell::new("Undecodable"), Cell::new(fmt_num(self.undecodable))]);
        table.add_row(vec![
            Cell::new("Documents").fg(Color::Green),
            Cell::new(fmt_num(self.documents)).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
        ]);

        format!("\n{table}")
    }

    pub fn log(&self) {
        log::info!(
            "Shard pass complete: {} documents ({}/{} shards, {} failed)",
            fmt_num(self.documents),
            self.completed_shards,
            self.total_shards,
            self.failed_shards
        );
    }
}

impl FilterStats {
    pub fn format_table(&self) -> String {
        let examined = self.examined();
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Post-pass")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        let rows = [
            ("Too short", self.too_short),
            ("No linguistic features", self.no_features),
            ("Wrong language", self.wrong_language),
            ("Not prose", self.not_prose),
            ("Undecodable", self.undecodable),
            ("Errors", self.errors),
        ];
        table.add_row(vec![Cell::new("Examined"), Cell::new(fmt_num(examined)), Cell::new("")]);
        for (label, n) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(fmt_num(n)),
                Cell::new(format!("{:.1}", pct(n, examined))),
            ]);
        }
        table.add_row(vec![
            Cell::new("Accepted").fg(Color::Green),
            Cell::new(fmt_num(self.accepted)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(self.accepted, examined))).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("  rewritten"),
            Cell::new(fmt_num(self.rewritten)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Stray files pruned"),
            Cell::new(fmt_num(self.pruned)),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    pub fn log(&self) {
        log::info!(
            "Post-pass complete: {} of {} documents accepted ({} wrong language, {} too short)",
            fmt_num(self.accepted),
            fmt_num(self.examined()),
            fmt_num(self.wrong_language),
            fmt_num(self.too_short)
        );
    }
}

/// Everything one `run` did.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub index_size: usize,
    pub ingest: IngestSummary,
    pub postpass: Option<FilterStats>,
    pub train_periods: usize,
    pub valid_periods: usize,
    pub interrupted: bool,
}

impl RunSummary {
    /// Render all tables (TTY mode).
    pub fn format_tables(&self) -> String {
        let mut out = self.ingest.format_table();
        if let Some(post) = &self.postpass {
            out.push_str(&post.format_table());
        }
        out
    }

    pub fn log(&self) {
        log::info!("Metadata index: {} ids", fmt_num(self.index_size));
        self.ingest.log();
        if let Some(post) = &self.postpass {
            post.log();
        }
        if self.train_periods + self.valid_periods > 0 {
            log::info!(
                "Splits: {} train periods, {} validation periods",
                self.train_periods,
                self.valid_periods
            );
        }
    }
}

/// Calculate percentage safely.
fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
