//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: indicatif progress bars per worker (clear on completion).
//! Non-TTY mode: log-based output (no progress bars).

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Per-worker download bar (green bar, binary bytes)
fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7} {eta:>4} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("--")
}

/// Pending style: shown before total bytes are known, and while unpacking
fn pending_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<24.dim} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Counting style for whole-run totals (shards, documents)
fn count_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} {prefix:<10.cyan.bold} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {wide_msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-")
}

/// Upgrade a progress bar from pending to bytes bar.
///
/// Call this once the transfer size is known.
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_length(total);
    pb.set_style(bar_style());
}

/// Drop a bytes bar back to a status line (e.g. "unpacking...").
pub fn downgrade_to_status(pb: &ProgressBar, msg: &str) {
    pb.set_style(pending_style());
    pb.set_message(msg.to_string());
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Context that never draws bars (tests, piped output).
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Create per-worker progress bar.
    ///
    /// TTY: visible bar with pending style (no bytes yet).
    /// Non-TTY: hidden (no-op).
    pub fn shard_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(pending_style());
        // Truncate long names to keep bars aligned
        let display: String = name.chars().take(24).collect();
        pb.set_prefix(display);
        pb
    }

    /// Create an overall counter bar (e.g. shards done / total).
    pub fn count_bar(&self, name: &str, total: u64) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(count_style());
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Create a stage status line managed by MultiProgress.
    ///
    /// Update with `pb.set_message(...)` as the stage progresses.
    /// Call `pb.finish()` to stop the spinner.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
