//! Append-only shard completion journal
//!
//! One JSON object per line, written when a shard finishes. On restart the
//! runner skips every shard whose latest entry is `completed`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub shard: String,
    pub period: String,
    pub status: ShardStatus,
    #[serde(default)]
    pub documents: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339 completion time
    pub finished_at: String,
}

impl JournalEntry {
    pub fn completed(shard: &str, period: &str, documents: usize) -> Self {
        Self {
            shard: shard.to_string(),
            period: period.to_string(),
            status: ShardStatus::Completed,
            documents,
            error: None,
            finished_at: now(),
        }
    }

    pub fn failed(shard: &str, period: &str, error: impl ToString) -> Self {
        Self {
            shard: shard.to_string(),
            period: period.to_string(),
            status: ShardStatus::Failed,
            documents: 0,
            error: Some(error.to_string()),
            finished_at: now(),
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Shared append handle; safe to use from every worker.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Open (creating if needed) the journal at `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it.
    pub fn record(&self, entry: &JournalEntry) -> io::Result<()> {
        let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    /// Read every entry; a torn trailing line from a crash is skipped.
    pub fn read_entries(path: &Path) -> io::Result<Vec<JournalEntry>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("{}:{}: skipping bad entry: {e}", path.display(), lineno + 1),
            }
        }
        Ok(entries)
    }

    /// Latest entry per shard, in first-seen order of shards.
    pub fn latest(path: &Path) -> io::Result<Vec<JournalEntry>> {
        let mut order = Vec::new();
        let mut by_shard: FxHashMap<String, JournalEntry> = FxHashMap::default();
        for entry in Self::read_entries(path)? {
            if !by_shard.contains_key(&entry.shard) {
                order.push(entry.shard.clone());
            }
            by_shard.insert(entry.shard.clone(), entry);
        }
        Ok(order
            .into_iter()
            .filter_map(|shard| by_shard.remove(&shard))
            .collect())
    }

    /// Shards whose latest entry is `completed`.
    pub fn completed(path: &Path) -> io::Result<FxHashSet<String>> {
        Ok(Self::latest(path)?
            .into_iter()
            .filter(|e| e.status == ShardStatus::Completed)
            .map(|e| e.shard)
            .collect())
    }
}
