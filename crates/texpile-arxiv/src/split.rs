//! Train/validation assignment of period directories

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Period directories per split, as paths relative to the output directory.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splits {
    #[serde(rename = "arxiv-train")]
    pub train: Vec<String>,
    #[serde(rename = "arxiv-valid")]
    pub valid: Vec<String>,
}

/// Whether a `YYMM` period belongs to validation: June of years whose last
/// digit is divisible by four.
pub fn is_validation_period(period: &str) -> Option<bool> {
    let digits: Vec<u32> = period.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
    match digits.as_slice() {
        [_, y, _, m] => Some(y % 4 == 0 && *m == 6),
        _ => None,
    }
}

/// Assign every period directory under `corpus_root`.
///
/// `prefix` is prepended to each directory name (e.g. `corpus`). Entries
/// that are not `YYMM` directories are ignored.
pub fn assign_splits(corpus_root: &Path, prefix: &str) -> io::Result<Splits> {
    let mut periods = Vec::new();
    for entry in std::fs::read_dir(corpus_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        match is_validation_period(&name) {
            Some(valid) => periods.push((name, valid)),
            None => log::warn!("Ignoring non-period directory {name}"),
        }
    }
    periods.sort();

    let mut splits = Splits::default();
    for (name, valid) in periods {
        let path = if prefix.is_empty() { name } else { format!("{prefix}/{name}") };
        if valid {
            splits.valid.push(path);
        } else {
            splits.train.push(path);
        }
    }
    Ok(splits)
}

impl Splits {
    /// Write as pretty JSON (tmp → rename).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        texpile_core::fsutil::write_atomic(path, &json)?;
        log::info!(
            "Wrote {} ({} train, {} valid)",
            path.display(),
            self.train.len(),
            self.valid.len()
        );
        Ok(())
    }
}
