//! Record-id set for the target subject class

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashSet;

/// Identifiers known to belong to the target subject class.
///
/// Insert-only while the listing is harvested, then shared read-only with
/// shard workers.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    ids: FxHashSet<String>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an id; returns false if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Save as sorted newline-delimited ids (tmp → rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        ids.sort_unstable();

        let tmp_path = path.with_extension("txt.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for id in &ids {
            writeln!(writer, "{id}")?;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp_path, path)?;

        log::info!("Saved {} record ids to {}", ids.len(), path.display());
        Ok(())
    }

    /// Load a cache written by [`save`](Self::save).
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut index = Self::new();
        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() {
                index.insert(id);
            }
        }
        if index.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} holds no record ids", path.display()),
            ));
        }
        Ok(index)
    }
}

impl Extend<String> for MetadataIndex {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl FromIterator<String> for MetadataIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn insert_reports_duplicates() {
        let mut index = MetadataIndex::new();
        assert!(index.insert("0704.0001"));
        assert!(!index.insert("0704.0001"));
        assert_eq!(index.len(), 1);
        assert!(index.contains("0704.0001"));
        assert!(!index.contains("0704.0002"));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.txt");
        let index: MetadataIndex = ["1001.0002", "math/0601001", "1001.0001"]
            .into_iter()
            .map(String::from)
            .collect();
        index.save(&path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "1001.0001\n1001.0002\nmath/0601001\n"
        );
        let loaded = MetadataIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.contains("math/0601001"));
    }

    #[test]
    fn load_empty_cache_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.txt");
        std::fs::write(&path, "\n\n").unwrap();
        let err = MetadataIndex::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(MetadataIndex::load(&dir.path().join("nope.txt")).is_err());
    }
}
