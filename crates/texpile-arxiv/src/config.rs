//! arXiv pipeline configuration

use std::path::PathBuf;

use crate::oai::HarvestOptions;
use crate::postpass::PostpassConfig;

/// Runtime configuration for the arXiv pipeline
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all pipeline output (corpus, journal, caches)
    pub output_dir: PathBuf,
    /// Bulk-source root: an `http(s)://` mirror or a local directory
    pub shard_base: String,
    /// OAI-PMH endpoint
    pub listing_url: String,
    /// OAI set to harvest
    pub listing_set: String,
    /// Member-name prefix of target records in legacy shards
    pub legacy_prefix: String,
    pub workers: usize,
    /// Concurrent shard downloads (at most `workers`)
    pub max_downloads: usize,
    /// Process at most this many shards (for testing)
    pub max_shards: Option<usize>,
    /// Re-harvest the listing even if `index.txt` exists
    pub refresh_index: bool,
    /// Skip the post-pass and split assignment
    pub skip_postpass: bool,
    pub harvest: HarvestOptions,
    pub postpass: PostpassConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            shard_base: "mirror".to_string(),
            listing_url: "https://export.arxiv.org/oai2".to_string(),
            listing_set: "math".to_string(),
            legacy_prefix: "math".to_string(),
            workers: 4,
            max_downloads: 2,
            max_shards: None,
            refresh_index: false,
            skip_postpass: false,
            harvest: HarvestOptions::default(),
            postpass: PostpassConfig::default(),
        }
    }
}

impl Config {
    /// Validated documents, one directory per period.
    pub fn corpus_dir(&self) -> PathBuf {
        self.output_dir.join("corpus")
    }

    /// Per-shard scratch directories live here.
    pub fn staging_dir(&self) -> PathBuf {
        self.output_dir.join("staging")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.output_dir.join("journal.jsonl")
    }

    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join("index.txt")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join("manifest.xml")
    }

    pub fn splits_path(&self) -> PathBuf {
        self.output_dir.join("splits.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(config.max_shards.is_none());
        assert_eq!(config.listing_set, "math");
        assert!(config.listing_url.starts_with("https://"));
        assert_eq!(config.postpass.min_chars, 280);
    }

    #[test]
    fn output_layout() {
        let config = Config {
            output_dir: PathBuf::from("/data/arxiv"),
            ..Default::default()
        };
        assert_eq!(config.corpus_dir(), PathBuf::from("/data/arxiv/corpus"));
        assert_eq!(config.journal_path(), PathBuf::from("/data/arxiv/journal.jsonl"));
        assert_eq!(config.index_path(), PathBuf::from("/data/arxiv/index.txt"));
        assert_eq!(config.staging_dir(), PathBuf::from("/data/arxiv/staging"));
    }
}
