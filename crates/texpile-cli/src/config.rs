//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global configuration for texpile
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub source: SourceConfig,
    pub workers: WorkersConfig,
    pub http: HttpSettings,
    pub harvest: HarvestSettings,
    pub postpass: PostpassSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// `http(s)://` mirror or local directory holding `src/` and the manifest
    #[serde(deserialize_with = "deserialize_env_var")]
    pub shard_base: Option<String>,
    pub listing_url: String,
    pub listing_set: String,
    pub legacy_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let defaults = texpile_arxiv::Config::default();
        Self {
            shard_base: std::env::var("TEXPILE_SHARD_BASE").ok(),
            listing_url: defaults.listing_url,
            listing_set: defaults.listing_set,
            legacy_prefix: defaults.legacy_prefix,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
    /// Concurrent shard downloads
    pub downloads: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 16,
            downloads: 2,
        }
    }
}

impl WorkersConfig {
    /// Requested worker count clamped to `1..=max`.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).clamp(1, self.max.max(1))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Seconds without data before a transfer counts as stalled
    pub read_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        let defaults = texpile_core::HttpConfig::default();
        Self {
            read_timeout: defaults.read_timeout.as_secs(),
            max_retries: defaults.max_retries,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub page_delay_secs: u64,
    pub max_retries: u32,
    pub retry_base_secs: u64,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        let defaults = texpile_arxiv::oai::HarvestOptions::default();
        Self {
            page_delay_secs: defaults.page_delay.as_secs(),
            max_retries: defaults.max_retries,
            retry_base_secs: defaults.retry_base.as_secs(),
        }
    }
}

impl From<HarvestSettings> for texpile_arxiv::oai::HarvestOptions {
    fn from(s: HarvestSettings) -> Self {
        Self {
            page_delay: Duration::from_secs(s.page_delay_secs),
            max_retries: s.max_retries,
            retry_base: Duration::from_secs(s.retry_base_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostpassSettings {
    pub min_chars: usize,
    /// ISO 639-3 code, e.g. `eng`
    pub language: String,
    pub require_sectioning: bool,
    pub strip_bibdiv: bool,
}

impl Default for PostpassSettings {
    fn default() -> Self {
        let defaults = texpile_arxiv::PostpassConfig::default();
        Self {
            min_chars: defaults.min_chars,
            language: defaults.target_language.code().to_string(),
            require_sectioning: defaults.require_sectioning,
            strip_bibdiv: defaults.strip_bibdiv,
        }
    }
}

impl PostpassSettings {
    pub fn to_postpass_config(&self) -> Result<texpile_arxiv::PostpassConfig> {
        let target_language = whatlang::Lang::from_code(&self.language)
            .with_context(|| format!("Unknown language code {:?}", self.language))?;
        Ok(texpile_arxiv::PostpassConfig {
            min_chars: self.min_chars,
            target_language,
            require_sectioning: self.require_sectioning,
            strip_bibdiv: self.strip_bibdiv,
        })
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./texpile.toml (current directory)
    /// 2. ~/.config/texpile/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("texpile.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "texpile") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Pipeline configuration with file values; callers apply CLI overrides.
    pub fn pipeline(&self, output_dir: Option<PathBuf>) -> Result<texpile_arxiv::Config> {
        let defaults = texpile_arxiv::Config::default();
        let workers = self.workers.resolve(None);
        Ok(texpile_arxiv::Config {
            output_dir: output_dir.unwrap_or_else(|| self.output.default_dir.clone()),
            shard_base: self
                .source
                .shard_base
                .clone()
                .unwrap_or(defaults.shard_base),
            listing_url: self.source.listing_url.clone(),
            listing_set: self.source.listing_set.clone(),
            legacy_prefix: self.source.legacy_prefix.clone(),
            workers,
            max_downloads: self.workers.downloads.clamp(1, workers),
            harvest: self.harvest.into(),
            postpass: self.postpass.to_postpass_config()?,
            ..defaults
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.output.default_dir, PathBuf::from("./data"));
        assert!(config.workers.default >= 1);
        assert_eq!(config.postpass.language, "eng");
        assert_eq!(config.harvest.page_delay_secs, 5);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("TEXPILE_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${TEXPILE_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("TEXPILE_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn workers_clamped() {
        let workers = WorkersConfig {
            default: 4,
            max: 8,
            downloads: 2,
        };
        assert_eq!(workers.resolve(None), 4);
        assert_eq!(workers.resolve(Some(32)), 8);
        assert_eq!(workers.resolve(Some(0)), 1);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[output]
default_dir = "/tmp/arxiv"

[source]
shard_base = "/mnt/mirror"
listing_set = "math"

[workers]
default = 4
max = 8
downloads = 3

[postpass]
min_chars = 500
language = "fra"
strip_bibdiv = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.output.default_dir, PathBuf::from("/tmp/arxiv"));
        assert_eq!(config.source.shard_base.as_deref(), Some("/mnt/mirror"));

        let pipeline = config.pipeline(None).unwrap();
        assert_eq!(pipeline.workers, 4);
        assert_eq!(pipeline.max_downloads, 3);
        assert_eq!(pipeline.postpass.min_chars, 500);
        assert_eq!(pipeline.postpass.target_language, whatlang::Lang::Fra);
        assert!(pipeline.postpass.strip_bibdiv);
        assert_eq!(pipeline.shard_base, "/mnt/mirror");
    }

    #[test]
    fn unknown_language_rejected() {
        let config: Config = toml::from_str("[postpass]\nlanguage = \"xx\"\n").unwrap();
        assert!(config.pipeline(None).is_err());
    }
}
