//! Where shard tarballs and the manifest come from

use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;
use texpile_core::{StreamError, copy_to_file, download_to_file};

/// Remote (or mirrored) store of shard files, addressed by manifest location.
pub trait ShardSource: Send + Sync {
    /// Copy `location` to `dest`, advancing `pb`; returns bytes written.
    fn fetch(&self, location: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, StreamError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// HTTP mirror of the bulk-source bucket.
#[derive(Debug, Clone)]
pub struct HttpSource {
    pub base_url: String,
}

impl HttpSource {
    pub fn url_for(&self, location: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            location.trim_start_matches('/')
        )
    }
}

impl ShardSource for HttpSource {
    fn fetch(&self, location: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, StreamError> {
        download_to_file(&self.url_for(location), dest, pb)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Local directory laid out like the bucket (`src/arXiv_src_*.tar`, manifest).
#[derive(Debug, Clone)]
pub struct LocalSource {
    pub root: PathBuf,
}

impl ShardSource for LocalSource {
    fn fetch(&self, location: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, StreamError> {
        let src = self.root.join(location.trim_start_matches('/'));
        let file = fs::File::open(&src).map_err(|e| {
            StreamError::Io(io::Error::new(e.kind(), format!("{}: {e}", src.display())))
        })?;
        let total = file.metadata()?.len();
        Ok(copy_to_file(BufReader::new(file), dest, Some(total), pb)?)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Pick the source for a configured base: `http(s)://` is remote, anything
/// else a local mirror directory.
pub fn source_for(base: &str) -> Arc<dyn ShardSource> {
    if base.starts_with("http://") || base.starts_with("https://") {
        Arc::new(HttpSource {
            base_url: base.to_string(),
        })
    } else {
        Arc::new(LocalSource {
            root: PathBuf::from(base),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn url_join_handles_slashes() {
        let src = HttpSource {
            base_url: "https://mirror.example/arxiv/".into(),
        };
        assert_eq!(
            src.url_for("/src/arXiv_src_0601_001.tar"),
            "https://mirror.example/arxiv/src/arXiv_src_0601_001.tar"
        );
    }

    #[test]
    fn selection_by_scheme() {
        assert!(source_for("https://x.example").describe().starts_with("https://"));
        assert_eq!(source_for("/mnt/mirror").describe(), "/mnt/mirror");
    }

    #[test]
    fn local_fetch_copies_and_reports() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.tar"), vec![7u8; 1000]).unwrap();

        let source = LocalSource {
            root: dir.path().to_path_buf(),
        };
        let dest = dir.path().join("out.tar");
        let pb = ProgressBar::hidden();
        let written = source.fetch("src/a.tar", &dest, &pb).unwrap();

        assert_eq!(written, 1000);
        assert_eq!(pb.position(), 1000);
        assert_eq!(fs::read(&dest).unwrap().len(), 1000);
    }

    #[test]
    fn local_fetch_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let source = LocalSource {
            root: dir.path().to_path_buf(),
        };
        let err = source
            .fetch("src/missing.tar", &dir.path().join("x"), &ProgressBar::hidden())
            .unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
    }
}
