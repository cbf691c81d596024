//! arXiv bulk-source manifest parsing
//!
//! Parses `arXiv_src_manifest.xml` into the ordered shard worklist.

use std::path::Path;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use quick_xml::Reader;
use quick_xml::events::Event;
use texpile_core::retry_with_backoff;

use crate::source::ShardSource;

/// Manifest file name at the root of the bulk-source bucket.
pub const MANIFEST_NAME: &str = "arXiv_src_manifest.xml";

/// One shard tarball listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// Path relative to the source root, e.g. `src/arXiv_src_0601_001.tar`
    pub location: String,
    /// `YYMM` period code
    pub period: String,
    pub size_bytes: Option<u64>,
}

impl ShardDescriptor {
    /// Tarball file name without directories.
    pub fn file_name(&self) -> &str {
        self.location.rsplit('/').next().unwrap_or(&self.location)
    }

    /// File name without `.tar`, used for logs, bars and the journal.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.strip_suffix(".tar").unwrap_or(name)
    }
}

/// Period token embedded in a tarball name: the text between the last two
/// underscores (`arXiv_src_0601_001.tar` → `0601`).
pub fn period_token(tarball_name: &str) -> Option<&str> {
    let last = tarball_name.rfind('_')?;
    let prev = tarball_name[..last].rfind('_')?;
    let token = &tarball_name[prev + 1..last];
    (!token.is_empty()).then_some(token)
}

/// Read and parse a manifest from disk.
pub fn read_manifest(path: &Path) -> Result<Vec<ShardDescriptor>> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_manifest(&xml).with_context(|| format!("Failed to parse manifest {}", path.display()))
}

/// Retrieve the manifest from `source` into `dest` unless already present.
pub fn fetch_manifest(source: &dyn ShardSource, dest: &Path, pb: &ProgressBar) -> Result<()> {
    if dest.exists() {
        log::debug!("Using cached manifest {}", dest.display());
        return Ok(());
    }
    let tmp = dest.with_extension("xml.tmp");
    let bytes = retry_with_backoff("manifest", pb, || source.fetch(MANIFEST_NAME, &tmp, pb))
        .with_context(|| format!("Failed to fetch manifest from {}", source.describe()))?;
    std::fs::rename(&tmp, dest)?;
    log::info!("Fetched manifest ({bytes} bytes) from {}", source.describe());
    Ok(())
}

#[derive(Clone, Copy)]
enum Field {
    Filename,
    Size,
    Yymm,
}

/// Parse manifest XML. Manifest order is kept; nothing is filtered.
pub fn parse_manifest(xml: &str) -> Result<Vec<ShardDescriptor>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut shards = Vec::new();
    let mut in_file = false;
    let mut field: Option<Field> = None;
    let mut filename: Option<String> = None;
    let mut size: Option<u64> = None;
    let mut yymm: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"file" => {
                    in_file = true;
                    filename = None;
                    size = None;
                    yymm = None;
                }
                b"filename" if in_file => field = Some(Field::Filename),
                b"size" if in_file => field = Some(Field::Size),
                b"yymm" if in_file => field = Some(Field::Yymm),
                _ => field = None,
            },
            Event::Text(t) => {
                let text = t.unescape()?;
                let text = text.trim();
                match field {
                    Some(Field::Filename) => filename = Some(text.to_string()),
                    Some(Field::Size) => size = text.parse().ok(),
                    Some(Field::Yymm) => yymm = Some(text.to_string()),
                    None => {}
                }
            }
            Event::End(e) => {
                field = None;
                if e.local_name().as_ref() == b"file" {
                    in_file = false;
                    let Some(location) = filename.take() else {
                        bail!("manifest entry #{} has no <filename>", shards.len() + 1);
                    };
                    let Some(period) = yymm.take() else {
                        bail!("manifest entry {location} has no <yymm>");
                    };
                    shards.push(ShardDescriptor {
                        location,
                        period,
                        size_bytes: size.take(),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shards)
}
