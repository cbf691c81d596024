//! Error taxonomy for arXiv ingestion
//!
//! Only [`IngestError::MetadataFetch`] and manifest failures abort a run.
//! Everything else is scoped to one shard or one document.

use std::fmt;
use std::path::PathBuf;

use texpile_core::{ShardError, StreamError};

#[derive(Debug)]
pub enum IngestError {
    /// Listing response unusable; the index would be incomplete (fatal)
    MetadataFetch(String),
    /// Shard transfer failed after retries (shard recorded as failed)
    ShardDownload { shard: String, source: ShardError },
    /// Period code that is not `YYMM`
    InvalidPeriod(String),
    /// Shard layout or member payload could not be unpacked
    Unpack { shard: String, message: String },
    /// No decoder in the chain produced text (document dropped)
    DecodeExhausted(PathBuf),
    /// Language detector found no linguistic features (document dropped)
    LanguageDetectionAmbiguous,
    Io(std::io::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataFetch(msg) => write!(f, "metadata fetch failed: {msg}"),
            Self::ShardDownload { shard, source } => {
                write!(f, "{shard}: download failed: {source}")
            }
            Self::InvalidPeriod(p) => write!(f, "invalid period code {p:?} (expected YYMM)"),
            Self::Unpack { shard, message } => write!(f, "{shard}: unpack failed: {message}"),
            Self::DecodeExhausted(path) => {
                write!(f, "{}: no decoder produced text", path.display())
            }
            Self::LanguageDetectionAmbiguous => f.write_str("no linguistic features to analyze"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ShardDownload { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StreamError> for IngestError {
    fn from(e: StreamError) -> Self {
        Self::MetadataFetch(e.to_string())
    }
}

impl From<quick_xml::Error> for IngestError {
    fn from(e: quick_xml::Error) -> Self {
        Self::MetadataFetch(format!("malformed XML: {e}"))
    }
}

impl IngestError {
    /// Whether this error must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MetadataFetch(_))
    }

    pub(crate) fn unpack(shard: &str, message: impl Into<String>) -> Self {
        Self::Unpack {
            shard: shard.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_metadata_errors_are_fatal() {
        assert!(IngestError::MetadataFetch("bad".into()).is_fatal());
        assert!(!IngestError::InvalidPeriod("9913".into()).is_fatal());
        assert!(!IngestError::LanguageDetectionAmbiguous.is_fatal());
        assert!(!IngestError::DecodeExhausted(PathBuf::from("a.tex")).is_fatal());
    }

    #[test]
    fn stream_error_maps_to_metadata_fetch() {
        let e = StreamError::Http {
            status: Some(503),
            message: "busy".into(),
        };
        assert!(matches!(IngestError::from(e), IngestError::MetadataFetch(_)));
    }

    #[test]
    fn display_names_the_shard() {
        let e = IngestError::unpack("arXiv_src_0601_001", "no 0601/ directory");
        assert_eq!(
            e.to_string(),
            "arXiv_src_0601_001: unpack failed: no 0601/ directory"
        );
    }
}
