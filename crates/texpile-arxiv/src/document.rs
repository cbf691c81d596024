//! An extracted document and its validation state

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use texpile_core::fsutil::{force_remove_file, write_atomic};

/// Why a document was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No decoder in the chain accepted the bytes
    DecodeExhausted,
    /// Not longer than the minimum after cleanup
    TooShort { chars: usize },
    /// Detector found nothing to analyze
    NoLinguisticFeatures,
    /// Detected language differs from the target
    WrongLanguage(String),
    /// No sectioning commands, or a plotting dump
    NotProse,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeExhausted => f.write_str("undecodable"),
            Self::TooShort { chars } => write!(f, "too short ({chars} chars)"),
            Self::NoLinguisticFeatures => f.write_str("no linguistic features"),
            Self::WrongLanguage(code) => write!(f, "language {code}"),
            Self::NotProse => f.write_str("not prose"),
        }
    }
}

/// Lifecycle: `Raw → Repaired → Accepted | Rejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Raw,
    Repaired,
    Accepted,
    Rejected(RejectReason),
}

/// A document on disk plus its in-memory text.
///
/// Nothing is written until [`commit`](Self::commit): accepted text replaces
/// the file atomically, rejected documents are deleted.
#[derive(Debug)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub status: DocumentStatus,
    dirty: bool,
}

impl Document {
    /// A freshly decoded document.
    pub fn new(path: impl Into<PathBuf>, text: String) -> Self {
        Self {
            path: path.into(),
            text,
            status: DocumentStatus::Raw,
            dirty: false,
        }
    }

    /// Read a document already known to be UTF-8.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(path, std::fs::read_to_string(path)?))
    }

    /// Replace the text, tracking whether it actually changed.
    pub fn set_text(&mut self, text: String) {
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }

    /// Mark the text as needing a rewrite even if unchanged (e.g. re-encoded).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn reject(&mut self, reason: RejectReason) {
        self.status = DocumentStatus::Rejected(reason);
    }

    /// Whether `commit` would rewrite the file.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, DocumentStatus::Rejected(_))
    }

    /// Serialize the status to the filesystem.
    ///
    /// `Rejected` removes the file; any other status rewrites it when the
    /// text changed. Returns the final status.
    pub fn commit(self) -> io::Result<DocumentStatus> {
        match &self.status {
            DocumentStatus::Rejected(_) => match force_remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            },
            _ if self.dirty => write_atomic(&self.path, self.text.as_bytes())?,
            _ => {}
        }
        Ok(self.status)
    }
}
