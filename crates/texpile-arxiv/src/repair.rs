//! First-pass document repair: decode, truncate, rewrite as UTF-8

use std::path::Path;

use texpile_core::fsutil::relax_permissions;

use crate::decode::{DecoderChain, UTF8_BOM};
use crate::document::{Document, DocumentStatus, RejectReason};
use crate::error::IngestError;

const END_DOCUMENT: &str = r"\end{document}";
const BIBLIOGRAPHY_MARKERS: [&str; 2] = [r"\Refs", r"\begin{thebibliography}"];

/// Cut after the first `\end{document}`, then before the first
/// bibliography marker. Missing markers leave the text as is.
pub fn truncate_document(text: &str) -> &str {
    let text = match text.find(END_DOCUMENT) {
        Some(pos) => &text[..pos + END_DOCUMENT.len()],
        None => text,
    };
    match BIBLIOGRAPHY_MARKERS.iter().filter_map(|m| text.find(m)).min() {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// Repairs kept files in place during shard unpacking.
#[derive(Default)]
pub struct Repairer {
    chain: DecoderChain,
}

impl Repairer {
    pub fn new(chain: DecoderChain) -> Self {
        Self { chain }
    }

    /// Decode with the chain, truncate, and rewrite `path` as UTF-8.
    ///
    /// Undecodable files are removed and reported as rejected; errors never
    /// escape so one bad file cannot fail its shard.
    pub fn repair_in_place(&self, path: &Path) -> DocumentStatus {
        match self.try_repair(path) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("Repair failed, dropping {}: {e}", path.display());
                let mut doc = Document::new(path, String::new());
                doc.reject(RejectReason::DecodeExhausted);
                doc.commit().unwrap_or_else(|e| {
                    log::warn!("Cannot remove {}: {e}", path.display());
                    DocumentStatus::Rejected(RejectReason::DecodeExhausted)
                })
            }
        }
    }

    fn try_repair(&self, path: &Path) -> Result<DocumentStatus, IngestError> {
        let bytes = std::fs::read(path)?;
        let (text, decoder) = self
            .chain
            .decode(&bytes)
            .ok_or_else(|| IngestError::DecodeExhausted(path.to_path_buf()))?;
        if decoder != "utf-8" {
            log::debug!("{}: decoded as {decoder}", path.display());
        }

        let truncated = truncate_document(&text).to_string();
        let mut doc = Document::new(path, text);
        if decoder != "utf-8" || bytes.starts_with(UTF8_BOM) {
            doc.mark_dirty();
        }
        doc.set_text(truncated);
        doc.status = DocumentStatus::Repaired;

        relax_permissions(path)?;
        Ok(doc.commit()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Utf8;
    use tempfile::TempDir;

    #[test]
    fn truncates_after_end_document() {
        let text = "\\begin{document}body\\end{document}\n% trailing junk";
        assert_eq!(truncate_document(text), "\\begin{document}body\\end{document}");
    }

    #[test]
    fn strips_bibliography() {
        let text = "intro \\begin{thebibliography}{9}\\bibitem{a} A\\end{thebibliography}";
        assert_eq!(truncate_document(text), "intro ");
        assert_eq!(truncate_document("text \\Refs \\ref A"), "text ");
    }

    #[test]
    fn earliest_bibliography_marker_wins() {
        let text = "a \\begin{thebibliography} b \\Refs c";
        assert_eq!(truncate_document(text), "a ");
    }

    #[test]
    fn end_marker_applies_before_bibliography_search() {
        // bibliography after \end{document} is already gone
        let text = "body\\end{document}\\begin{thebibliography}";
        assert_eq!(truncate_document(text), "body\\end{document}");
    }

    #[test]
    fn no_markers_is_identity() {
        assert_eq!(truncate_document("plain text"), "plain text");
    }

    #[test]
    fn repair_rewrites_latin1_as_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tex");
        std::fs::write(&path, b"Poincar\xE9\\end{document}tail").unwrap();

        let status = Repairer::default().repair_in_place(&path);
        assert_eq!(status, DocumentStatus::Repaired);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Poincaré\\end{document}");
    }

    #[test]
    fn repair_latin1_without_truncation_still_reencodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tex");
        std::fs::write(&path, b"caf\xE9").unwrap();
        Repairer::default().repair_in_place(&path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "café");
    }

    #[test]
    fn repair_drops_utf8_bom_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tex");
        std::fs::write(&path, b"\xEF\xBB\xBF\\section{Intro}").unwrap();

        assert_eq!(Repairer::default().repair_in_place(&path), DocumentStatus::Repaired);
        assert_eq!(std::fs::read(&path).unwrap(), b"\\section{Intro}");
    }

    #[test]
    fn undecodable_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.tex");
        std::fs::write(&path, b"\xC3\x28").unwrap();

        let repairer = Repairer::new(DecoderChain::new(vec![Box::new(Utf8)]));
        let status = repairer.repair_in_place(&path);
        assert_eq!(status, DocumentStatus::Rejected(RejectReason::DecodeExhausted));
        assert!(!path.exists());
    }
}
