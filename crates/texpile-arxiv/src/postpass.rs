//! Second pass over the promoted corpus
//!
//! Runs once after every shard has been promoted. Each document is cleaned
//! of comments, bounded to its body, then dropped if it is too short or not
//! in the target language. Clean documents pass through unchanged, so the
//! pass can be re-run safely.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use texpile_core::fsutil::remove_empty_dirs;
use whatlang::Lang;

use crate::document::{Document, DocumentStatus, RejectReason};
use crate::error::IngestError;
use crate::prune::prune;
use crate::unpack::DOC_EXTENSION;

const BEGIN_DOCUMENT: &str = r"\begin{document}";
const BEGIN_REFERENCES: &str = r"\begin{references}";

/// Commands that mark a document as structured prose.
const SECTIONING: [&str; 10] = [
    r"\part{",
    r"\chapter{",
    r"\section{",
    r"\section*{",
    r"\subsection{",
    r"\subsection*{",
    r"\subsubsection{",
    r"\subsubsection*{",
    r"\paragraph{",
    r"\subparagraph{",
];

static BIBDIV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\begin\{bibdiv\}.*?\\end\{bibdiv\}").expect("valid regex"));
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct PostpassConfig {
    /// Documents must be strictly longer than this (Unicode scalar values)
    pub min_chars: usize,
    pub target_language: Lang,
    /// Reject documents with no sectioning command or with plot dumps
    pub require_sectioning: bool,
    /// Remove `bibdiv` blocks and collapse long blank runs
    pub strip_bibdiv: bool,
}

impl Default for PostpassConfig {
    fn default() -> Self {
        Self {
            min_chars: 280,
            target_language: Lang::Eng,
            require_sectioning: false,
            strip_bibdiv: false,
        }
    }
}

/// Per-outcome counts for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: usize,
    /// Accepted documents whose text changed
    pub rewritten: usize,
    pub too_short: usize,
    pub no_features: usize,
    pub wrong_language: usize,
    pub not_prose: usize,
    pub undecodable: usize,
    /// Non-document files removed before filtering
    pub pruned: usize,
    pub errors: usize,
}

impl FilterStats {
    pub fn examined(&self) -> usize {
        self.accepted + self.rejected() + self.errors
    }

    pub fn rejected(&self) -> usize {
        self.too_short + self.no_features + self.wrong_language + self.not_prose + self.undecodable
    }

    fn count_rejection(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::TooShort { .. } => self.too_short += 1,
            RejectReason::NoLinguisticFeatures => self.no_features += 1,
            RejectReason::WrongLanguage(_) => self.wrong_language += 1,
            RejectReason::NotProse => self.not_prose += 1,
            RejectReason::DecodeExhausted => self.undecodable += 1,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.accepted += other.accepted;
        self.rewritten += other.rewritten;
        self.too_short += other.too_short;
        self.no_features += other.no_features;
        self.wrong_language += other.wrong_language;
        self.not_prose += other.not_prose;
        self.undecodable += other.undecodable;
        self.pruned += other.pruned;
        self.errors += other.errors;
        self
    }
}

/// Drop everything from the first unescaped `%` to the end of its line, on
/// every line.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let bytes = line.as_bytes();
        let cut = line
            .match_indices('%')
            .map(|(i, _)| i)
            .find(|&i| i == 0 || bytes[i - 1] != b'\\');
        match cut {
            Some(pos) => {
                out.push_str(&line[..pos]);
                if line.ends_with('\n') {
                    out.push('\n');
                }
            }
            None => out.push_str(line),
        }
    }
    out
}

/// Keep from `\begin{document}` up to (not including) `\begin{references}`.
pub fn bound_body(text: &str) -> &str {
    let text = match text.find(BEGIN_DOCUMENT) {
        Some(pos) => &text[pos..],
        None => text,
    };
    match text.find(BEGIN_REFERENCES) {
        Some(pos) => &text[..pos],
        None => text,
    }
}

/// The cleaned text a document is judged on.
pub fn clean_text(text: &str, config: &PostpassConfig) -> String {
    let stripped = strip_comments(text);
    let body = bound_body(&stripped);
    if config.strip_bibdiv {
        let body = BIBDIV.replace_all(body, "");
        BLANK_RUNS.replace_all(&body, "\n\n\n").trim().to_string()
    } else {
        body.trim().to_string()
    }
}

/// Detected language of `text`.
pub fn detect_language(text: &str) -> Result<Lang, IngestError> {
    whatlang::detect(text)
        .map(|info| info.lang())
        .ok_or(IngestError::LanguageDetectionAmbiguous)
}

/// Judge cleaned text; `Ok` means keep.
pub fn evaluate(text: &str, config: &PostpassConfig) -> Result<(), RejectReason> {
    let chars = text.chars().count();
    if chars <= config.min_chars {
        return Err(RejectReason::TooShort { chars });
    }
    if config.require_sectioning
        && (!SECTIONING.iter().any(|k| text.contains(k)) || text.contains("gnuplot"))
    {
        return Err(RejectReason::NotProse);
    }
    match detect_language(text) {
        Ok(lang) if lang == config.target_language => Ok(()),
        Ok(lang) => Err(RejectReason::WrongLanguage(lang.code().to_string())),
        Err(_) => Err(RejectReason::NoLinguisticFeatures),
    }
}

/// Clean and judge one document, committing the outcome to disk.
pub fn filter_document(path: &Path, config: &PostpassConfig) -> std::io::Result<DocumentStatus> {
    judge_document(path, config).map(|(status, _)| status)
}

/// Like [`filter_document`], also reporting whether an accepted file was
/// rewritten.
fn judge_document(path: &Path, config: &PostpassConfig) -> std::io::Result<(DocumentStatus, bool)> {
    let mut doc = Document::open(path)?;
    let cleaned = clean_text(&doc.text, config);
    match evaluate(&cleaned, config) {
        Ok(()) => {
            doc.set_text(cleaned);
            doc.status = DocumentStatus::Accepted;
        }
        Err(reason) => {
            match &reason {
                RejectReason::WrongLanguage(code) => {
                    log::info!("Non-target language ({code}): {}", path.display());
                }
                other => log::debug!("Rejected ({other}): {}", path.display()),
            }
            doc.reject(reason);
        }
    }
    let rewritten = !doc.is_rejected() && doc.is_dirty();
    Ok((doc.commit()?, rewritten))
}

/// Filter every document under `root` in parallel.
///
/// Files that are not documents are deleted first; directories left empty
/// afterwards are removed.
pub fn filter_corpus(root: &Path, config: &PostpassConfig) -> FilterStats {
    let keep = match glob::Pattern::new(&format!("*.{DOC_EXTENSION}")) {
        Ok(p) => p,
        Err(e) => {
            log::error!("Invalid document pattern: {e}");
            return FilterStats::default();
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    let prune_stats = prune(root, &keep, &mut |p| paths.push(p.to_path_buf()));
    log::info!("Post-pass over {} documents", paths.len());

    let stats = paths
        .par_iter()
        .map(|path| {
            let mut s = FilterStats::default();
            match judge_document(path, config) {
                Ok((DocumentStatus::Rejected(reason), _)) => s.count_rejection(&reason),
                Ok((_, rewritten)) => {
                    s.accepted += 1;
                    s.rewritten += usize::from(rewritten);
                }
                Err(e) => {
                    log::warn!("{}: {e}", path.display());
                    s.errors += 1;
                }
            }
            s
        })
        .reduce(FilterStats::default, FilterStats::merge);

    let mut stats = stats;
    stats.pruned = prune_stats.removed;
    stats.errors += prune_stats.errors;
    if let Err(e) = remove_empty_dirs(root) {
        log::warn!("Cannot tidy {}: {e}", root.display());
    }
    stats
}
