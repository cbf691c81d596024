//! Texpile arXiv - math LaTeX corpus from arXiv bulk sources
//!
//! Turns the arXiv bulk-source shards into a directory of clean,
//! English-language `.tex` documents, one directory per `YYMM` period.
//!
//! # Pipeline
//!
//! - Harvest the OAI-PMH listing of the target set into a [`MetadataIndex`]
//! - Read the bulk-source manifest into an ordered shard worklist
//! - Per shard (parallel): download, unpack by era, prune, repair, promote
//! - Post-pass over the whole corpus, then train/validation splits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use texpile_arxiv::{Config, run};
//! use texpile_core::ProgressContext;
//!
//! let config = Config {
//!     output_dir: "output".into(),
//!     shard_base: "/mnt/arxiv-mirror".into(),
//!     max_shards: Some(2),
//!     ..Default::default()
//! };
//!
//! let summary = run(&config, Arc::new(ProgressContext::new()))?;
//! println!("{} documents", summary.ingest.documents);
//! ```

pub mod config;
pub mod decode;
pub mod document;
pub mod era;
pub mod error;
pub mod index;
pub mod journal;
pub mod manifest;
pub mod oai;
pub mod postpass;
pub mod prune;
pub mod repair;
pub mod runner;
pub mod source;
pub mod split;
pub mod stats;
pub mod unpack;
pub mod worker;

// Re-exports
pub use config::Config;
pub use document::{Document, DocumentStatus, RejectReason};
pub use era::{Era, classify_era};
pub use error::IngestError;
pub use index::MetadataIndex;
pub use journal::{Journal, JournalEntry, ShardStatus};
pub use manifest::ShardDescriptor;
pub use postpass::{FilterStats, PostpassConfig};
pub use runner::{load_or_build_index, run, run_postpass, write_splits};
pub use stats::{IngestSummary, RunSummary};
