//! Texpile Core - Common infrastructure for corpus ingestion pipelines
//!
//! This crate provides reusable components for fetching remote shards,
//! retrying transient failures, scheduling shard workers, and reporting
//! progress.

pub mod error;
pub mod fsutil;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod shutdown;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use error::{Retryable, ShardError};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{backoff_duration, retry_with_backoff, retry_with_policy};
pub use semaphore::Semaphore;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, shutdown_flag};
pub use stream::{
    ByteCounter, HttpConfig, SHARED_RUNTIME, StreamError, copy_to_file, download_to_file, fetch_text,
    http_client, http_config, set_http_config,
};
pub use work_queue::WorkQueue;
