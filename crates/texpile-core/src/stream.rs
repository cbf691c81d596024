//! HTTP transfers with read timeout and byte counting.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync interface for compatibility with rayon workers.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use tokio::io::{AsyncRead, ReadBuf};

use crate::progress::upgrade_to_bar;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy buffer for shard downloads (1MB)
const DOWNLOAD_BUF_SIZE: usize = 1024 * 1024;

/// Process-wide HTTP behaviour, set once at startup.
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// No data for this long = stalled transfer
    pub read_timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the global HTTP config. Later calls are ignored.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, keeping the first one");
    }
}

/// Current HTTP config (defaults when never set).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error.
    ///
    /// The URL is stripped: query strings carry resumption tokens.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.without_url().to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                // 400/401/403 = bad or unsigned request, 404/410 = gone
                !matches!(status, Some(400 | 401 | 403 | 404 | 410))
            }
            Self::Io(e) => {
                // Disk full is not retryable, timeout IS retryable
                e.kind() != std::io::ErrorKind::StorageFull
            }
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .user_agent(concat!("texpile/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("HTTP client builder failed ({e}), using defaults");
            reqwest::Client::new()
        })
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// Sync reader over an HTTP response body
pub type BodyReader = CountingReader<TimeoutReader>;

/// HTTP GET → sync body reader with byte counter
///
/// Returns (reader, byte_counter, total_bytes)
pub fn open_body_reader(url: &str) -> Result<(BodyReader, ByteCounter, Option<u64>), StreamError> {
    let (reader, total_bytes) = SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(StreamError::from_reqwest)?;

        let total_bytes = response.content_length();

        let stream = response.bytes_stream();
        let async_reader = tokio_util::io::StreamReader::new(
            stream.map(|result| result.map_err(io::Error::other)),
        );

        Ok::<_, StreamError>((TimeoutReader::new(Box::pin(async_reader)), total_bytes))
    })?;

    let counter = Arc::new(AtomicU64::new(0));
    let counting_reader = CountingReader::new(reader, counter.clone());

    Ok((counting_reader, counter, total_bytes))
}

/// Copy `reader` into a new file at `dest`, advancing `pb` as bytes arrive.
///
/// A known `total` switches `pb` to a byte bar. Returns bytes written.
pub fn copy_to_file(
    reader: impl Read,
    dest: &Path,
    total: Option<u64>,
    pb: &ProgressBar,
) -> io::Result<u64> {
    if let Some(total) = total {
        upgrade_to_bar(pb, total);
    }
    let file = File::create(dest)?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_BUF_SIZE, file);
    let written = io::copy(&mut pb.wrap_read(reader), &mut writer)?;
    writer.flush()?;
    Ok(written)
}

/// Stream `url` into `dest`, verifying the advertised length.
///
/// Returns bytes written.
pub fn download_to_file(url: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, StreamError> {
    let (reader, _counter, total_bytes) = open_body_reader(url)?;
    let written = copy_to_file(reader, dest, total_bytes, pb)?;

    if let Some(expected) = total_bytes {
        if written != expected {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short body: {written} of {expected} bytes"),
            )));
        }
    }
    Ok(written)
}

/// HTTP GET with query parameters → body text.
pub fn fetch_text(url: &str, query: &[(&str, &str)]) -> Result<String, StreamError> {
    let read_timeout = http_config().read_timeout;
    SHARED_RUNTIME.handle().block_on(async {
        let request = async {
            SHARED_CLIENT
                .get(url)
                .query(query)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(StreamError::from_reqwest)?
                .text()
                .await
                .map_err(StreamError::from_reqwest)
        };
        match tokio::time::timeout(read_timeout * 4, request).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "listing request timed out",
            ))),
        }
    })
}

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, count: ByteCounter) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Async-to-sync bridge with read timeout.
///
/// Wraps an async reader and provides sync Read interface.
/// Each read operation has a timeout - if no data arrives within the
/// configured read timeout, returns TimedOut error (which triggers retry).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self {
            inner,
            timeout: http_config().read_timeout,
        }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}
