//! Common error type for shard transfers

use crate::stream::StreamError;

/// Error from fetching or staging a single shard.
///
/// Wraps either a network/HTTP error ([`StreamError`]) or a local I/O error.
#[derive(Debug)]
pub enum ShardError {
    Stream(StreamError),
    Io(std::io::Error),
}

impl std::fmt::Display for ShardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for ShardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<StreamError> for ShardError {
    fn from(e: StreamError) -> Self {
        match e {
            // A local write failure mid-download is still a local failure
            StreamError::Io(io) if io.kind() == std::io::ErrorKind::StorageFull => Self::Io(io),
            other => Self::Stream(other),
        }
    }
}

impl From<std::io::Error> for ShardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        StreamError::is_retryable(self)
    }
}

impl Retryable for ShardError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_retryable(),
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}
