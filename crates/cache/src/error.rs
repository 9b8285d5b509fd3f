//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures of the mount layer are kept
//! as children in the error tree.

use crate::CacheKey;
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The cache directory is missing, not a directory, or not writable
    #[display("unusable cache directory: {}", _0.display())]
    Directory(#[error(not(source))] PathBuf),
    /// The content source could not provide the archive bytes
    #[display("content source failed for {_0}")]
    Source(#[error(not(source))] CacheKey),
    /// Copying archive bytes into the cache directory failed
    #[display("failed to copy archive for {_0}")]
    Copy(#[error(not(source))] CacheKey),
    /// The archive was copied but could not be mounted
    #[display("failed to mount archive for {_0}")]
    Mount(#[error(not(source))] CacheKey),
    /// The background fill task panicked or was cancelled by the runtime
    #[display("fill task aborted for {_0}")]
    Task(#[error(not(source))] CacheKey),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Copy(_) | Self::Io(_))
    }
}
