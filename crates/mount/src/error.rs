//! Mount Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use arcache_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};
use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A mount error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for mount operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Backing archive file does not exist
    #[display("archive not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The archive is truncated or structurally invalid
    #[display("malformed archive: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The requested member does not exist inside the archive
    #[display("member not found: {_0}")]
    MemberNotFound(#[error(not(source))] String),
    /// The mount has already been released
    #[display("archive is unmounted: {}", _0.display())]
    Unmounted(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Decompression of a wrapped archive failed
    #[display("compression error: {_0}")]
    Compression(CompressionErrorKind),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
impl ErrorKind {
    /// Convert a compression error into a mount error, preserving the
    /// compress crate's `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }

    pub(crate) fn io(err: IoError, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
