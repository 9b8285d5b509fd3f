//! Top-level Error Types
//!
//! Errors from the cache and configuration crates are kept as children of
//! these, so the full tree is available when reporting.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An arcache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for arcache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The cache directory cannot be created, is not a directory, or is not
    /// writable
    #[display("cache directory unusable: {}", _0.display())]
    Directory(#[error(not(source))] PathBuf),
    /// Configuration could not be loaded or is invalid
    #[display("configuration error")]
    Config,
    /// A cache operation failed
    #[display("cache error")]
    Cache,
    /// The resource is not an archive any provider can mount
    #[display("not a supported archive: {}", _0.display())]
    NotAnArchive(#[error(not(source))] PathBuf),
    /// Reading an archive member failed
    #[display("failed to read member `{_0}`")]
    Member(#[error(not(source))] String),
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache)
    }
}
