//! Compression Error Types

use derive_more::{Display, Error};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Cloneable so that callers can lift the kind into their own error type
/// while keeping this error as a child.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A decoder could not be set up for the stream.
    #[display("failed to initialise decoder")]
    Decoder,
    /// The compressed data is corrupt or truncated.
    #[display("corrupt compressed data")]
    Corrupt,
    #[display("I/O error")]
    Io,
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        *self == Self::Io
    }
}
