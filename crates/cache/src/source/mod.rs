//! Where archive bytes come from.
//!
//! The cache never fetches anything itself: on a miss it asks a
//! [`ContentSource`] for a byte stream and copies it into a file it owns.

mod file;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::file::FileSource;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MemorySource;
use crate::error::Result;
use async_trait::async_trait;
use std::io::Read;
use time::OffsetDateTime;

pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Timestamps captured from the resource when it is cached. Never updated
/// afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Properties {
    /// When the archive was captured by the crawler, if known.
    pub fetch_time: Option<OffsetDateTime>,
    /// The resource's `Last-Modified`.
    pub last_modified: Option<OffsetDateTime>,
    /// The resource's `Date`.
    pub date: Option<OffsetDateTime>,
}

/// A resource that may be an archive.
///
/// Everything except [`reader()`](Self::reader) is plain metadata that must
/// be cheap to produce: it is consulted while deciding whether the resource
/// is an archive at all, before any bytes are requested.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open the full byte stream of the resource.
    ///
    /// The reader is consumed on a blocking thread, so it may do
    /// synchronous I/O.
    async fn reader(&self) -> Result<BoxSyncRead>;

    /// Size the resource claims to have. Used for size accounting instead of
    /// the number of bytes actually copied, when present.
    fn declared_size(&self) -> Option<u64>;

    /// File name, path, or URL ending with the archive's extension
    /// (e.g. `crawl-00001.warc.gz`).
    fn extension_hint(&self) -> Option<&str>;

    /// MIME type of the resource, used when the extension is unknown.
    fn content_type(&self) -> Option<&str> {
        None
    }

    fn properties(&self) -> Properties {
        Properties::default()
    }
}
