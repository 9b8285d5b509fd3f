//! Archives that already live on the local filesystem.

use super::{BoxSyncRead, ContentSource, Properties};
use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

/// A local file used as the content of a cache entry.
///
/// Size and modification time are read once, in [`FileSource::open()`]. The
/// file is copied into the cache directory on a miss like any other source,
/// so later changes to the original do not affect mounted copies.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    hint: Option<String>,
    size: u64,
    modified: Option<OffsetDateTime>,
}
impl FileSource {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path).await.map_err(ErrorKind::Io)?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            )));
        }
        Ok(Self {
            hint: path.file_name().and_then(|name| name.to_str()).map(str::to_string),
            size: metadata.len(),
            modified: metadata.modified().ok().map(OffsetDateTime::from),
            path,
        })
    }

    /// Override the extension hint, for files saved without their original
    /// name.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under which this file is cached when it isn't part of any
    /// collection.
    pub fn key(&self) -> CacheKey {
        CacheKey::new("file", self.path.to_string_lossy())
    }
}

#[async_trait]
impl ContentSource for FileSource {
    async fn reader(&self) -> Result<BoxSyncRead> {
        let file = fs::File::open(&self.path).await.or_raise(|| ErrorKind::Source(self.key()))?;
        // The copy runs on a blocking thread.
        Ok(Box::new(file.into_std().await))
    }

    fn declared_size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn extension_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    fn properties(&self) -> Properties {
        Properties {
            last_modified: self.modified,
            ..Properties::default()
        }
    }
}
