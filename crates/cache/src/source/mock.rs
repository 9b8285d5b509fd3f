//! In-memory content source for testing.

use super::{BoxSyncRead, ContentSource, Properties};
use crate::CacheKey;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Failure {
    /// `reader()` itself fails.
    Open,
    /// The stream breaks after this many bytes.
    After(usize),
}

/// A [`ContentSource`] serving bytes from memory.
///
/// Clones share a read counter, so tests can check how many times the cache
/// actually asked for the content.
#[derive(Debug, Clone)]
pub struct MemorySource {
    hint: Option<String>,
    content_type: Option<String>,
    data: Arc<[u8]>,
    declared_size: Option<u64>,
    properties: Properties,
    delay: Option<Duration>,
    failure: Option<Failure>,
    reads: Arc<AtomicUsize>,
}
impl MemorySource {
    /// Declared size defaults to the length of `data`.
    pub fn new(hint: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            hint: Some(hint.into()),
            content_type: None,
            declared_size: Some(data.len() as u64),
            data: data.into(),
            properties: Properties::default(),
            delay: None,
            failure: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn without_hint(mut self) -> Self {
        self.hint = None;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_declared_size(mut self, size: Option<u64>) -> Self {
        self.declared_size = size;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Sleep before handing out the reader, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `reader()` fail.
    pub fn failing(mut self) -> Self {
        self.failure = Some(Failure::Open);
        self
    }

    /// Make the stream return an error after `bytes` bytes.
    pub fn truncated_after(mut self, bytes: usize) -> Self {
        self.failure = Some(Failure::After(bytes));
        self
    }

    /// Number of times `reader()` has been called on this source or any of
    /// its clones.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn key(&self) -> CacheKey {
        CacheKey::new("memory", self.hint.clone().unwrap_or_default())
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn reader(&self) -> Result<BoxSyncRead> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let data = Cursor::new(self.data.to_vec());
        match self.failure {
            None => Ok(Box::new(data)),
            Some(Failure::Open) => exn::bail!(ErrorKind::Source(self.key())),
            Some(Failure::After(bytes)) => Ok(Box::new(data.take(bytes as u64).chain(Broken))),
        }
    }

    fn declared_size(&self) -> Option<u64> {
        self.declared_size
    }

    fn extension_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn properties(&self) -> Properties {
        self.properties
    }
}

struct Broken;
impl Read for Broken {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "content source went away"))
    }
}
