use crate::source::Properties;
use crate::{CacheKey, MountHandle};
use derive_more::Display;
use std::path::PathBuf;

/// Lifecycle state of a table slot.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// A fill is in progress; no mount exists yet.
    #[display("reserved")]
    Reserved,
    /// Mounted and counted against the limits.
    #[display("valid")]
    Valid,
    /// No longer tracked by the cache; existing handles keep working.
    #[display("invalidated")]
    Invalidated,
}

/// A cached, mounted archive.
///
/// Cloning an entry clones its [`MountHandle`], pinning the mount.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) key: CacheKey,
    pub(crate) handle: MountHandle,
    pub(crate) declared_size: u64,
    pub(crate) properties: Properties,
    pub(crate) recency: u64,
}
impl CacheEntry {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// URL the archive was fetched from.
    pub fn source_url(&self) -> &str {
        self.key.url()
    }

    pub fn handle(&self) -> &MountHandle {
        &self.handle
    }

    pub fn into_handle(self) -> MountHandle {
        self.handle
    }

    /// Size this entry is accounted as.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Position in the recency order at the time this value was taken;
    /// higher is more recent.
    pub fn recency(&self) -> u64 {
        self.recency
    }

    pub fn validity(&self) -> Validity {
        if self.handle.is_invalidated() {
            Validity::Invalidated
        } else {
            Validity::Valid
        }
    }
}

/// Point-in-time description of one table slot, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub validity: Validity,
    /// Zero while the slot is reserved and the size isn't known yet.
    pub declared_size: u64,
    pub recency: u64,
    pub path: Option<PathBuf>,
    pub properties: Properties,
    pub members: usize,
    pub pins: usize,
}

/// Upper bounds enforced before every insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_bytes: u64,
    pub max_entries: usize,
}
impl Limits {
    pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new(max_bytes: u64, max_entries: usize) -> Self {
        Self { max_bytes, max_entries }
    }
}
impl Default for Limits {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_BYTES, Self::DEFAULT_MAX_ENTRIES)
    }
}

/// Aggregate counters.
///
/// `entries` and `current_bytes` describe the table right now; the others
/// only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub reserved: usize,
    pub current_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub overcommits: u64,
}
