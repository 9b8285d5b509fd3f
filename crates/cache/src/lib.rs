//! Bounded cache of mounted archives.
//!
//! Remote archives (zip files, tarballs, web archives) are expensive to
//! fetch and index. This crate keeps recently used ones copied to a local
//! directory and mounted, so members can be read repeatedly without
//! refetching the archive.
//!
//! # Architecture
//! - [`ArchiveCache`]: the table of entries keyed by [`CacheKey`], bounded
//!   by total declared size and entry count ([`Limits`]), evicting the least
//!   recently used entry first.
//! - [`ContentSource`](source::ContentSource): supplies the bytes of a
//!   resource on a miss, together with the hints used to pick a mount
//!   provider.
//! - [`MountHandle`]: what callers get back. Holding one pins the mount;
//!   eviction only unmounts and deletes once the last handle is gone.
//!
//! The cache directory is treated as owned by the cache: files are created
//! with the [`FILE_PREFIX`] and removed on eviction, on
//! [`clear()`](ArchiveCache::clear), and by
//! [`wipe_directory()`](ArchiveCache::wipe_directory).

mod cache;
mod entry;
pub mod error;
mod handle;
mod key;
pub mod source;

pub use crate::cache::{ArchiveCache, FILE_PREFIX};
pub use crate::entry::{CacheEntry, CacheStats, EntryInfo, Limits, Validity};
pub use crate::handle::MountHandle;
pub use crate::key::CacheKey;
