//! The bounded archive table.

use crate::entry::{CacheEntry, CacheStats, EntryInfo, Limits, Validity};
use crate::error::{ErrorKind, Result};
use crate::source::{BoxSyncRead, ContentSource, Properties};
use crate::{CacheKey, MountHandle};
use arcache_mount::{Registry, Resolved};
use exn::ResultExt;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::instrument;

/// Prefix of every file the cache creates. Wiping the directory only ever
/// touches files carrying it.
pub const FILE_PREFIX: &str = "arcache-";
// Enough for every compression magic number.
const SNIFF_LEN: usize = 8;

enum Slot {
    /// A fill is in flight. Waiters watch for the finished handle; the
    /// sender being dropped without a value means the fill was abandoned.
    Reserved {
        id: u64,
        ready: watch::Receiver<Option<MountHandle>>,
    },
    Valid(CacheEntry),
}

#[derive(Default)]
struct Table {
    slots: BTreeMap<CacheKey, Slot>,
    limits: Limits,
    current_bytes: u64,
    valid: usize,
    clock: u64,
    next_reservation: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    overcommits: u64,
}
impl Table {
    /// Look up a valid entry, marking it most recently used.
    fn touch(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let Some(Slot::Valid(entry)) = self.slots.get_mut(key) else {
            return None;
        };
        self.clock += 1;
        entry.recency = self.clock;
        self.hits += 1;
        Some(entry.clone())
    }

    fn is_reserved_by(&self, key: &CacheKey, id: u64) -> bool {
        matches!(self.slots.get(key), Some(Slot::Reserved { id: current, .. }) if *current == id)
    }

    fn insert(&mut self, entry: CacheEntry) {
        self.current_bytes = self.current_bytes.saturating_add(entry.declared_size);
        self.valid += 1;
        self.slots.insert(entry.key.clone(), Slot::Valid(entry));
    }

    /// Remove a slot, keeping the aggregates in step and marking removed
    /// entries as invalidated.
    fn take(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        if let Slot::Valid(entry) = &slot {
            self.current_bytes = self.current_bytes.saturating_sub(entry.declared_size);
            self.valid -= 1;
            entry.handle.invalidate();
        }
        Some(slot)
    }

    /// Least recently used valid entry. Recency values are unique, key order
    /// only matters if that ever stops being true.
    fn lru(&self) -> Option<CacheKey> {
        self.slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Valid(entry) => Some((entry.recency, key)),
                Slot::Reserved { .. } => None,
            })
            .min()
            .map(|(_, key)| key.clone())
    }

    fn evict_until(&mut self, fits: impl Fn(&Table) -> bool) -> Vec<CacheEntry> {
        let mut victims = Vec::new();
        while !fits(self) {
            let Some(key) = self.lru() else {
                break;
            };
            if let Some(Slot::Valid(entry)) = self.take(&key) {
                victims.push(entry);
            }
        }
        self.evictions += victims.len() as u64;
        victims
    }

    /// Evict until one more entry of `incoming` bytes fits. If nothing is
    /// left to evict and it still doesn't fit, the entry is admitted anyway.
    fn make_room(&mut self, incoming: u64) -> Vec<CacheEntry> {
        let victims = self.evict_until(|t| {
            t.current_bytes.saturating_add(incoming) <= t.limits.max_bytes && t.valid < t.limits.max_entries
        });
        if self.current_bytes.saturating_add(incoming) > self.limits.max_bytes {
            self.overcommits += 1;
            tracing::warn!(
                incoming,
                current_bytes = self.current_bytes,
                max_bytes = self.limits.max_bytes,
                "Archive does not fit in the cache; exceeding the size limit"
            );
        }
        victims
    }

    fn clear(&mut self) -> Vec<Slot> {
        let slots = std::mem::take(&mut self.slots);
        self.current_bytes = 0;
        self.valid = 0;
        slots
            .into_values()
            .inspect(|slot| {
                if let Slot::Valid(entry) = slot {
                    entry.handle.invalidate();
                }
            })
            .collect()
    }
}

/// Holds a `Reserved` slot for the duration of a fill. Dropping it without
/// committing (error, cancellation, panic) removes the slot, provided it is
/// still ours, and wakes the waiters so they retry.
struct Reservation<'a> {
    cache: &'a ArchiveCache,
    key: CacheKey,
    id: u64,
    ready: Option<watch::Sender<Option<MountHandle>>>,
}
impl Reservation<'_> {
    /// Swap the reservation for a valid entry. Returns the entries evicted
    /// to make room, or `None` if the reservation was invalidated or cleared
    /// while the fill was running.
    fn commit(mut self, handle: &MountHandle, declared_size: u64, properties: Properties) -> Option<Vec<CacheEntry>> {
        let mut table = self.cache.lock();
        if !table.is_reserved_by(&self.key, self.id) {
            return None;
        }
        let victims = table.make_room(declared_size);
        table.clock += 1;
        let entry = CacheEntry {
            key: self.key.clone(),
            handle: handle.clone(),
            declared_size,
            properties,
            recency: table.clock,
        };
        table.insert(entry);
        drop(table);
        if let Some(ready) = self.ready.take() {
            ready.send_replace(Some(handle.clone()));
        }
        Some(victims)
    }
}
impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.ready.is_none() {
            return;
        }
        let mut table = self.cache.lock();
        if table.is_reserved_by(&self.key, self.id) {
            table.slots.remove(&self.key);
            tracing::debug!(key = %self.key, "Released reservation of abandoned fill");
        }
    }
}

/// A bounded, least-recently-used cache of mounted archives.
///
/// Keys map to archives that have been copied into the cache directory and
/// mounted. Lookups that miss copy the content from a [`ContentSource`],
/// mount it with the provider chosen by the [`Registry`], and evict the
/// least recently used entries first if the new entry would break the
/// [`Limits`].
///
/// Evicting an entry never pulls a mount out from under a reader: every
/// [`MountHandle`] pins its mount, and the file is only removed once the
/// last handle is dropped.
///
/// All methods take `&self`; share the cache behind an [`Arc`](std::sync::Arc).
/// The table lock is never held across I/O or an `.await`.
pub struct ArchiveCache {
    directory: PathBuf,
    registry: Registry,
    table: Mutex<Table>,
}
impl ArchiveCache {
    /// Create an empty cache storing its files in `directory`, which must
    /// already exist.
    pub fn new(directory: impl Into<PathBuf>, limits: Limits, registry: Registry) -> Result<Self> {
        let directory = directory.into();
        let metadata = std::fs::metadata(&directory).or_raise(|| ErrorKind::Directory(directory.clone()))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::Directory(directory));
        }
        Ok(Self {
            directory,
            registry,
            table: Mutex::new(Table {
                limits,
                ..Table::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Return the mount for `key`, creating it from `source` on a miss.
    ///
    /// Returns `Ok(None)` if `source` is not an archive type any registered
    /// provider understands; nothing is cached in that case. Concurrent
    /// calls for the same key share a single fill. If the entry is
    /// invalidated while its fill is running, the mount is still returned
    /// but is not cached.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_create_mount(&self, key: &CacheKey, source: &dyn ContentSource) -> Result<Option<MountHandle>> {
        let (reservation, resolved) = loop {
            let mut pending = {
                let mut table = self.lock();
                if let Some(entry) = table.touch(key) {
                    tracing::trace!("Cache hit");
                    return Ok(Some(entry.into_handle()));
                }
                if let Some(Slot::Reserved { ready, .. }) = table.slots.get(key) {
                    ready.clone()
                } else {
                    table.misses += 1;
                    let Some(resolved) = self.registry.resolve(source.extension_hint(), source.content_type()) else {
                        tracing::debug!(
                            hint = ?source.extension_hint(),
                            content_type = ?source.content_type(),
                            "Not a mountable archive"
                        );
                        return Ok(None);
                    };
                    table.next_reservation += 1;
                    let id = table.next_reservation;
                    let (ready, receiver) = watch::channel(None);
                    table.slots.insert(key.clone(), Slot::Reserved { id, ready: receiver });
                    let reservation = Reservation {
                        cache: self,
                        key: key.clone(),
                        id,
                        ready: Some(ready),
                    };
                    break (reservation, resolved);
                }
            };
            tracing::debug!("Waiting for concurrent fill");
            let filled = pending.wait_for(Option::is_some).await.ok().and_then(|handle| handle.clone());
            if let Some(handle) = filled {
                // Count it as a hit if it's still cached; either way the
                // handle is usable.
                let cached = self.lock().touch(key);
                return Ok(Some(cached.map(CacheEntry::into_handle).unwrap_or(handle)));
            }
            tracing::debug!("Concurrent fill was abandoned; retrying");
        };

        tracing::debug!(kind = %resolved.kind, provider = resolved.provider.name(), "Cache miss; filling");
        let declared_size = source.declared_size();
        let properties = source.properties();
        let reader = source.reader().await.or_raise(|| ErrorKind::Source(key.clone()))?;
        let directory = self.directory.clone();
        let fill_key = key.clone();
        let (handle, copied) = tokio::task::spawn_blocking(move || fill(&directory, &fill_key, resolved, reader))
            .await
            .or_raise(|| ErrorKind::Task(key.clone()))??;

        let size = declared_size.unwrap_or(copied);
        match reservation.commit(&handle, size, properties) {
            Some(victims) => {
                tracing::debug!(size, copied, path = %handle.path().display(), "Cached archive");
                release(victims);
            },
            None => {
                handle.invalidate();
                tracing::debug!("Entry was invalidated during fill; returning uncached mount");
            },
        }
        Ok(Some(handle))
    }

    /// Look up a cached entry without filling, marking it most recently
    /// used.
    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().touch(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        matches!(self.lock().slots.get(key), Some(Slot::Valid(_)))
    }

    /// Evict least recently used entries until an entry of `incoming` bytes
    /// fits. Called automatically before every insertion.
    pub fn ensure_space(&self, incoming: u64) {
        let victims = self.lock().make_room(incoming);
        release(victims);
    }

    /// Drop the entry for `key`, or abandon its in-flight fill. Returns
    /// `false` if the key wasn't in the table.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.lock().take(key);
        match removed {
            Some(Slot::Valid(entry)) => {
                tracing::info!(key = %key, pins = entry.handle.pins() - 1, "Invalidated cached archive");
                true
            },
            Some(Slot::Reserved { .. }) => {
                tracing::info!(key = %key, "Invalidated in-flight fill");
                true
            },
            None => false,
        }
    }

    /// Remove every entry and reservation. Files of entries nobody else
    /// holds a handle to are deleted before this returns.
    pub fn clear(&self) {
        let slots = self.lock().clear();
        tracing::info!(entries = slots.len(), "Cleared archive cache");
        drop(slots);
    }

    pub fn limits(&self) -> Limits {
        self.lock().limits
    }

    /// Replace the limits. Nothing is evicted here; the new limits apply
    /// from the next insertion (or [`ensure_space()`](Self::ensure_space)) on.
    pub fn set_limits(&self, limits: Limits) {
        self.lock().limits = limits;
        tracing::info!(max_bytes = limits.max_bytes, max_entries = limits.max_entries, "Updated cache limits");
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.lock();
        CacheStats {
            entries: table.valid,
            reserved: table.slots.len() - table.valid,
            current_bytes: table.current_bytes,
            hits: table.hits,
            misses: table.misses,
            evictions: table.evictions,
            overcommits: table.overcommits,
        }
    }

    /// Describe every slot, ordered by key.
    pub fn snapshot(&self) -> Vec<EntryInfo> {
        let table = self.lock();
        table
            .slots
            .iter()
            .map(|(key, slot)| match slot {
                Slot::Reserved { .. } => EntryInfo {
                    key: key.clone(),
                    validity: Validity::Reserved,
                    declared_size: 0,
                    recency: 0,
                    path: None,
                    properties: Properties::default(),
                    members: 0,
                    pins: 0,
                },
                Slot::Valid(entry) => EntryInfo {
                    key: key.clone(),
                    validity: entry.validity(),
                    declared_size: entry.declared_size,
                    recency: entry.recency,
                    path: Some(entry.handle.path().to_path_buf()),
                    properties: entry.properties,
                    members: entry.handle.members().len(),
                    // Not counting the table's own reference.
                    pins: entry.handle.pins() - 1,
                },
            })
            .collect()
    }

    /// Delete leftover cache files from the directory, such as those of a
    /// previous process. Files of entries currently in the table are kept.
    ///
    /// Evicted entries that are still pinned are not in the table, so this
    /// is meant to run before the cache is put to use.
    #[instrument(skip_all, fields(directory = %self.directory.display()))]
    pub async fn wipe_directory(&self) -> Result<usize> {
        let live: HashSet<PathBuf> = self
            .lock()
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Valid(entry) => Some(entry.handle.path().to_path_buf()),
                Slot::Reserved { .. } => None,
            })
            .collect();
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .or_raise(|| ErrorKind::Directory(self.directory.clone()))?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let path = entry.path();
            let ours = entry.file_name().to_str().is_some_and(|name| name.starts_with(FILE_PREFIX));
            if !ours || live.contains(&path) || !entry.file_type().await.map_err(ErrorKind::Io)?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale cache file"),
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Removed stale cache files");
        }
        Ok(removed)
    }
}

/// Copy `reader` into a new file in `directory` and mount it. The file is
/// removed again if anything fails.
///
/// The compression layer is checked against the copied bytes first, so a
/// gzipped WARC served as `application/warc` still mounts.
fn fill(directory: &Path, key: &CacheKey, resolved: Resolved, mut reader: BoxSyncRead) -> Result<(MountHandle, u64)> {
    let (mut file, path) = tempfile::Builder::new()
        .prefix(FILE_PREFIX)
        .suffix(&resolved.kind.extension())
        .tempfile_in(directory)
        .or_raise(|| ErrorKind::Directory(directory.to_path_buf()))?
        .into_parts();
    let copied = io::copy(&mut reader, &mut file).or_raise(|| ErrorKind::Copy(key.clone()))?;
    file.flush().or_raise(|| ErrorKind::Copy(key.clone()))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.seek(SeekFrom::Start(0)).or_raise(|| ErrorKind::Copy(key.clone()))?;
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .or_raise(|| ErrorKind::Copy(key.clone()))?;
    let kind = resolved.kind.refine(&head);
    if kind != resolved.kind {
        tracing::debug!(expected = %resolved.kind, detected = %kind, "Archive is compressed differently than its hint says");
    }
    let mount = resolved.provider.mount(&path, kind).or_raise(|| ErrorKind::Mount(key.clone()))?;
    Ok((MountHandle::new(mount, path), copied))
}

/// Drop evicted entries outside the table lock. Unpinned mounts are
/// unmounted and their files deleted right here.
fn release(victims: Vec<CacheEntry>) {
    for entry in victims {
        tracing::info!(
            key = %entry.key,
            size = entry.declared_size,
            pins = entry.handle.pins() - 1,
            "Evicted cached archive"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use arcache_compress::Compression;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;
    use time::macros::datetime;

    fn warc(uri: &str, body: &str) -> Vec<u8> {
        format!(
            "WARC/1.0\r\nWARC-Type: resource\r\nWARC-Target-URI: {uri}\r\nContent-Length: {}\r\n\r\n{body}\r\n\r\n",
            body.len()
        )
        .into_bytes()
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::new("coll", format!("http://example.org/{name}.warc"))
    }

    fn source(name: &str, size: u64) -> MemorySource {
        MemorySource::new(format!("{name}.warc"), warc("http://x/", name)).with_declared_size(Some(size))
    }

    fn cache(dir: &tempfile::TempDir, limits: Limits) -> ArchiveCache {
        ArchiveCache::new(dir.path(), limits, Registry::default()).unwrap()
    }

    fn files(dir: &tempfile::TempDir) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn keys(cache: &ArchiveCache) -> Vec<String> {
        cache.snapshot().iter().map(|info| info.key.url().to_string()).collect()
    }

    fn read(handle: &MountHandle, member: &str) -> String {
        let mut body = String::new();
        handle.open(member).unwrap().read_to_string(&mut body).unwrap();
        body
    }

    #[tokio::test]
    async fn test_fill_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let source = source("a", 10);

        let first = cache.get_or_create_mount(&key("a"), &source).await.unwrap().unwrap();
        assert_eq!(read(&first, "http://x/"), "a");
        let second = cache.get_or_create_mount(&key("a"), &source).await.unwrap().unwrap();
        assert!(first.same_mount(&second));
        assert_eq!(source.reads(), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries, stats.current_bytes), (1, 1, 1, 10));
        let names = files(&dir);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(FILE_PREFIX) && names[0].ends_with(".warc"));
    }

    #[tokio::test]
    async fn test_unknown_type_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let source = MemorySource::new("index.html", b"<html></html>".to_vec());

        assert!(cache.get_or_create_mount(&key("page"), &source).await.unwrap().is_none());
        assert_eq!(source.reads(), 0);
        let stats = cache.stats();
        assert_eq!((stats.misses, stats.entries, stats.reserved), (1, 0, 0));
        assert!(files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_content_type_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let source = MemorySource::new("x", warc("http://x/", "typed")).without_hint().with_content_type("application/warc");

        let handle = cache.get_or_create_mount(&key("typed"), &source).await.unwrap().unwrap();
        assert_eq!(read(&handle, "http://x/"), "typed");
    }

    #[tokio::test]
    async fn test_compression_detected_from_content() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let gzipped = Compression::Gzip.compress(&warc("http://x/", "zipped")).unwrap();
        let source = MemorySource::new("a.warc", gzipped);

        let handle = cache.get_or_create_mount(&key("a"), &source).await.unwrap().unwrap();
        assert_eq!(handle.kind().compression, Compression::Gzip);
        assert_eq!(read(&handle, "http://x/"), "zipped");
    }

    #[tokio::test]
    async fn test_size_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        for (name, size) in [("a", 10), ("b", 20), ("c", 30)] {
            cache.get_or_create_mount(&key(name), &source(name, size)).await.unwrap();
        }
        assert_eq!((cache.stats().entries, cache.stats().current_bytes), (3, 60));

        assert!(cache.invalidate(&key("b")));
        assert!(!cache.invalidate(&key("b")));
        assert_eq!((cache.stats().entries, cache.stats().current_bytes), (2, 40));
    }

    #[tokio::test]
    async fn test_copied_size_without_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let data = warc("http://x/", "body");
        let len = data.len() as u64;
        let source = MemorySource::new("a.warc", data).with_declared_size(None);

        cache.get_or_create_mount(&key("a"), &source).await.unwrap().unwrap();
        assert_eq!(cache.stats().current_bytes, len);
        assert_eq!(cache.get_entry(&key("a")).unwrap().declared_size(), len);
    }

    #[tokio::test]
    async fn test_least_recently_used_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::new(u64::MAX, 2));
        let a = cache.get_or_create_mount(&key("a"), &source("a", 1)).await.unwrap().unwrap();
        cache.get_or_create_mount(&key("b"), &source("b", 1)).await.unwrap();
        cache.get_or_create_mount(&key("c"), &source("c", 1)).await.unwrap();

        assert_eq!(keys(&cache), ["http://example.org/b.warc", "http://example.org/c.warc"]);
        assert_eq!(cache.stats().evictions, 1);
        // Still pinned by `a`, so still on disk and readable.
        assert!(a.is_invalidated());
        assert_eq!(read(&a, "http://x/"), "a");
        assert_eq!(files(&dir).len(), 3);
        let path = a.path().to_path_buf();
        drop(a);
        assert!(!path.exists());
        assert_eq!(files(&dir).len(), 2);
    }

    #[tokio::test]
    async fn test_hit_refreshes_recency() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::new(u64::MAX, 2));
        cache.get_or_create_mount(&key("a"), &source("a", 1)).await.unwrap();
        cache.get_or_create_mount(&key("b"), &source("b", 1)).await.unwrap();
        assert!(cache.get_entry(&key("a")).is_some());
        cache.get_or_create_mount(&key("c"), &source("c", 1)).await.unwrap();

        assert_eq!(keys(&cache), ["http://example.org/a.warc", "http://example.org/c.warc"]);
        // Unpinned victims are deleted immediately.
        assert_eq!(files(&dir).len(), 2);
    }

    #[rstest]
    #[case::evicts_oldest(&[60, 30, 50], &["b", "c"], 0)]
    #[case::evicts_several(&[40, 40, 90], &["c"], 0)]
    #[case::overcommits_when_empty(&[150], &["a"], 1)]
    #[case::overcommits_after_evicting_all(&[20, 20, 120], &["c"], 1)]
    #[tokio::test]
    async fn test_byte_limit(#[case] sizes: &[u64], #[case] remaining: &[&str], #[case] overcommits: u64) {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::new(100, 100));
        for (name, size) in ["a", "b", "c"].iter().zip(sizes) {
            cache.get_or_create_mount(&key(name), &source(name, *size)).await.unwrap();
        }
        let expected: Vec<_> = remaining.iter().map(|name| key(name).url().to_string()).collect();
        assert_eq!(keys(&cache), expected);
        assert_eq!(cache.stats().overcommits, overcommits);
        let kept: u64 = cache.snapshot().iter().map(|info| info.declared_size).sum();
        assert_eq!(cache.stats().current_bytes, kept);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let held = cache.get_or_create_mount(&key("a"), &source("a", 5)).await.unwrap().unwrap();
        cache.get_or_create_mount(&key("b"), &source("b", 7)).await.unwrap();

        assert!(cache.invalidate(&key("a")));
        assert!(!cache.invalidate(&key("a")));
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.stats().current_bytes, 7);
        assert!(held.is_invalidated());
        assert_eq!(files(&dir).len(), 2);

        drop(held);
        assert_eq!(files(&dir).len(), 1);
        assert_eq!(keys(&cache), ["http://example.org/b.warc"]);
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let a = source("a", 5);
        let held = cache.get_or_create_mount(&key("a"), &a).await.unwrap().unwrap();
        cache.get_or_create_mount(&key("b"), &source("b", 5)).await.unwrap();

        cache.clear();
        let stats = cache.stats();
        assert_eq!((stats.entries, stats.reserved, stats.current_bytes), (0, 0, 0));
        assert!(cache.snapshot().is_empty());
        // Only the pinned file survives.
        assert_eq!(files(&dir).len(), 1);
        assert!(held.is_invalidated());
        assert_eq!(read(&held, "http://x/"), "a");

        let refilled = cache.get_or_create_mount(&key("a"), &a).await.unwrap().unwrap();
        assert!(!refilled.same_mount(&held));
        assert_eq!(a.reads(), 2);
    }

    #[tokio::test]
    async fn test_failed_fill_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());

        let err = cache.get_or_create_mount(&key("a"), &source("a", 5).failing()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Source(_)));
        let err = cache.get_or_create_mount(&key("a"), &source("a", 5).truncated_after(8)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Copy(_)));
        let garbage = MemorySource::new("a.warc", b"definitely not a warc".to_vec());
        let err = cache.get_or_create_mount(&key("a"), &garbage).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Mount(_)));

        assert!(cache.snapshot().is_empty());
        assert!(files(&dir).is_empty());
        assert!(cache.get_or_create_mount(&key("a"), &source("a", 5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_properties_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let properties = Properties {
            fetch_time: Some(datetime!(2024-03-01 12:00 UTC)),
            last_modified: None,
            date: Some(datetime!(2024-03-01 11:59 UTC)),
        };
        cache.get_or_create_mount(&key("a"), &source("a", 1).with_properties(properties)).await.unwrap();
        let entry = cache.get_entry(&key("a")).unwrap();
        assert_eq!(entry.properties(), &properties);
        assert_eq!(entry.source_url(), "http://example.org/a.warc");
        assert_eq!(cache.snapshot()[0].properties, properties);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_one_fill() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(&dir, Limits::default()));
        let source = source("a", 10).with_delay(Duration::from_millis(100));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let (cache, source) = (cache.clone(), source.clone());
                tokio::spawn(async move { cache.get_or_create_mount(&key("a"), &source).await })
            })
            .collect();
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap().unwrap());
        }

        assert_eq!(source.reads(), 1);
        assert!(handles.iter().all(|h| h.same_mount(&handles[0])));
        let stats = cache.stats();
        assert_eq!((stats.misses, stats.hits, stats.entries), (1, 7, 1));
        assert_eq!(files(&dir).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiters_retry_after_failed_fill() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(&dir, Limits::default()));
        let failing = source("a", 10).with_delay(Duration::from_millis(100)).failing();
        let filler = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_create_mount(&key("a"), &failing).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.snapshot()[0].validity, Validity::Reserved);

        let good = source("a", 10);
        let handle = cache.get_or_create_mount(&key("a"), &good).await.unwrap().unwrap();
        assert!(filler.await.unwrap().is_err());
        assert_eq!(good.reads(), 1);
        assert_eq!(read(&handle, "http://x/"), "a");
    }

    #[tokio::test]
    async fn test_cancelled_fill_releases_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        let slow = source("a", 10).with_delay(Duration::from_secs(5));

        let result = tokio::time::timeout(Duration::from_millis(20), cache.get_or_create_mount(&key("a"), &slow)).await;
        assert!(result.is_err());
        assert!(cache.snapshot().is_empty());
        assert!(cache.get_or_create_mount(&key("a"), &source("a", 10)).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidated_during_fill() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(&dir, Limits::default()));
        let slow = source("a", 10).with_delay(Duration::from_millis(100));
        let filler = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_create_mount(&key("a"), &slow).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.invalidate(&key("a")));

        let handle = filler.await.unwrap().unwrap().unwrap();
        assert!(handle.is_invalidated());
        assert_eq!(read(&handle, "http://x/"), "a");
        assert_eq!(cache.stats().entries, 0);
        drop(handle);
        assert!(files(&dir).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reserved_entries_are_never_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(&dir, Limits::new(Limits::DEFAULT_MAX_BYTES, 1)));
        cache.get_or_create_mount(&key("a"), &source("a", 10)).await.unwrap();
        let slow = source("b", 10).with_delay(Duration::from_millis(100));
        let filler = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_create_mount(&key("b"), &slow).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Making room for C can only take A; B is still filling.
        cache.get_or_create_mount(&key("c"), &source("c", 10)).await.unwrap();
        let states: Vec<_> = cache.snapshot().into_iter().map(|info| (info.key.url().to_string(), info.validity)).collect();
        assert_eq!(
            states,
            [
                ("http://example.org/b.warc".to_string(), Validity::Reserved),
                ("http://example.org/c.warc".to_string(), Validity::Valid),
            ]
        );

        let b = filler.await.unwrap().unwrap().unwrap();
        assert!(!b.is_invalidated());
        assert_eq!(keys(&cache), ["http://example.org/b.warc"]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_new_limits_apply_on_next_insert() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::default());
        for name in ["a", "b", "c"] {
            cache.get_or_create_mount(&key(name), &source(name, 10)).await.unwrap();
        }
        cache.set_limits(Limits::new(25, 2));
        assert_eq!(cache.limits(), Limits::new(25, 2));
        assert_eq!(cache.stats().entries, 3);

        cache.get_or_create_mount(&key("d"), &source("d", 5)).await.unwrap();
        assert_eq!(keys(&cache), ["http://example.org/c.warc", "http://example.org/d.warc"]);
        assert_eq!(cache.stats().current_bytes, 15);
    }

    #[tokio::test]
    async fn test_ensure_space_without_insert() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, Limits::new(100, 100));
        for name in ["a", "b"] {
            cache.get_or_create_mount(&key(name), &source(name, 40)).await.unwrap();
        }
        cache.ensure_space(10);
        assert_eq!(cache.stats().entries, 2);
        cache.ensure_space(30);
        assert_eq!(keys(&cache), ["http://example.org/b.warc"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_wipe_directory_only_removes_own_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(format!("{FILE_PREFIX}stale.warc")), b"old").unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"keep me").unwrap();
        let cache = cache(&dir, Limits::default());
        cache.get_or_create_mount(&key("a"), &source("a", 1)).await.unwrap();

        assert_eq!(cache.wipe_directory().await.unwrap(), 1);
        let names = files(&dir);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"unrelated.txt".to_string()));
        assert!(cache.get_entry(&key("a")).unwrap().handle().path().exists());
    }

    #[test]
    fn test_new_requires_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = ArchiveCache::new(file.path(), Limits::default(), Registry::default()).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Directory(_)));
        assert!(ArchiveCache::new("/nonexistent/cache", Limits::default(), Registry::default()).is_err());
    }
}
