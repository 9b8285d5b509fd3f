use crate::error::{ErrorKind, Result};
use arcache_cache::source::ContentSource;
use arcache_cache::{ArchiveCache, CacheEntry, CacheKey, Limits, MountHandle};
use arcache_config::Config;
use arcache_mount::Registry;
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

fn limits(config: &Config) -> Limits {
    Limits::new(config.cache.max_bytes(), config.cache.max_entries)
}

/// Owns the process-wide [`ArchiveCache`] and its lifecycle.
///
/// There is no global instance; create one with [`start()`](Self::start) and
/// pass it (or the [`Arc`] from [`cache()`](Self::cache)) to whoever needs
/// it. The cache directory is fixed for the lifetime of the manager.
pub struct CacheManager {
    cache: Arc<ArchiveCache>,
}
impl CacheManager {
    /// Start with the default mount providers.
    pub async fn start(config: &Config) -> Result<Self> {
        Self::start_with_registry(config, Registry::default()).await
    }

    /// Prepare the cache directory and build the cache.
    ///
    /// The directory is created if missing. Starting fails if it is not a
    /// directory or is not writable. Cache files left behind by a previous
    /// process are deleted.
    #[instrument(skip_all, fields(directory = %config.cache.directory.display()))]
    pub async fn start_with_registry(config: &Config, registry: Registry) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let directory = config.cache.directory.clone();
        tokio::fs::create_dir_all(&directory)
            .await
            .or_raise(|| ErrorKind::Directory(directory.clone()))?;
        let probe_dir = directory.clone();
        tokio::task::spawn_blocking(move || tempfile::tempfile_in(&probe_dir))
            .await
            .or_raise(|| ErrorKind::Directory(directory.clone()))?
            .or_raise(|| ErrorKind::Directory(directory.clone()))?;

        let cache = ArchiveCache::new(&directory, limits(config), registry).or_raise(|| ErrorKind::Directory(directory.clone()))?;
        cache.wipe_directory().await.or_raise(|| ErrorKind::Directory(directory.clone()))?;
        tracing::info!(
            max_bytes = config.cache.max_bytes(),
            max_entries = config.cache.max_entries,
            formats = ?cache.registry().formats().collect::<Vec<_>>(),
            "Archive cache started"
        );
        Ok(Self { cache: Arc::new(cache) })
    }

    /// Apply new limits to the running cache. They are enforced on the next
    /// insertion. A different directory is ignored.
    pub fn reconfigure(&self, config: &Config) -> Result<()> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        if config.cache.directory != self.cache.directory() {
            tracing::warn!(
                current = %self.cache.directory().display(),
                requested = %config.cache.directory.display(),
                "Cache directory cannot change while running; ignoring"
            );
        }
        self.cache.set_limits(limits(config));
        Ok(())
    }

    /// Drop every cached archive. Archives still held by readers are deleted
    /// once the last reader lets go.
    pub fn shutdown(&self) {
        self.cache.clear();
        tracing::info!("Archive cache shut down");
    }

    pub async fn get_or_create_mount(&self, key: &CacheKey, source: &dyn ContentSource) -> Result<Option<MountHandle>> {
        self.cache.get_or_create_mount(key, source).await.or_raise(|| ErrorKind::Cache)
    }

    pub fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get_entry(key)
    }

    pub fn cache(&self) -> &Arc<ArchiveCache> {
        &self.cache
    }

    pub fn directory(&self) -> &Path {
        self.cache.directory()
    }
}
