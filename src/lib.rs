//! Cache of mounted archives.
//!
//! `arcache` keeps recently used archives (zip, tar, WARC, ARC; optionally
//! gzip/bzip2 compressed) copied to a local directory and mounted, so that
//! their members can be read many times without fetching the archive again.
//! Disk usage is bounded by total size and entry count, evicting the least
//! recently used archive first.
//!
//! The [`CacheManager`] is the entry point: it turns a [`Config`] into a
//! running [`ArchiveCache`] and owns its lifecycle.
//!
//! ```no_run
//! use arcache::error::ErrorKind;
//! use arcache::source::FileSource;
//! use arcache::{CacheKey, CacheManager, Config};
//! use exn::ResultExt;
//!
//! # async fn example() -> arcache::error::Result<()> {
//! let manager = CacheManager::start(&Config::default()).await?;
//! let source = FileSource::open("/data/crawl-00001.warc.gz").await.or_raise(|| ErrorKind::Cache)?;
//! let key = CacheKey::new("crawl", "https://example.org/crawl-00001.warc.gz");
//! if let Some(mount) = manager.get_or_create_mount(&key, &source).await? {
//!     for member in mount.members() {
//!         println!("{} ({} bytes)", member.name, member.size);
//!     }
//! }
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod error;
mod manager;

pub use crate::manager::CacheManager;
pub use arcache_cache::{ArchiveCache, CacheEntry, CacheKey, CacheStats, EntryInfo, Limits, MountHandle, Validity, source};
pub use arcache_compress::Compression;
pub use arcache_config::{CacheConfig, Config};
pub use arcache_mount::{ArchiveFormat, ArchiveKind, ArchiveMount, MemberInfo, MountProvider, Registry};
