use arcache_mount::error::Result as MountResult;
use arcache_mount::{ArchiveKind, ArchiveMount, BoxRead, MemberInfo};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempPath;

/// A pinned, shareable reference to a mounted archive.
///
/// Cloning is cheap. The archive stays mounted and its file stays on disk for
/// as long as any clone is alive, even after the cache has evicted or
/// invalidated the entry. When the last clone is dropped the archive is
/// unmounted, then its file is deleted.
///
/// [`is_invalidated()`](Self::is_invalidated) reports whether the cache has
/// let go of the entry; readers may keep using the handle regardless.
#[derive(Clone)]
pub struct MountHandle {
    inner: Arc<Mounted>,
}

// Fields drop in declaration order, but unmount and delete are done by hand
// in `Drop` so their failures can be logged.
struct Mounted {
    mount: Box<dyn ArchiveMount>,
    file: Option<TempPath>,
    invalidated: AtomicBool,
}

impl MountHandle {
    pub(crate) fn new(mount: Box<dyn ArchiveMount>, file: TempPath) -> Self {
        Self {
            inner: Arc::new(Mounted {
                mount,
                file: Some(file),
                invalidated: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> ArchiveKind {
        self.inner.mount.kind()
    }

    /// Location of the cached archive file.
    pub fn path(&self) -> &Path {
        self.inner.mount.path()
    }

    pub fn members(&self) -> &[MemberInfo] {
        self.inner.mount.members()
    }

    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.inner.mount.member(name)
    }

    /// Open a member for reading. Readers are blocking; run them on a
    /// blocking thread from async code.
    pub fn open(&self, name: &str) -> MountResult<BoxRead> {
        self.inner.mount.open(name)
    }

    /// `true` once the cache no longer tracks this mount (evicted,
    /// invalidated, or cleared).
    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::Release);
    }

    /// Whether both handles refer to the same mount.
    pub fn same_mount(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles to this mount, including the cache's own.
    pub fn pins(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
impl fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountHandle")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .field("members", &self.members().len())
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        let path = self.mount.path().to_path_buf();
        if let Err(e) = self.mount.unmount() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to unmount archive");
        }
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed cached archive"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove cached archive; leaving it behind"),
        }
    }
}
