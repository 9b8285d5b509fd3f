//! Archive mounts.
//!
//! A *mount* is a live, navigable view over the members of an archive file
//! (zip, tar, WARC, ARC) that does not extract anything to disk. Mounting
//! indexes the archive once; afterwards any member can be opened as an
//! independent reader, from any thread, as many times as needed.
//!
//! # Architecture
//! - [`MountProvider`]: turns a local file into a [`ArchiveMount`]. One
//!   provider exists per [`ArchiveFormat`]; providers are pluggable.
//! - [`Registry`]: the static extension → provider table used to decide
//!   whether a resource is an archive at all, and which provider mounts it.
//! - [`ArchiveMount`]: the mounted view. Unmounting is explicit and happens
//!   exactly once, before the backing file is removed by whoever owns it.

pub mod error;
mod format;
mod member;
pub mod provider;
mod registry;

pub use crate::format::{ArchiveFormat, ArchiveKind};
pub use crate::member::{MemberInfo, normalize as normalize_member_name};
pub use crate::registry::{Registry, Resolved};
use crate::error::{ErrorKind, Result};
use std::path::Path;
use std::sync::Arc;

/// A reader over a single archive member.
pub type BoxRead = arcache_compress::BoxRead<'static>;
pub type ProviderHandle = Arc<dyn MountProvider>;

/// A mounted archive.
///
/// Implementations must be safe to share between threads: every call to
/// [`open()`](Self::open) returns a reader that is independent of all other
/// readers, including readers opened before the mount was unmounted.
pub trait ArchiveMount: Send + Sync {
    /// Archive type this mount was created for.
    fn kind(&self) -> ArchiveKind;

    /// Path of the backing archive file.
    fn path(&self) -> &Path;

    /// All readable members, in archive order.
    fn members(&self) -> &[MemberInfo];

    /// Look up a member by name. An exact match wins; otherwise the name is
    /// normalized first, so `"./a/b.txt"` finds `"a/b.txt"`.
    fn member(&self, name: &str) -> Option<&MemberInfo> {
        let members = self.members();
        members.iter().find(|m| m.name == name).or_else(|| {
            let normalized = normalize_member_name(name)?;
            members.iter().find(|m| m.name == normalized)
        })
    }

    /// Open a member for reading.
    ///
    /// Returns [`MemberNotFound`](ErrorKind::MemberNotFound) if the archive
    /// has no member with that name.
    fn open(&self, name: &str) -> Result<BoxRead>;

    /// Release any resources held against the backing file. Called exactly
    /// once by the owner of the mount, strictly before the file is deleted.
    fn unmount(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Creates mounts for one archive format.
pub trait MountProvider: Send + Sync {
    /// Name of the provider (for logging only).
    fn name(&self) -> &str;

    /// Mount the archive at `path`, which must already contain the complete
    /// archive bytes.
    fn mount(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveMount>>;
}

pub(crate) fn member_not_found(name: &str) -> error::Error {
    exn::Exn::from(ErrorKind::MemberNotFound(name.to_string()))
}
