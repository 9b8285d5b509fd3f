//! Built-in mount providers.
//!
//! Tar, WARC and ARC archives are all mounted the same way: scan the
//! (decompressed) stream once, remember where each member's data starts,
//! and serve reads from that offset index. Zip archives carry their own
//! index in the central directory.

mod arc;
mod records;
mod tar;
mod warc;
mod zip;

pub use self::arc::ArcProvider;
pub use self::tar::TarProvider;
pub use self::warc::WarcProvider;
pub use self::zip::ZipProvider;
use crate::error::Result;
use crate::member::open_range;
use crate::{ArchiveKind, ArchiveMount, BoxRead, MemberInfo, member_not_found};
use std::path::{Path, PathBuf};

/// A mount backed by an offset index into the decompressed archive stream.
pub(crate) struct IndexedMount {
    path: PathBuf,
    kind: ArchiveKind,
    members: Vec<MemberInfo>,
}
impl IndexedMount {
    pub(crate) fn new(path: &Path, kind: ArchiveKind, members: Vec<MemberInfo>) -> Self {
        Self { path: path.to_path_buf(), kind, members }
    }
}
impl ArchiveMount for IndexedMount {
    fn kind(&self) -> ArchiveKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn members(&self) -> &[MemberInfo] {
        &self.members
    }

    fn open(&self, name: &str) -> Result<BoxRead> {
        let member = self.member(name).ok_or_else(|| member_not_found(name))?;
        open_range(&self.path, self.kind.compression, member.offset, member.size)
    }
}
