//! Zip mounts.

use crate::error::{ErrorKind, Result};
use crate::{ArchiveKind, ArchiveMount, BoxRead, MemberInfo, MountProvider, member_not_found, normalize_member_name};
use exn::ResultExt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::instrument;
use ::zip::ZipArchive;

// Members are decompressed into memory on open; don't trust the declared
// size for the initial allocation.
const MAX_PREALLOCATE: u64 = 8 * 1024 * 1024;

/// Mounts `.zip` (and `.jar`/`.war`) files.
///
/// The central directory is parsed once at mount time. Opening a member
/// inflates it into memory, so the returned reader no longer depends on the
/// archive file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipProvider;
impl MountProvider for ZipProvider {
    fn name(&self) -> &str {
        "zip"
    }

    #[instrument(skip(self, path, kind), fields(path = %path.display(), %kind, members))]
    fn mount(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveMount>> {
        let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
        let mut archive =
            ZipArchive::new(file).or_raise(|| ErrorKind::Malformed("unreadable zip central directory".to_string()))?;
        let mut members = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .or_raise(|| ErrorKind::Malformed(format!("corrupt zip entry #{index}")))?;
            if entry.is_dir() {
                continue;
            }
            match normalize_member_name(entry.name()) {
                // The central directory index stands in for the stream offset.
                Some(name) => members.push(MemberInfo::new(name, entry.size(), index as u64)),
                None => tracing::warn!(entry = entry.name(), "Skipping zip entry with unsafe path"),
            }
        }
        tracing::Span::current().record("members", members.len());
        Ok(Box::new(ZipMount {
            path: path.to_path_buf(),
            kind,
            members,
            archive: Mutex::new(Some(archive)),
        }))
    }
}

struct ZipMount {
    path: PathBuf,
    kind: ArchiveKind,
    members: Vec<MemberInfo>,
    /// `None` once unmounted; the file handle is closed at that point.
    archive: Mutex<Option<ZipArchive<File>>>,
}
impl ArchiveMount for ZipMount {
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
        let mut guard = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(archive) = guard.as_mut() else {
            exn::bail!(ErrorKind::Unmounted(self.path.clone()));
        };
        let mut entry = archive
            .by_index(member.offset as usize)
            .or_raise(|| ErrorKind::Malformed(format!("corrupt zip entry `{}`", member.name)))?;
        let mut buf = Vec::with_capacity(member.size.min(MAX_PREALLOCATE) as usize);
        entry
            .read_to_end(&mut buf)
            .or_raise(|| ErrorKind::Malformed(format!("failed to inflate `{}`", member.name)))?;
        Ok(Box::new(Cursor::new(buf)))
    }

    fn unmount(&mut self) -> Result<()> {
        let archive = self.archive.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        drop(archive);
        Ok(())
    }
}
