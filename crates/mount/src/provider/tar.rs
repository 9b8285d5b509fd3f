//! Tar mounts, optionally wrapped in a compression layer.

use super::IndexedMount;
use crate::error::{ErrorKind, Result};
use crate::{ArchiveKind, ArchiveMount, MemberInfo, MountProvider, normalize_member_name};
use exn::ResultExt;
use std::fs::File;
use std::path::Path;
use tracing::instrument;

/// Mounts `.tar`, `.tar.gz`/`.tgz` and `.tar.bz2` files.
///
/// Only regular files are exposed as members. Reads from uncompressed
/// tarballs seek directly to the member; compressed tarballs are decoded
/// from the start on every open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarProvider;
impl MountProvider for TarProvider {
    fn name(&self) -> &str {
        "tar"
    }

    #[instrument(skip(self, path, kind), fields(path = %path.display(), %kind, members))]
    fn mount(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveMount>> {
        let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
        let reader = kind.compression.wrap_reader(file).map_err(ErrorKind::compression)?;
        let mut archive = ::tar::Archive::new(reader);
        let entries = archive.entries().or_raise(|| ErrorKind::Malformed("unreadable tar stream".to_string()))?;
        let mut members = Vec::new();
        for entry in entries {
            let entry = entry.or_raise(|| ErrorKind::Malformed("corrupt tar entry".to_string()))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let raw = entry.path().or_raise(|| ErrorKind::Malformed("invalid tar entry path".to_string()))?;
            match raw.to_str().and_then(normalize_member_name) {
                Some(name) => members.push(MemberInfo::new(name, entry.size(), entry.raw_file_position())),
                None => tracing::warn!(entry = %raw.display(), "Skipping tar entry with unsafe path"),
            }
        }
        tracing::Span::current().record("members", members.len());
        Ok(Box::new(IndexedMount::new(path, kind, members)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArchiveFormat;
    use arcache_compress::Compression;
    use rstest::rstest;
    use std::io::{Read, Write};

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut dir = ::tar::Header::new_gnu();
        dir.set_entry_type(::tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder.append_data(&mut dir, "docs/", std::io::empty()).unwrap();
        for (name, data) in files {
            let mut header = ::tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_mount_and_read(#[case] compression: Compression) {
        let data = tarball(&[("docs/a.txt", b"alpha"), ("./docs/b.txt", b"bravo bravo")]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&compression.compress(&data).unwrap()).unwrap();
        file.flush().unwrap();

        let mount = TarProvider.mount(file.path(), ArchiveKind::new(ArchiveFormat::Tar, compression)).unwrap();
        let names: Vec<_> = mount.members().iter().map(|m| m.name.as_str()).collect();
        // Directories are not members
        assert_eq!(names, ["docs/a.txt", "docs/b.txt"]);

        let mut body = String::new();
        mount.open("./docs/b.txt").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "bravo bravo");
        // Independent readers over the same mount
        let (mut first, mut second) = (mount.open("docs/a.txt").unwrap(), mount.open("docs/b.txt").unwrap());
        let (mut a, mut b) = (String::new(), String::new());
        second.read_to_string(&mut b).unwrap();
        first.read_to_string(&mut a).unwrap();
        assert_eq!((a.as_str(), b.as_str()), ("alpha", "bravo bravo"));
    }

    #[test]
    fn test_corrupt_tarball() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xAB; 1024]).unwrap();
        file.flush().unwrap();
        let kind = ArchiveKind::new(ArchiveFormat::Tar, Compression::None);
        assert!(TarProvider.mount(file.path(), kind).is_err());
    }

    #[test]
    fn test_missing_file() {
        let kind = ArchiveKind::new(ArchiveFormat::Tar, Compression::None);
        let err = TarProvider.mount(Path::new("/nonexistent/archive.tar"), kind).err().unwrap();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
