//! Archive member metadata and member name normalization.

use crate::BoxRead;
use crate::error::{ErrorKind, Result};
use arcache_compress::Compression;
use exn::ResultExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path};

/// A single member inside a mounted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Member name; a normalized relative path for zip/tar, the target URI
    /// (or record ID) for record-based formats.
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Offset of the member's data within the decompressed archive stream.
    /// Meaningless for zip members, which are addressed by name.
    pub(crate) offset: u64,
}
impl MemberInfo {
    pub(crate) fn new(name: impl Into<String>, size: u64, offset: u64) -> Self {
        Self { name: name.into(), size, offset }
    }
}

/// Normalizes a member path from an archive index.
///
/// Leading slashes and `.` components are dropped and `..` components are
/// resolved. Names that would escape the archive root, contain null bytes,
/// or normalize to nothing return `None`; such members are not exposed.
///
/// ```
/// use arcache_mount::normalize_member_name;
///
/// assert_eq!(normalize_member_name("./docs//guide.txt").as_deref(), Some("docs/guide.txt"));
/// assert_eq!(normalize_member_name("/abs/../file.txt").as_deref(), Some("file.txt"));
/// assert_eq!(normalize_member_name("../etc/passwd"), None);
/// ```
pub fn normalize(name: &str) -> Option<String> {
    if name.contains('\0') {
        return None;
    }
    let mut components = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(s) => components.push(s.to_str()?),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => return None,
            Component::ParentDir => {
                components.pop()?;
            },
        }
    }
    (!components.is_empty()).then(|| components.join("/"))
}

/// Open a byte range of the (decompressed) archive stream as an independent reader.
///
/// Uncompressed archives seek straight to the member; compressed archives
/// have to decode and discard everything in front of it.
pub(crate) fn open_range(path: &Path, compression: Compression, offset: u64, len: u64) -> Result<BoxRead> {
    let mut file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
    if compression.is_seekable() {
        file.seek(SeekFrom::Start(offset)).map_err(ErrorKind::Io)?;
        return Ok(Box::new(file.take(len)));
    }
    let mut reader = compression.wrap_reader(file).map_err(ErrorKind::compression)?;
    let skipped = io::copy(&mut (&mut reader).take(offset), &mut io::sink()).or_raise(|| {
        ErrorKind::Malformed(format!("failed to decode {} stream before member", compression))
    })?;
    if skipped < offset {
        exn::bail!(ErrorKind::Malformed(format!("stream ended {} bytes before member", offset - skipped)));
    }
    Ok(Box::new(reader.take(len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case("file.txt", Some("file.txt"))]
    #[case("a/b/c.txt", Some("a/b/c.txt"))]
    #[case("./a/./b.txt", Some("a/b.txt"))]
    #[case("a/b/../c.txt", Some("a/c.txt"))]
    #[case("dir/", Some("dir"))]
    #[case("", None)]
    #[case(".", None)]
    #[case("..", None)]
    #[case("a/../../b", None)]
    #[case("a\0b", None)]
    fn test_normalize(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize(name).as_deref(), expected);
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_open_range(#[case] compression: Compression) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&compression.compress(b"0123456789ABCDEF").unwrap()).unwrap();
        file.flush().unwrap();
        let mut reader = open_range(file.path(), compression, 4, 6).unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "456789");
    }

    #[test]
    fn test_open_range_past_end_of_compressed_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&Compression::Gzip.compress(b"short").unwrap()).unwrap();
        file.flush().unwrap();
        let err = open_range(file.path(), Compression::Gzip, 100, 1).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Malformed(_)));
    }
}
