//! Internet Archive ARC mounts.
//!
//! Each record starts with a single header line whose first field is the
//! record URL and whose last field is the body length (true for both v1 and
//! v2 URL-record lines). The leading `filedesc://` version block is skipped.

use super::IndexedMount;
use super::records::RecordScanner;
use crate::error::{ErrorKind, Result};
use crate::{ArchiveKind, ArchiveMount, MemberInfo, MountProvider};
use std::path::Path;
use tracing::instrument;

const FILEDESC: &str = "filedesc://";

fn scan(scanner: &mut RecordScanner) -> Result<Vec<MemberInfo>> {
    let mut members = Vec::new();
    while let Some(line) = scanner.header_line()? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(url), Some(length), true) = (fields.first(), fields.last(), fields.len() >= 3) else {
            exn::bail!(ErrorKind::Malformed(format!("invalid ARC record header `{line}`")));
        };
        let length: u64 = length
            .parse()
            .map_err(|_| ErrorKind::Malformed(format!("invalid ARC record length `{length}`")))?;
        let offset = scanner.position();
        scanner.skip(length)?;
        if !url.starts_with(FILEDESC) {
            members.push(MemberInfo::new(*url, length, offset));
        }
    }
    Ok(members)
}

/// Mounts `.arc` and `.arc.gz` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcProvider;
impl MountProvider for ArcProvider {
    fn name(&self) -> &str {
        "arc"
    }

    #[instrument(skip(self, path, kind), fields(path = %path.display(), %kind, members))]
    fn mount(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveMount>> {
        let members = scan(&mut RecordScanner::open(path, kind.compression)?)?;
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

    fn record(url: &str, body: &str) -> Vec<u8> {
        format!("{url} 127.0.0.1 20240101000000 text/plain {}\n{body}\n", body.len()).into_bytes()
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    fn test_mount_and_read(#[case] compression: Compression) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for rec in [
            record("filedesc://IA-001.arc", "1 0 Test\nURL IP-address Archive-date Content-type Archive-length"),
            record("http://example.org/", "<html>root</html>"),
            record("http://example.org/robots.txt", "User-agent: *"),
        ] {
            file.write_all(&compression.compress(&rec).unwrap()).unwrap();
        }
        file.flush().unwrap();

        let mount = ArcProvider.mount(file.path(), ArchiveKind::new(ArchiveFormat::Arc, compression)).unwrap();
        let names: Vec<_> = mount.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["http://example.org/", "http://example.org/robots.txt"]);
        assert_eq!(mount.member("http://example.org/robots.txt").unwrap().size, 13);

        let mut body = String::new();
        mount.open("http://example.org/robots.txt").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "User-agent: *");
    }

    #[rstest]
    #[case(b"http://example.org/ 17\n".as_slice())]
    #[case(b"http://example.org/ 127.0.0.1 2024 text/plain many\nbody\n".as_slice())]
    #[case(b"http://example.org/ 127.0.0.1 2024 text/plain 100\nbody\n".as_slice())]
    fn test_malformed(#[case] data: &[u8]) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        let kind = ArchiveKind::new(ArchiveFormat::Arc, Compression::None);
        let err = ArcProvider.mount(file.path(), kind).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Malformed(_)));
    }
}
