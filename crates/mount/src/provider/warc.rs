//! WARC (ISO 28500) mounts.
//!
//! Every record is exposed as a member. Records carrying a payload for a
//! URL (`response`, `resource`, `revisit`, `conversion`) are named by their
//! `WARC-Target-URI`; all other records by their `WARC-Record-ID`. When two
//! records share a name, lookups return the first one in the file.

use super::IndexedMount;
use super::records::RecordScanner;
use crate::error::{ErrorKind, Result};
use crate::{ArchiveKind, ArchiveMount, MemberInfo, MountProvider};
use memchr::memchr;
use std::path::Path;
use tracing::instrument;

#[derive(Debug, Default)]
struct RecordHeader {
    record_type: Option<String>,
    target_uri: Option<String>,
    record_id: Option<String>,
    content_length: Option<u64>,
}
impl RecordHeader {
    fn set(&mut self, line: &str) -> Result<()> {
        let Some(colon) = memchr(b':', line.as_bytes()) else {
            exn::bail!(ErrorKind::Malformed(format!("invalid WARC header line `{line}`")));
        };
        let (name, value) = (line[..colon].trim(), line[colon + 1..].trim());
        if name.eq_ignore_ascii_case("WARC-Type") {
            self.record_type = Some(value.to_ascii_lowercase());
        } else if name.eq_ignore_ascii_case("WARC-Target-URI") {
            // WARC/1.0 writers sometimes wrap the URI in angle brackets.
            self.target_uri = Some(value.trim_start_matches('<').trim_end_matches('>').to_string());
        } else if name.eq_ignore_ascii_case("WARC-Record-ID") {
            self.record_id = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("Content-Length") {
            let length = value
                .parse()
                .map_err(|_| ErrorKind::Malformed(format!("invalid Content-Length `{value}`")))?;
            self.content_length = Some(length);
        }
        Ok(())
    }

    fn member_name(self) -> Option<String> {
        match self.record_type.as_deref() {
            Some("response" | "resource" | "revisit" | "conversion") => self.target_uri.or(self.record_id),
            _ => self.record_id.or(self.target_uri),
        }
    }
}

fn scan(scanner: &mut RecordScanner) -> Result<Vec<MemberInfo>> {
    let mut members = Vec::new();
    while let Some(version) = scanner.header_line()? {
        if !version.starts_with("WARC/") {
            exn::bail!(ErrorKind::Malformed(format!("expected WARC version line, found `{version}`")));
        }
        let mut header = RecordHeader::default();
        loop {
            match scanner.line()? {
                Some(line) if line.is_empty() => break,
                Some(line) => header.set(&line)?,
                None => exn::bail!(ErrorKind::Malformed("WARC record header truncated".to_string())),
            }
        }
        let Some(length) = header.content_length else {
            exn::bail!(ErrorKind::Malformed("WARC record without Content-Length".to_string()));
        };
        let offset = scanner.position();
        scanner.skip(length)?;
        match header.member_name() {
            Some(name) => members.push(MemberInfo::new(name, length, offset)),
            None => tracing::debug!(offset, "Skipping anonymous WARC record"),
        }
    }
    Ok(members)
}

/// Mounts `.warc` and `.warc.gz` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarcProvider;
impl MountProvider for WarcProvider {
    fn name(&self) -> &str {
        "warc"
    }

    #[instrument(skip(self, path, kind), fields(path = %path.display(), %kind, members))]
    fn mount(&self, path: &Path, kind: ArchiveKind) -> Result<Box<dyn ArchiveMount>> {
        let members = scan(&mut RecordScanner::open(path, kind.compression)?)?;
        tracing::Span::current().record("members", members.len());
        Ok(Box::new(IndexedMount::new(path, kind, members)))
    }
}
