//! Archive format detection from extension hints and content types.

use arcache_compress::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Container format of an archive, independent of any compression wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    /// Web ARChive (ISO 28500)
    Warc,
    /// Internet Archive ARC (v1/v2)
    Arc,
}
impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 4] = [Self::Zip, Self::Tar, Self::Warc, Self::Arc];

    /// Canonical file extension, including the leading dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => ".zip",
            Self::Tar => ".tar",
            Self::Warc => ".warc",
            Self::Arc => ".arc",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" | "jar" | "war" => Some(Self::Zip),
            "tar" => Some(Self::Tar),
            "warc" => Some(Self::Warc),
            "arc" => Some(Self::Arc),
            _ => None,
        }
    }

    /// Zip needs random access to its central directory, so it can't be
    /// read through a compression layer.
    #[must_use]
    pub fn accepts(&self, compression: Compression) -> bool {
        match self {
            Self::Zip => compression == Compression::None,
            Self::Tar | Self::Warc | Self::Arc => true,
        }
    }
}
impl Display for ArchiveFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.extension()[1..])
    }
}

/// A fully resolved archive type: container format plus compression layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArchiveKind {
    pub format: ArchiveFormat,
    pub compression: Compression,
}
impl ArchiveKind {
    pub fn new(format: ArchiveFormat, compression: Compression) -> Self {
        Self { format, compression }
    }

    /// File extension for temp files holding this kind of archive, e.g. `.warc.gz`.
    #[must_use]
    pub fn extension(&self) -> String {
        format!("{}{}", self.format.extension(), self.compression.extension())
    }

    /// Resolve an archive kind from an extension hint.
    ///
    /// The hint may be a bare extension (`"zip"`, `".warc.gz"`), a file name,
    /// or a URL; query strings and fragments are ignored, and matching is
    /// case-insensitive.
    ///
    /// ```
    /// use arcache_compress::Compression;
    /// use arcache_mount::{ArchiveFormat, ArchiveKind};
    ///
    /// let kind = ArchiveKind::from_hint("https://example.org/crawl/part-0001.warc.gz?download=1").unwrap();
    /// assert_eq!(kind, ArchiveKind::new(ArchiveFormat::Warc, Compression::Gzip));
    /// assert!(ArchiveKind::from_hint("index.html").is_none());
    /// ```
    #[must_use]
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_lowercase();
        let hint = hint.split(['?', '#']).next().unwrap_or_default();
        let name = hint.rsplit('/').next().unwrap_or_default();
        // A bare extension without a stem ("zip", "warc.gz") is matched as if
        // it were attached to a file name.
        Self::from_file_name(name).or_else(|| Self::from_file_name(&format!("_.{name}")))
    }

    fn from_file_name(name: &str) -> Option<Self> {
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("tgz") => return Some(Self::new(ArchiveFormat::Tar, Compression::Gzip)),
            Some("tbz2" | "tbz") => return Some(Self::new(ArchiveFormat::Tar, Compression::Bzip2)),
            _ => {},
        }
        let (compression, inner) = Compression::split_name(name);
        let (_, ext) = inner.rsplit_once('.')?;
        let format = ArchiveFormat::from_extension(ext)?;
        format.accepts(compression).then(|| Self::new(format, compression))
    }

    /// Resolve an archive kind from a MIME content type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim().to_lowercase();
        let format = match mime.as_str() {
            "application/zip" | "application/x-zip-compressed" | "application/java-archive" => ArchiveFormat::Zip,
            "application/x-tar" => ArchiveFormat::Tar,
            "application/warc" => ArchiveFormat::Warc,
            "application/x-internet-archive" => ArchiveFormat::Arc,
            _ => return None,
        };
        Some(Self::new(format, Compression::None))
    }

    /// Correct the compression layer using the first bytes of the archive.
    ///
    /// Content types never say anything about compression, and servers often
    /// label `.warc.gz` files as plain WARC. A detected layer replaces
    /// [`Compression::None`] if the format can be read through it; an
    /// explicit layer from the hint is never overridden.
    #[must_use]
    pub fn refine(self, head: &[u8]) -> Self {
        let sniffed = Compression::sniff(head);
        if self.compression == Compression::None && sniffed != Compression::None && self.format.accepts(sniffed) {
            Self::new(self.format, sniffed)
        } else {
            self
        }
    }
}
impl Display for ArchiveKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.compression {
            Compression::None => write!(f, "{}", self.format),
            compression => write!(f, "{}+{}", self.format, compression),
        }
    }
}
