use crate::Compression;
use std::fmt;

struct Format {
    compression: Compression,
    name: &'static str,
    extension: &'static str,
    magic: &'static [u8],
}

// Every compiled-in layer. `Compression::None` has no entry.
const FORMATS: &[Format] = &[
    Format {
        compression: Compression::Bzip2,
        name: "bzip2",
        extension: ".bz2",
        magic: b"BZh",
    },
    Format {
        compression: Compression::Gzip,
        name: "gzip",
        extension: ".gz",
        magic: &[0x1F, 0x8B],
    },
    #[cfg(feature = "xz")]
    Format {
        compression: Compression::Xz,
        name: "xz",
        extension: ".xz",
        magic: &[0xFD, b'7', b'z', b'X', b'Z', 0x00],
    },
    #[cfg(feature = "zstd")]
    Format {
        compression: Compression::Zstd,
        name: "zstd",
        extension: ".zst",
        magic: &[0x28, 0xB5, 0x2F, 0xFD],
    },
];

impl Compression {
    fn format(&self) -> Option<&'static Format> {
        FORMATS.iter().find(|format| format.compression == *self)
    }

    /// Extension including the leading dot; empty for [`None`](Self::None).
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.format().map_or("", |format| format.extension)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.format().map_or("none", |format| format.name)
    }

    /// Whether a member can be reached by seeking rather than decoding
    /// everything in front of it.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        *self == Self::None
    }

    /// Split a file name into its compression layer and the remaining name.
    ///
    /// The remaining name keeps the inner extension, and names without a
    /// compression extension are returned whole.
    ///
    /// ```
    /// use arcache_compress::Compression;
    ///
    /// assert_eq!(Compression::split_name("crawl.warc.gz"), (Compression::Gzip, "crawl.warc"));
    /// assert_eq!(Compression::split_name("bundle.zip"), (Compression::None, "bundle.zip"));
    /// ```
    #[must_use]
    pub fn split_name(name: &str) -> (Self, &str) {
        let Some(dot) = name.rfind('.').filter(|&dot| dot > 0) else {
            return (Self::None, name);
        };
        let extension = &name[dot..];
        FORMATS
            .iter()
            .find(|format| format.extension.eq_ignore_ascii_case(extension))
            .map_or((Self::None, name), |format| (format.compression, &name[..dot]))
    }

    /// Detect the layer from the first bytes of a stream. Anything
    /// unrecognised, including input too short to tell, is
    /// [`None`](Self::None).
    #[must_use]
    pub fn sniff(head: &[u8]) -> Self {
        FORMATS
            .iter()
            .find(|format| head.starts_with(format.magic))
            .map_or(Self::None, |format| format.compression)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
