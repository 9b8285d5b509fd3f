//! Encoding and decoding.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzLevel, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzLevel, read::MultiGzDecoder, write::GzEncoder};
use std::io::{self, Read, Write};
use tracing::instrument;
#[cfg(feature = "xz")]
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

/// A boxed, sendable reader producing decompressed bytes.
pub type BoxRead<'a> = Box<dyn Read + Send + 'a>;

fn encode<E: Write>(mut encoder: E, input: &[u8], finish: impl FnOnce(E) -> io::Result<Vec<u8>>) -> Result<Vec<u8>> {
    encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
    finish(encoder).or_raise(|| ErrorKind::Io)
}

impl Compression {
    /// Decode `reader` through this layer.
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use arcache_compress::Compression;
    ///
    /// let compressed = Compression::Gzip.compress(b"WARC/1.0").unwrap();
    /// let mut plain = String::new();
    /// Compression::Gzip.wrap_reader(Cursor::new(compressed)).unwrap().read_to_string(&mut plain).unwrap();
    /// assert_eq!(plain, "WARC/1.0");
    /// ```
    pub fn wrap_reader<'a, R: Read + Send + 'a>(&self, reader: R) -> Result<BoxRead<'a>> {
        let decoded: BoxRead<'a> = match self {
            Self::None => Box::new(reader),
            Self::Bzip2 => Box::new(BzDecoder::new(reader)),
            // Concatenated gzip members read as one stream.
            Self::Gzip => Box::new(MultiGzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Self::Xz => Box::new(XzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Self::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Decoder)?),
        };
        Ok(decoded)
    }

    /// Decode a whole buffer in memory.
    #[instrument(skip(input), fields(compression = %self, input_size = input.len(), output_size))]
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len());
        self.wrap_reader(input)?.read_to_end(&mut output).or_raise(|| ErrorKind::Corrupt)?;
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }

    /// Encode a buffer in memory. Archives are only ever read; this exists to
    /// build compressed fixtures.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(input.to_vec()),
            Self::Bzip2 => encode(BzEncoder::new(Vec::new(), BzLevel::default()), input, BzEncoder::finish),
            Self::Gzip => encode(GzEncoder::new(Vec::new(), GzLevel::default()), input, GzEncoder::finish),
            #[cfg(feature = "xz")]
            Self::Xz => encode(XzEncoder::new(Vec::new(), 6), input, XzEncoder::finish),
            #[cfg(feature = "zstd")]
            Self::Zstd => {
                let encoder = ZstdEncoder::new(Vec::new(), 0).or_raise(|| ErrorKind::Io)?;
                encode(encoder, input, ZstdEncoder::finish)
            },
        }
    }
}
