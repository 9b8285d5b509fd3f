//! Compression layers around archive containers.
//!
//! Archives are often delivered wrapped in a compression layer (`.tar.gz`,
//! `.warc.gz`, `.arc.gz`). Mounting them needs three things from this crate:
//! recognising the layer from a file name ([`Compression::split_name`]) or
//! from the first bytes of the data ([`Compression::sniff`]), and decoding it
//! as a stream ([`Compression::wrap_reader`]).
//!
//! Bzip2 and Gzip are always available; XZ and Zstd are behind the `xz` and
//! `zstd` features. Gzip is always decoded as a multi-member stream, because
//! record-based formats such as WARC compress every record separately.

pub mod error;
mod format;
mod ops;

pub use crate::ops::BoxRead;

/// A compression layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    #[default]
    None,
    Bzip2,
    Gzip,
    #[cfg(feature = "xz")]
    Xz,
    #[cfg(feature = "zstd")]
    Zstd,
}
