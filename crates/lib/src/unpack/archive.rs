//! Tar extraction for gzip- and xz-compressed artifacts.

use std::io::{self, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tar::EntryType;
use tracing::trace;
use xz2::read::XzDecoder;

/// Compression wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
  Gzip,
  Xz,
}

impl Compression {
  /// Order in which formats are attempted.
  pub const ATTEMPTS: [Compression; 2] = [Compression::Gzip, Compression::Xz];

  /// Decoders read every concatenated member or stream, as written by
  /// parallel compressors.
  fn decoder<'a>(self, data: &'a [u8]) -> Box<dyn Read + 'a> {
    match self {
      Compression::Gzip => Box::new(MultiGzDecoder::new(data)),
      Compression::Xz => Box::new(XzDecoder::new_multi_decoder(data)),
    }
  }
}

impl std::fmt::Display for Compression {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Compression::Gzip => write!(f, "gzip"),
      Compression::Xz => write!(f, "xz"),
    }
  }
}

/// Extract a compressed tarball into `dest`.
///
/// Only directories and regular files are materialized; links, devices and
/// other entry kinds are skipped. Entry paths are sanitized by the tar crate
/// so nothing escapes `dest`, and file modes are preserved.
pub fn extract(data: &[u8], compression: Compression, dest: &Path) -> io::Result<()> {
  let mut archive = tar::Archive::new(compression.decoder(data));
  archive.set_preserve_permissions(true);
  archive.set_overwrite(true);

  let mut entries = 0usize;
  for entry in archive.entries()? {
    let mut entry = entry?;
    match entry.header().entry_type() {
      EntryType::Regular | EntryType::Directory => {
        entry.unpack_in(dest)?;
        entries += 1;
      }
      other => {
        trace!(path = ?entry.path().ok(), kind = ?other, "skipping tar entry");
      }
    }
  }

  trace!(format = %compression, entries, "extracted tarball");
  Ok(())
}
