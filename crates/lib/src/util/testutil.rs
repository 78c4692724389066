//! Test utilities for revi-lib.
//!
//! Archive builders and script helpers for tests that need real tarballs or
//! executables inside a package root.

use std::io::Write;
use std::path::Path;

/// One entry of a tarball built by [`tar_bytes`].
pub enum TarEntry<'a> {
  Dir(&'a str),
  File(&'a str, &'a [u8], u32),
  Symlink(&'a str, &'a str),
}

/// Build an uncompressed tar archive.
pub fn tar_bytes(entries: &[TarEntry<'_>]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for entry in entries {
    let mut header = tar::Header::new_gnu();
    match entry {
      TarEntry::Dir(path) => {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder.append_data(&mut header, path, &[][..]).unwrap();
      }
      TarEntry::File(path, data, mode) => {
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(*mode);
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, path, *data).unwrap();
      }
      TarEntry::Symlink(path, target) => {
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_mode(0o777);
        header.set_size(0);
        builder.append_link(&mut header, path, target).unwrap();
      }
    }
  }
  builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
  let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
  encoder.write_all(data).unwrap();
  encoder.finish().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
  let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
  encoder.write_all(data).unwrap();
  encoder.finish().unwrap()
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
  use std::os::unix::fs::PermissionsExt;

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// A fake sandbox launcher that records its arguments to `log` and then runs
/// whatever follows the `--` separator.
#[cfg(unix)]
pub fn write_recording_launcher(path: &Path, log: &Path) {
  write_script(
    path,
    &format!(
      "printf '%s\\n' \"$@\" >> '{}'\nwhile [ \"$1\" != \"--\" ]; do shift; done\nshift\nexec \"$@\"",
      log.display()
    ),
  );
}
