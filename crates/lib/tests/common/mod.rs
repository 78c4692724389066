//! Shared helpers for revi-lib integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use revi_lib::build::{BuildConfig, Builder, Sandbox};
use revi_lib::unpack::{UnpackConfig, Unpacker};
use tempfile::TempDir;

/// Build a gzip-compressed tarball from `(path, content, mode)` entries.
pub fn targz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
  let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
  encoder.write_all(&tarball(files)).unwrap();
  encoder.finish().unwrap()
}

/// Build an xz-compressed tarball from `(path, content, mode)` entries.
pub fn tarxz(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
  let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
  encoder.write_all(&tarball(files)).unwrap();
  encoder.finish().unwrap()
}

fn tarball(files: &[(&str, &[u8], u32)]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for (path, content, mode) in files {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(*mode);
    header.set_size(content.len() as u64);
    builder.append_data(&mut header, path, *content).unwrap();
  }
  builder.into_inner().unwrap()
}

/// Isolated store: the chroot, scratch directory and pipeline stages all
/// live under one temporary directory, with sandboxing disabled.
pub struct TestStore {
  pub temp: TempDir,
}

impl TestStore {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn chroot(&self) -> String {
    self.temp.path().join("root").display().to_string()
  }

  pub fn unpacker(&self) -> Arc<Unpacker> {
    Unpacker::new(UnpackConfig {
      tmp_dir: self.temp.path().join("tmp"),
    })
  }

  pub fn builder(&self) -> Arc<Builder> {
    Builder::new(BuildConfig {
      sandbox: Sandbox::disabled(),
      parallelism: 2,
    })
  }
}
