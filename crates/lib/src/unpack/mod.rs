//! Materializing packages in the store.
//!
//! [`Unpacker::unpack`] walks the package graph bottom-up: every dependency
//! in [`Package::all_deps`] is unpacked concurrently, then the package itself
//! is extracted into its content-addressed [`Package::path`]. An existing
//! path is a cache hit.
//!
//! Extraction happens in a staging directory inside the store, which is
//! renamed into place only once patches, `revi.url` and `revi.json` are
//! written. An interrupted unpack therefore never leaves a partially
//! populated store entry behind.
//!
//! # Submodules
//!
//! - [`archive`] - gzip and xz tarballs
//! - [`squashfs`] - loop-mounted squashfs images

pub mod archive;
pub mod squashfs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

use crate::consts::{SNAPSHOT_FILE, URL_FILE};
use crate::pkg::{Package, PackageSnapshot};
use crate::util::task::{BoxFuture, join_ordered};

use archive::Compression;

/// Errors that can occur while unpacking a package.
#[derive(Debug, Error)]
pub enum UnpackError {
  /// The artifact is neither a gzip tarball, an xz tarball, nor a mountable
  /// squashfs image.
  #[error("unrecognized archive for {url}: gzip: {gzip}; xz: {xz}; squashfs: {squashfs}")]
  Archive {
    url: String,
    gzip: String,
    xz: String,
    squashfs: String,
  },

  #[error("filesystem error at {path}: {source}")]
  Filesystem {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to mount {image}: {detail}")]
  Mount { image: PathBuf, detail: String },

  #[error("failed to copy squashfs tree into {dest}: {detail}")]
  Copy { dest: PathBuf, detail: String },

  #[error("failed to serialize package snapshot: {0}")]
  Snapshot(#[from] serde_json::Error),

  #[error("unpack task failed: {0}")]
  Task(#[from] JoinError),
}

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> UnpackError + '_ {
  move |source| UnpackError::Filesystem {
    path: path.to_path_buf(),
    source,
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackConfig {
  /// Scratch space for squashfs images and mount points.
  pub tmp_dir: PathBuf,
}

impl Default for UnpackConfig {
  fn default() -> Self {
    Self {
      tmp_dir: std::env::temp_dir().join("revi"),
    }
  }
}

pub struct Unpacker {
  config: UnpackConfig,
}

impl Unpacker {
  pub fn new(config: UnpackConfig) -> Arc<Self> {
    Arc::new(Self { config })
  }

  /// Unpack `pkg` and everything it depends on.
  ///
  /// Siblings are unpacked concurrently; every sibling task is drained
  /// before the first error is returned.
  pub fn unpack(self: &Arc<Self>, pkg: Arc<Package>) -> BoxFuture<Result<(), UnpackError>> {
    let this = Arc::clone(self);
    Box::pin(async move {
      let mut join_set = JoinSet::new();
      for (index, dep) in pkg.all_deps().cloned().enumerate() {
        let unpacking = this.unpack(dep);
        join_set.spawn(async move { (index, unpacking.await) });
      }
      join_ordered(join_set).await?;

      let tmp_dir = this.config.tmp_dir.clone();
      tokio::task::spawn_blocking(move || unpack_one(&pkg, &tmp_dir)).await?
    })
  }
}

/// Extract a single package, ignoring its dependencies.
pub fn unpack_one(pkg: &Package, tmp_dir: &Path) -> Result<(), UnpackError> {
  let path: PathBuf = pkg.path().components().collect();
  if path.exists() {
    debug!(url = %pkg.url(), path = ?path, "already unpacked");
    return Ok(());
  }

  info!(url = %pkg.url(), path = ?path, "unpacking");

  let store_dir = pkg.store_dir();
  std::fs::create_dir_all(&store_dir).map_err(fs_error(&store_dir))?;
  let staging = tempfile::Builder::new()
    .prefix(".staging-")
    .tempdir_in(&store_dir)
    .map_err(fs_error(&store_dir))?;

  materialize(pkg, staging.path(), tmp_dir)?;
  apply_patches(pkg, staging.path())?;
  write_metadata(pkg, staging.path())?;
  set_mode(staging.path(), 0o755)?;

  if let Err(e) = std::fs::rename(staging.path(), &path) {
    if path.exists() {
      debug!(url = %pkg.url(), path = ?path, "unpacked concurrently elsewhere");
      return Ok(());
    }
    return Err(fs_error(&path)(e));
  }

  info!(url = %pkg.url(), hash = %pkg.hash(), "unpacked");
  Ok(())
}

/// Write the artifact into `root`: verbatim when it is a target file,
/// otherwise through the first archive format that accepts it.
fn materialize(pkg: &Package, root: &Path, tmp_dir: &Path) -> Result<(), UnpackError> {
  if let Some(target_file) = pkg.target_file() {
    let dest = root.join(target_file.trim_start_matches('/'));
    write_file(&dest, pkg.source_tarball(), 0o755)?;
    debug!(url = %pkg.url(), dest = ?dest, "wrote target file");
    return Ok(());
  }

  let mut failures = Vec::with_capacity(Compression::ATTEMPTS.len());
  for compression in Compression::ATTEMPTS {
    match archive::extract(pkg.source_tarball(), compression, root) {
      Ok(()) => return Ok(()),
      Err(e) => {
        debug!(url = %pkg.url(), format = %compression, error = %e, "format rejected");
        failures.push(e.to_string());
        reset_dir(root)?;
      }
    }
  }

  if let Err(e) = squashfs::extract(pkg.source_tarball(), root, tmp_dir) {
    let mut failures = failures.into_iter();
    return Err(UnpackError::Archive {
      url: pkg.url().to_string(),
      gzip: failures.next().unwrap_or_default(),
      xz: failures.next().unwrap_or_default(),
      squashfs: e.to_string(),
    });
  }
  Ok(())
}

fn apply_patches(pkg: &Package, root: &Path) -> Result<(), UnpackError> {
  for (key, content) in &pkg.cfg().patch {
    let dest = root.join(key.trim_start_matches('/'));
    if dest.is_dir() {
      std::fs::remove_dir_all(&dest).map_err(fs_error(&dest))?;
    }
    write_file(&dest, content, 0o755)?;
    debug!(url = %pkg.url(), patch = %key, "applied patch");
  }
  Ok(())
}

fn write_metadata(pkg: &Package, root: &Path) -> Result<(), UnpackError> {
  write_file(&root.join(URL_FILE), pkg.url().as_bytes(), 0o644)?;
  let snapshot = PackageSnapshot::from(pkg).to_json()?;
  write_file(&root.join(SNAPSHOT_FILE), &snapshot, 0o644)
}

fn write_file(dest: &Path, content: &[u8], mode: u32) -> Result<(), UnpackError> {
  if let Some(parent) = dest.parent() {
    std::fs::create_dir_all(parent).map_err(fs_error(parent))?;
  }
  std::fs::write(dest, content).map_err(fs_error(dest))?;
  set_mode(dest, mode)
}

fn reset_dir(dir: &Path) -> Result<(), UnpackError> {
  std::fs::remove_dir_all(dir).map_err(fs_error(dir))?;
  std::fs::create_dir(dir).map_err(fs_error(dir))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), UnpackError> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(fs_error(path))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), UnpackError> {
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::pkg::PackageCfg;
  use crate::util::hash::hash_directory;
  use crate::util::testutil::{TarEntry, gzip, tar_bytes, xz};
  use tempfile::TempDir;

  fn sample_tar() -> Vec<u8> {
    tar_bytes(&[
      TarEntry::Dir("bin/"),
      TarEntry::File("bin/hello", b"#!/bin/sh\necho hello\n", 0o755),
      TarEntry::File("README", b"readme", 0o644),
    ])
  }

  fn package(temp: &TempDir, url: &str, tarball: Vec<u8>) -> Package {
    Package::new(url, tarball).with_cfg(PackageCfg {
      chroot: temp.path().display().to_string(),
      ..Default::default()
    })
  }

  fn unpacker(temp: &TempDir) -> Arc<Unpacker> {
    Unpacker::new(UnpackConfig {
      tmp_dir: temp.path().join("tmp"),
    })
  }

  #[tokio::test]
  async fn unpacks_gzip_tarball() {
    let temp = TempDir::new().unwrap();
    let pkg = Arc::new(package(&temp, "https://example.test/hello.tar.gz", gzip(&sample_tar())));

    unpacker(&temp).unpack(pkg.clone()).await.unwrap();

    assert_eq!(std::fs::read(pkg.join("README")).unwrap(), b"readme");
    assert_eq!(
      std::fs::read_to_string(pkg.join(URL_FILE)).unwrap(),
      "https://example.test/hello.tar.gz"
    );
    let snapshot = PackageSnapshot::read(&pkg.join(SNAPSHOT_FILE)).unwrap();
    assert_eq!(snapshot.hash, pkg.hash());
  }

  #[tokio::test]
  async fn gzip_and_xz_produce_identical_trees() {
    let gz_root = TempDir::new().unwrap();
    let xz_root = TempDir::new().unwrap();
    let url = "https://example.test/hello.tar";
    let gz_pkg = Arc::new(package(&gz_root, url, gzip(&sample_tar())));
    let xz_pkg = Arc::new(package(&xz_root, url, xz(&sample_tar())));

    unpacker(&gz_root).unpack(gz_pkg.clone()).await.unwrap();
    unpacker(&xz_root).unpack(xz_pkg.clone()).await.unwrap();

    let exclude = [URL_FILE, SNAPSHOT_FILE];
    assert_eq!(
      hash_directory(&gz_pkg.path(), &exclude).unwrap(),
      hash_directory(&xz_pkg.path(), &exclude).unwrap()
    );
  }

  #[tokio::test]
  async fn existing_path_is_a_cache_hit() {
    let temp = TempDir::new().unwrap();
    let pkg = Arc::new(package(&temp, "https://example.test/hello.tar.gz", gzip(&sample_tar())));
    let unpacker = unpacker(&temp);

    unpacker.unpack(pkg.clone()).await.unwrap();
    std::fs::write(pkg.join("marker"), b"kept").unwrap();

    let again = Arc::new(package(&temp, "https://example.test/hello.tar.gz", gzip(&sample_tar())));
    unpacker.unpack(again).await.unwrap();

    assert_eq!(std::fs::read(pkg.join("marker")).unwrap(), b"kept");
  }

  #[tokio::test]
  async fn dependencies_are_unpacked_first() {
    let temp = TempDir::new().unwrap();
    let dep = Arc::new(package(&temp, "https://example.test/dep.tar.gz", gzip(&sample_tar())));
    let extra = Arc::new(package(
      &temp,
      "https://example.test/extra.tar.gz",
      gzip(&tar_bytes(&[TarEntry::File("extra", b"x", 0o644)])),
    ));
    let pkg = Arc::new(
      Package::new("https://example.test/top.tar.gz", gzip(&tar_bytes(&[TarEntry::File("top", b"t", 0o644)])))
        .with_deps(vec![dep.clone()])
        .with_cfg(PackageCfg {
          chroot: temp.path().display().to_string(),
          extra_deps: vec![extra.clone()],
          ..Default::default()
        }),
    );

    unpacker(&temp).unpack(pkg.clone()).await.unwrap();

    assert!(dep.join("bin/hello").is_file());
    assert!(extra.join("extra").is_file());
    assert!(pkg.join("top").is_file());
  }

  #[tokio::test]
  async fn target_file_is_written_verbatim() {
    let temp = TempDir::new().unwrap();
    let pkg = Arc::new(
      package(&temp, "https://example.test/tool-linux-x86_64", b"\x7fELF raw".to_vec()).with_target_file("/bin/tool"),
    );

    unpacker(&temp).unpack(pkg.clone()).await.unwrap();

    assert_eq!(std::fs::read(pkg.join("/bin/tool")).unwrap(), b"\x7fELF raw");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn patches_override_extracted_files() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let mut patch = BTreeMap::new();
    patch.insert("/README".to_string(), b"patched".to_vec());
    patch.insert("/.re.vi".to_string(), b"#!/bin/sh\n".to_vec());
    let pkg = Arc::new(
      Package::new("https://example.test/hello.tar.gz", gzip(&sample_tar())).with_cfg(PackageCfg {
        chroot: temp.path().display().to_string(),
        patch,
        ..Default::default()
      }),
    );

    unpacker(&temp).unpack(pkg.clone()).await.unwrap();

    assert_eq!(std::fs::read(pkg.join("README")).unwrap(), b"patched");
    let mode = std::fs::metadata(pkg.join(".re.vi")).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
  }

  #[tokio::test]
  async fn unrecognized_artifact_leaves_no_store_entry() {
    let temp = TempDir::new().unwrap();
    let pkg = Arc::new(package(&temp, "https://example.test/garbage", b"garbage bytes".to_vec()));

    let err = unpacker(&temp).unpack(pkg.clone()).await.unwrap_err();

    assert!(matches!(err, UnpackError::Archive { .. }), "got {err:?}");
    assert!(!pkg.path().exists());
    let leftovers = std::fs::read_dir(pkg.store_dir()).unwrap().count();
    assert_eq!(leftovers, 0);
  }

  #[tokio::test]
  async fn failing_dependency_aborts_parent() {
    let temp = TempDir::new().unwrap();
    let bad = Arc::new(package(&temp, "https://example.test/bad", b"bad".to_vec()));
    let pkg = Arc::new(
      package(&temp, "https://example.test/top.tar.gz", gzip(&sample_tar())).with_deps(vec![bad]),
    );

    assert!(unpacker(&temp).unpack(pkg.clone()).await.is_err());
    assert!(!pkg.path().exists());
  }
}
