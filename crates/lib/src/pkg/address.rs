//! Content addressing.
//!
//! A package's hash covers every input that can influence its build output,
//! including the bytes of the running builder program. Any change to the
//! builder therefore invalidates every cached artifact.

use std::path::PathBuf;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::consts::STORE_SUBDIR;
use crate::util::hash::ObjectHash;

use super::Package;

static BUILDER_IDENTITY: OnceLock<Vec<u8>> = OnceLock::new();

/// Bytes of the running builder executable, read once per process.
///
/// Falls back to an empty identity (with a warning) when the executable
/// cannot be read, e.g. after it was replaced on disk.
pub fn builder_identity() -> &'static [u8] {
  BUILDER_IDENTITY.get_or_init(|| {
    let bytes = std::fs::read("/proc/self/exe").or_else(|_| std::env::current_exe().and_then(std::fs::read));
    match bytes {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(error = %e, "cannot read builder executable, hashes will not track builder changes");
        Vec::new()
      }
    }
  })
}

impl Package {
  /// The content address of this package.
  ///
  /// SHA-256 over, in order: the artifact bytes, the hashes of `deps` then
  /// `extra_deps`, each patch as `key:content` in key order, the canonical
  /// name, the chroot, the libc tag, and the builder identity.
  pub fn hash(&self) -> ObjectHash {
    self
      .hash
      .get_or_init(|| self.digest(builder_identity(), |dep| dep.hash()))
      .clone()
  }

  pub(crate) fn digest(&self, builder: &[u8], dep_hash: impl Fn(&Package) -> ObjectHash) -> ObjectHash {
    let mut hasher = Sha256::new();
    hasher.update(&self.source_tarball);
    for dep in self.all_deps() {
      hasher.update(dep_hash(dep).0.as_bytes());
    }
    for (key, content) in &self.cfg.patch {
      hasher.update(key.as_bytes());
      hasher.update(b":");
      hasher.update(content);
    }
    hasher.update(&self.cfg.canonical_name);
    hasher.update(self.cfg.chroot.as_bytes());
    hasher.update(self.libc().unwrap_or_default().as_bytes());
    hasher.update(builder);
    ObjectHash(hex::encode(hasher.finalize()))
  }

  /// Root directory of this package in the store:
  /// `<chroot>/re/vi/<hash>/`.
  pub fn path(&self) -> PathBuf {
    PathBuf::from(format!("{}/{}/{}/", self.cfg.chroot, STORE_SUBDIR, self.hash()))
  }

  /// Directory holding every package root for this package's chroot.
  pub fn store_dir(&self) -> PathBuf {
    store_dir(&self.cfg.chroot)
  }

  /// Resolve a package-relative path such as a patch key or target file.
  pub fn join(&self, relative: &str) -> PathBuf {
    self.path().join(relative.trim_start_matches('/'))
  }
}

/// `<chroot>/re/vi`.
pub fn store_dir(chroot: &str) -> PathBuf {
  PathBuf::from(format!("{}/{}", chroot, STORE_SUBDIR))
}
