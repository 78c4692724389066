//! The package graph.
//!
//! A [`Package`] is one node of a dependency tree: the artifact bytes fetched
//! from its origin URL, the packages it directly owns, and the configuration
//! that shapes how it is unpacked and built. Packages are immutable once
//! constructed; unpacking and building only produce disk state under the
//! content-addressed [`Package::path`].
//!
//! # Submodules
//!
//! - [`address`] - content hash and store path derivation
//! - [`env`] - environment composition over a dependency closure
//! - [`snapshot`] - serializable view of a graph written next to each package

pub mod address;
pub mod env;
pub mod snapshot;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::util::hash::ObjectHash;

pub use address::builder_identity;
pub use env::EnvMap;
pub use snapshot::PackageSnapshot;

/// Build configuration attached to a package.
#[derive(Debug, Clone, Default)]
pub struct PackageCfg {
  /// Dependencies traversed for hashing, unpacking and building, but never
  /// searched by URL lookups and never discovered by the resolver.
  pub extra_deps: Vec<Arc<Package>>,
  /// Files written over the extracted tree, keyed by path relative to the
  /// package root. Kept sorted so hashing is independent of insertion order.
  pub patch: BTreeMap<String, Vec<u8>>,
  /// Opaque identity override mixed into the hash.
  pub canonical_name: Vec<u8>,
  /// Libc variant tag, e.g. `gnu` or `musl`.
  pub libc: Option<String>,
  /// Filesystem root prefix under which the store lives.
  pub chroot: String,
}

/// A node in the dependency graph.
#[derive(Clone, Default)]
pub struct Package {
  source_tarball: Vec<u8>,
  deps: Vec<Arc<Package>>,
  url: String,
  target_file: Option<String>,
  cfg: PackageCfg,
  hash: OnceLock<ObjectHash>,
}

impl std::fmt::Debug for Package {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Package")
      .field("url", &self.url)
      .field("source_tarball", &format_args!("<{} bytes>", self.source_tarball.len()))
      .field("target_file", &self.target_file)
      .field("deps", &self.deps)
      .field("cfg", &self.cfg)
      .finish()
  }
}

impl Package {
  pub fn new(url: impl Into<String>, source_tarball: Vec<u8>) -> Self {
    Self {
      url: url.into(),
      source_tarball,
      ..Default::default()
    }
  }

  pub fn with_deps(mut self, deps: Vec<Arc<Package>>) -> Self {
    self.deps = deps;
    self.hash = OnceLock::new();
    self
  }

  /// Mark the artifact as a single opaque file written verbatim to
  /// `path() + target_file` instead of an archive.
  pub fn with_target_file(mut self, target_file: impl Into<String>) -> Self {
    self.target_file = Some(target_file.into());
    self.hash = OnceLock::new();
    self
  }

  pub fn with_cfg(mut self, cfg: PackageCfg) -> Self {
    self.cfg = cfg;
    self.hash = OnceLock::new();
    self
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn source_tarball(&self) -> &[u8] {
    &self.source_tarball
  }

  pub fn deps(&self) -> &[Arc<Package>] {
    &self.deps
  }

  pub fn target_file(&self) -> Option<&str> {
    self.target_file.as_deref()
  }

  pub fn cfg(&self) -> &PackageCfg {
    &self.cfg
  }

  pub fn libc(&self) -> Option<&str> {
    self.cfg.libc.as_deref()
  }

  /// Direct dependencies followed by extra dependencies.
  ///
  /// This order defines traversal for hashing, unpacking and building.
  pub fn all_deps(&self) -> impl Iterator<Item = &Arc<Package>> {
    self.deps.iter().chain(self.cfg.extra_deps.iter())
  }

  /// Find a dependency by origin URL.
  ///
  /// When this package carries a libc tag the match must carry the same tag,
  /// so a musl build never picks up a same-URL gnu toolchain.
  pub fn dep_from_url(&self, url: &str) -> Option<&Arc<Package>> {
    self.dep_from_url_libc(url, self.libc())
  }

  /// Find a dependency by origin URL and an explicit libc tag.
  pub fn dep_from_url_libc(&self, url: &str, libc: Option<&str>) -> Option<&Arc<Package>> {
    self.find_dep(|d| d.url == url && (libc.is_none() || d.libc() == libc))
  }

  /// Find a dependency whose content hash equals `hash`.
  pub fn dep_from_hash(&self, hash: &ObjectHash) -> Option<&Arc<Package>> {
    self.find_dep(|d| &d.hash() == hash)
  }

  /// Depth-first search over `deps` (never `extra_deps`).
  ///
  /// Each node is visited once, keyed by identity rather than content hash:
  /// nodes differing only in URL share a hash but must still be matched.
  fn find_dep(&self, matches: impl Fn(&Package) -> bool) -> Option<&Arc<Package>> {
    let mut visited = HashSet::new();
    let mut stack: Vec<&Arc<Package>> = self.deps.iter().rev().collect();

    while let Some(dep) = stack.pop() {
      if !visited.insert(Arc::as_ptr(dep)) {
        continue;
      }
      if matches(dep) {
        return Some(dep);
      }
      stack.extend(dep.deps.iter().rev());
    }
    None
  }
}
