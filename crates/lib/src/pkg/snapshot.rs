//! Serializable snapshot of a package graph.
//!
//! Written as `revi.json` into every package root so the graph that produced
//! a store entry can be inspected after the fact. Artifact bytes are recorded
//! by size and digest only.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::util::hash::{ObjectHash, hash_bytes};

use super::Package;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSnapshot {
  pub url: String,
  pub hash: ObjectHash,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_file: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub libc: Option<String>,
  pub chroot: String,
  pub canonical_name: String,
  pub patches: Vec<String>,
  pub tarball_size: usize,
  pub tarball_sha256: ObjectHash,
  pub deps: Vec<PackageSnapshot>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub extra_deps: Vec<PackageSnapshot>,
}

impl From<&Package> for PackageSnapshot {
  fn from(pkg: &Package) -> Self {
    Self {
      url: pkg.url.clone(),
      hash: pkg.hash(),
      target_file: pkg.target_file.clone(),
      libc: pkg.cfg.libc.clone(),
      chroot: pkg.cfg.chroot.clone(),
      canonical_name: String::from_utf8_lossy(&pkg.cfg.canonical_name).to_string(),
      patches: pkg.cfg.patch.keys().cloned().collect(),
      tarball_size: pkg.source_tarball.len(),
      tarball_sha256: hash_bytes(&pkg.source_tarball),
      deps: pkg.deps.iter().map(|d| PackageSnapshot::from(d.as_ref())).collect(),
      extra_deps: pkg.cfg.extra_deps.iter().map(|d| PackageSnapshot::from(d.as_ref())).collect(),
    }
  }
}

impl PackageSnapshot {
  pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(self)
  }

  /// Read a snapshot previously written into a package root.
  pub fn read(path: &Path) -> std::io::Result<Self> {
    let content = std::fs::read(path)?;
    serde_json::from_slice(&content).map_err(std::io::Error::other)
  }
}
