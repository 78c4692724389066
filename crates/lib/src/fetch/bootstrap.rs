//! Bootstrap dependency inference.
//!
//! When a package ships no manifest, its dependencies are inferred from its
//! URL. The table is ordered data: every matching row contributes its URLs,
//! in row order, without duplicates.

use crate::consts::{
  BAZEL_BINARY, BAZEL_RELEASES, BAZEL_TARGET_FILE, BOOTSTRAP_GCC, BOOTSTRAP_MAKE, BUSYBOX, CMAKE, GCC, MAKE, MUSL,
  OSTREE_RELEASES, PYTHON,
};
use crate::pattern::UrlPattern;

#[derive(Debug, Clone)]
pub struct BootstrapRule {
  pub pattern: UrlPattern,
  pub deps: Vec<String>,
  /// Set when matching artifacts are single files rather than archives.
  pub target_file: Option<String>,
}

impl BootstrapRule {
  pub fn new(pattern: UrlPattern, deps: &[&str]) -> Self {
    Self {
      pattern,
      deps: deps.iter().map(|d| d.to_string()).collect(),
      target_file: None,
    }
  }

  pub fn with_target_file(mut self, target_file: &str) -> Self {
    self.target_file = Some(target_file.to_string());
    self
  }
}

/// Dependencies and target file inferred for one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inferred {
  pub deps: Vec<String>,
  pub target_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BootstrapTable {
  rules: Vec<BootstrapRule>,
}

impl BootstrapTable {
  pub fn new(rules: Vec<BootstrapRule>) -> Self {
    Self { rules }
  }

  /// A table that infers nothing.
  pub fn empty() -> Self {
    Self { rules: Vec::new() }
  }

  pub fn infer(&self, url: &str) -> Inferred {
    let mut inferred = Inferred::default();
    for rule in self.rules.iter().filter(|r| r.pattern.matches(url)) {
      for dep in &rule.deps {
        if !inferred.deps.contains(dep) {
          inferred.deps.push(dep.clone());
        }
      }
      if inferred.target_file.is_none() {
        inferred.target_file = rule.target_file.clone();
      }
    }
    inferred
  }
}

impl Default for BootstrapTable {
  fn default() -> Self {
    Self::new(vec![
      BootstrapRule::new(
        UrlPattern::contains("gcc").except(BOOTSTRAP_GCC),
        &[BOOTSTRAP_GCC, BUSYBOX, BOOTSTRAP_MAKE],
      ),
      BootstrapRule::new(UrlPattern::contains("make").except(BOOTSTRAP_MAKE), &[GCC]),
      BootstrapRule::new(UrlPattern::contains("cmake"), &[MAKE]),
      BootstrapRule::new(UrlPattern::contains("ninja"), &[CMAKE]),
      BootstrapRule::new(UrlPattern::contains("python"), &[MAKE]),
      BootstrapRule::new(UrlPattern::contains(OSTREE_RELEASES), &[MAKE]),
      BootstrapRule::new(UrlPattern::contains("meson"), &[PYTHON]),
      BootstrapRule::new(UrlPattern::contains(MUSL), &[MAKE]),
      BootstrapRule::new(UrlPattern::contains(BAZEL_RELEASES).without("tar"), &[BUSYBOX])
        .with_target_file(BAZEL_TARGET_FILE),
      BootstrapRule::new(
        UrlPattern::contains(BAZEL_RELEASES).and_contains("tar"),
        &[BAZEL_BINARY, PYTHON],
      ),
    ])
  }
}
