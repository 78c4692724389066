//! Environment composition.
//!
//! Folds the `bin` and `lib` directories of a dependency closure into the
//! `PATH` and `LD_LIBRARY_PATH` of a process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Package;

/// A process environment, ordered for stable logging.
pub type EnvMap = BTreeMap<String, String>;

impl Package {
  /// Append this package's closure to `env`.
  ///
  /// Dependencies are folded first (recursively, in `all_deps` order), then
  /// this package appends `lib` and `usr/lib` to `LD_LIBRARY_PATH` and `bin`
  /// and `usr/bin` to `PATH`. Duplicate segments from shared dependencies
  /// are kept.
  pub fn compose_env(&self, env: &mut EnvMap) {
    for dep in self.all_deps() {
      dep.compose_env(env);
    }

    let root = self.path();
    append_segments(env, "LD_LIBRARY_PATH", [root.join("lib"), root.join("usr/lib")]);
    append_segments(env, "PATH", [root.join("bin"), root.join("usr/bin")]);
  }

  /// The composed environment of every dependency, excluding this package.
  pub fn deps_env(&self) -> EnvMap {
    let mut env = EnvMap::new();
    for dep in self.all_deps() {
      dep.compose_env(&mut env);
    }
    env
  }
}

fn append_segments<const N: usize>(env: &mut EnvMap, key: &str, segments: [PathBuf; N]) {
  let value = env.entry(key.to_string()).or_default();
  for segment in segments {
    if !value.is_empty() {
      value.push(':');
    }
    value.push_str(&segment.to_string_lossy());
  }
}
