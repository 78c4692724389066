//! Runtime configuration.
//!
//! Values come from `REVI_*` environment variables and can be overridden by
//! the CLI. Each pipeline stage takes the slice of configuration it needs.

use std::path::PathBuf;

use crate::build::{BuildConfig, Sandbox};
use crate::fetch::ResolveOptions;
use crate::unpack::UnpackConfig;

pub const CHROOT_VAR: &str = "REVI_CHROOT";
pub const LIBC_VAR: &str = "REVI_LIBC";
pub const SANDBOX_VAR: &str = "REVI_SANDBOX";
pub const TMPDIR_VAR: &str = "REVI_TMPDIR";
pub const JOBS_VAR: &str = "REVI_JOBS";

/// Launcher used when `REVI_SANDBOX` is unset.
pub const DEFAULT_SANDBOX: &str = "bwrap";

/// Value of `REVI_SANDBOX` that runs commands without a sandbox.
pub const SANDBOX_DISABLED: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
  /// Filesystem root prefix under which the store lives.
  pub chroot: String,
  /// Libc tag stamped onto every resolved package.
  pub libc: Option<String>,
  /// Sandbox launcher program, `None` to run commands directly.
  pub sandbox: Option<PathBuf>,
  /// Scratch space for squashfs images, mount points and staging roots.
  pub tmp_dir: PathBuf,
  /// Maximum number of concurrent adapter dispatches.
  pub jobs: usize,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      chroot: String::new(),
      libc: None,
      sandbox: Some(PathBuf::from(DEFAULT_SANDBOX)),
      tmp_dir: default_tmp_dir(),
      jobs: num_cpus(),
    }
  }
}

impl RuntimeConfig {
  /// Read the configuration from the process environment.
  pub fn from_env() -> Self {
    let defaults = Self::default();

    let chroot = std::env::var(CHROOT_VAR).unwrap_or(defaults.chroot);
    let libc = std::env::var(LIBC_VAR).ok().filter(|l| !l.is_empty());
    let sandbox = match std::env::var(SANDBOX_VAR) {
      Ok(value) => parse_sandbox(&value),
      Err(_) => defaults.sandbox,
    };
    let tmp_dir = std::env::var(TMPDIR_VAR).map(PathBuf::from).unwrap_or(defaults.tmp_dir);
    let jobs = std::env::var(JOBS_VAR)
      .ok()
      .and_then(|j| j.parse::<usize>().ok())
      .filter(|j| *j > 0)
      .unwrap_or(defaults.jobs);

    Self {
      chroot,
      libc,
      sandbox,
      tmp_dir,
      jobs,
    }
  }

  pub fn resolve_options(&self) -> ResolveOptions {
    ResolveOptions {
      chroot: self.chroot.clone(),
      libc: self.libc.clone(),
    }
  }

  pub fn unpack_config(&self) -> UnpackConfig {
    UnpackConfig {
      tmp_dir: self.tmp_dir.clone(),
    }
  }

  pub fn build_config(&self) -> BuildConfig {
    BuildConfig {
      sandbox: Sandbox::new(self.sandbox.clone()),
      parallelism: self.jobs,
    }
  }
}

/// Parse a sandbox launcher setting. `none` and the empty string disable sandboxing.
pub fn parse_sandbox(value: &str) -> Option<PathBuf> {
  let value = value.trim();
  if value.is_empty() || value == SANDBOX_DISABLED {
    None
  } else {
    Some(PathBuf::from(value))
  }
}

fn default_tmp_dir() -> PathBuf {
  std::env::temp_dir().join("revi")
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  fn cleared<F: FnOnce()>(f: F) {
    temp_env::with_vars(
      [
        (CHROOT_VAR, None::<&str>),
        (LIBC_VAR, None),
        (SANDBOX_VAR, None),
        (TMPDIR_VAR, None),
        (JOBS_VAR, None),
      ],
      f,
    );
  }

  #[test]
  #[serial]
  fn defaults_without_environment() {
    cleared(|| {
      let config = RuntimeConfig::from_env();
      assert_eq!(config.chroot, "");
      assert_eq!(config.libc, None);
      assert_eq!(config.sandbox, Some(PathBuf::from("bwrap")));
      assert!(config.jobs >= 1);
    });
  }

  #[test]
  #[serial]
  fn environment_overrides_defaults() {
    cleared(|| {
      temp_env::with_vars(
        [
          (CHROOT_VAR, Some("/scratch")),
          (LIBC_VAR, Some("musl")),
          (SANDBOX_VAR, Some("/usr/local/bin/bwrap")),
          (TMPDIR_VAR, Some("/var/tmp/revi")),
          (JOBS_VAR, Some("3")),
        ],
        || {
          let config = RuntimeConfig::from_env();
          assert_eq!(config.chroot, "/scratch");
          assert_eq!(config.libc.as_deref(), Some("musl"));
          assert_eq!(config.sandbox, Some(PathBuf::from("/usr/local/bin/bwrap")));
          assert_eq!(config.tmp_dir, PathBuf::from("/var/tmp/revi"));
          assert_eq!(config.jobs, 3);
        },
      );
    });
  }

  #[test]
  #[serial]
  fn sandbox_can_be_disabled() {
    cleared(|| {
      temp_env::with_var(SANDBOX_VAR, Some("none"), || {
        assert_eq!(RuntimeConfig::from_env().sandbox, None);
      });
    });
  }

  #[test]
  #[serial]
  fn invalid_jobs_fall_back_to_default() {
    cleared(|| {
      temp_env::with_var(JOBS_VAR, Some("0"), || {
        assert!(RuntimeConfig::from_env().jobs >= 1);
      });
    });
  }

  #[test]
  fn derived_configs_carry_values() {
    let config = RuntimeConfig {
      chroot: "/c".to_string(),
      libc: Some("gnu".to_string()),
      sandbox: None,
      tmp_dir: PathBuf::from("/t"),
      jobs: 2,
    };
    assert_eq!(config.resolve_options().chroot, "/c");
    assert_eq!(config.resolve_options().libc.as_deref(), Some("gnu"));
    assert_eq!(config.unpack_config().tmp_dir, PathBuf::from("/t"));
    assert_eq!(config.build_config().parallelism, 2);
    assert!(!config.build_config().sandbox.is_enabled());
  }
}
