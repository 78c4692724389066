//! Sandboxed command construction.
//!
//! A sandboxed command sees the whole host filesystem read-only, with the
//! package root and its direct dependencies bound read-write:
//!
//! ```text
//! <launcher> --ro-bind / / --bind P P [--bind D D]... --chdir P -- program args...
//! ```
//!
//! With no launcher configured the program runs directly in `P`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_SANDBOX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
  launcher: Option<PathBuf>,
}

impl Default for Sandbox {
  fn default() -> Self {
    Self::new(Some(PathBuf::from(DEFAULT_SANDBOX)))
  }
}

impl Sandbox {
  pub fn new(launcher: Option<PathBuf>) -> Self {
    Self { launcher }
  }

  pub fn disabled() -> Self {
    Self { launcher: None }
  }

  pub fn is_enabled(&self) -> bool {
    self.launcher.is_some()
  }

  pub fn launcher(&self) -> Option<&Path> {
    self.launcher.as_deref()
  }

  /// Program and argument vector that run `program args` with `root`
  /// and `binds` writable.
  pub fn render(&self, root: &Path, binds: &[PathBuf], program: &Path, args: &[String]) -> (PathBuf, Vec<OsString>) {
    let Some(launcher) = &self.launcher else {
      return (program.to_path_buf(), args.iter().map(OsString::from).collect());
    };

    let mut argv: Vec<OsString> = vec!["--ro-bind".into(), "/".into(), "/".into()];
    for path in std::iter::once(root).chain(binds.iter().map(PathBuf::as_path)) {
      argv.push("--bind".into());
      argv.push(path.into());
      argv.push(path.into());
    }
    argv.push("--chdir".into());
    argv.push(root.into());
    argv.push("--".into());
    argv.push(program.into());
    argv.extend(args.iter().map(OsString::from));

    (locate(launcher), argv)
  }

  /// A blocking command, for callers already on a blocking thread.
  pub fn std_command(&self, root: &Path, binds: &[PathBuf], program: &Path, args: &[String]) -> std::process::Command {
    let (program, argv) = self.render(root, binds, program, args);
    let mut command = std::process::Command::new(program);
    command.args(argv).current_dir(root);
    command
  }

  pub fn command(&self, root: &Path, binds: &[PathBuf], program: &Path, args: &[String]) -> tokio::process::Command {
    tokio::process::Command::from(self.std_command(root, binds, program, args))
  }
}

/// Resolve a bare launcher name against the host `PATH`.
///
/// Commands run with a cleared environment, so the lookup cannot be left to
/// the child's own `PATH`.
fn locate(launcher: &Path) -> PathBuf {
  if launcher.components().count() > 1 {
    return launcher.to_path_buf();
  }
  std::env::var_os("PATH")
    .and_then(|paths| {
      std::env::split_paths(&paths)
        .map(|dir| dir.join(launcher))
        .find(|candidate| candidate.is_file())
    })
    .unwrap_or_else(|| launcher.to_path_buf())
}
