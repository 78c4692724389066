//! The `revi.exec` capability.
//!
//! Recipes never see the package graph directly. They get one injected
//! operation: run a program shipped by a named dependency, with that
//! dependency's composed environment, and read back its stdout.

use std::path::PathBuf;
use std::sync::Arc;

use mlua::prelude::*;
use tracing::{debug, info};

use super::ScriptError;
use crate::build::Sandbox;
use crate::pkg::{EnvMap, Package};

/// Runs a dependency's program on behalf of a recipe.
pub trait DepExec: Send + Sync {
  /// Run `argv` from the dependency resolved by `url`, returning stdout.
  fn exec(&self, url: &str, argv: &[String]) -> Result<String, ScriptError>;
}

/// [`DepExec`] backed by a package's resolved dependencies.
///
/// The dependency is looked up with [`Package::dep_from_url`]. `argv[0]` is
/// taken relative to the dependency's root, the environment is the
/// dependency's composed closure plus `TARGET` (its root), and the command
/// runs in the calling package's root through the sandbox.
pub struct PackageExec {
  pkg: Arc<Package>,
  sandbox: Sandbox,
}

impl PackageExec {
  pub fn new(pkg: Arc<Package>, sandbox: Sandbox) -> Self {
    Self { pkg, sandbox }
  }
}

impl DepExec for PackageExec {
  fn exec(&self, url: &str, argv: &[String]) -> Result<String, ScriptError> {
    let dep = self.pkg.dep_from_url(url).ok_or_else(|| ScriptError::MissingDependency {
      package: self.pkg.url().to_string(),
      url: url.to_string(),
    })?;
    let Some((program, args)) = argv.split_first() else {
      return Err(ScriptError::Exec {
        cmd: String::new(),
        detail: "empty command".to_string(),
      });
    };

    let mut env = EnvMap::new();
    dep.compose_env(&mut env);
    env.insert("TARGET".to_string(), dep.path().display().to_string());

    let program = dep.join(program);
    let cmd = std::iter::once(program.display().to_string())
      .chain(args.iter().cloned())
      .collect::<Vec<_>>()
      .join(" ");
    info!(cmd = %cmd, dep = %url, "recipe exec");

    let root = self.pkg.path();
    let binds: Vec<PathBuf> = self.pkg.all_deps().map(|d| d.path()).collect();
    let output = self
      .sandbox
      .std_command(&root, &binds, &program, args)
      .env_clear()
      .envs(&env)
      .output()
      .map_err(|e| ScriptError::Exec {
        cmd: cmd.clone(),
        detail: e.to_string(),
      })?;

    if !output.status.success() {
      debug!(stderr = %String::from_utf8_lossy(&output.stderr), "recipe command stderr");
      return Err(ScriptError::Exec {
        cmd,
        detail: format!("exited with {}", output.status),
      });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
  }
}

/// Install `exec` into `revi`.
pub fn register(lua: &Lua, revi: &LuaTable, exec: Arc<dyn DepExec>) -> LuaResult<()> {
  let exec_fn = lua.create_function(move |_, (url, argv): (String, Vec<String>)| {
    exec.exec(&url, &argv).map_err(LuaError::external)
  })?;
  revi.set("exec", exec_fn)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pkg::PackageCfg;
  use crate::util::testutil::write_script;
  use tempfile::TempDir;

  fn with_chroot(pkg: Package, temp: &TempDir) -> Package {
    pkg.with_cfg(PackageCfg {
      chroot: temp.path().display().to_string(),
      ..Default::default()
    })
  }

  fn fixture(temp: &TempDir) -> (Arc<Package>, Arc<Package>) {
    let dep = Arc::new(with_chroot(Package::new("https://example.test/tc.tar.gz", b"tc".to_vec()), temp));
    let pkg = Arc::new(with_chroot(
      Package::new("https://example.test/app.tar.gz", b"app".to_vec()).with_deps(vec![dep.clone()]),
      temp,
    ));
    std::fs::create_dir_all(pkg.path()).unwrap();
    (pkg, dep)
  }

  #[test]
  fn runs_dependency_program_with_target() {
    let temp = TempDir::new().unwrap();
    let (pkg, dep) = fixture(&temp);
    write_script(&dep.join("bin/tool"), "echo \"$TARGET|$1|$PATH\"\npwd");

    let exec = PackageExec::new(pkg.clone(), Sandbox::disabled());
    let out = exec
      .exec("https://example.test/tc.tar.gz", &["/bin/tool".to_string(), "arg".to_string()])
      .unwrap();

    let mut lines = out.lines();
    let first: Vec<&str> = lines.next().unwrap().split('|').collect();
    assert_eq!(first[0], dep.path().display().to_string());
    assert_eq!(first[1], "arg");
    assert!(first[2].contains(&dep.join("bin").display().to_string()));
    let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
    assert_eq!(cwd, std::fs::canonicalize(pkg.path()).unwrap());
  }

  #[test]
  fn unknown_dependency_is_reported() {
    let temp = TempDir::new().unwrap();
    let (pkg, _) = fixture(&temp);

    let exec = PackageExec::new(pkg, Sandbox::disabled());
    let err = exec.exec("https://example.test/nope.tar.gz", &["/bin/x".to_string()]).unwrap_err();

    assert!(matches!(err, ScriptError::MissingDependency { .. }));
  }

  #[test]
  fn failing_command_is_an_exec_error() {
    let temp = TempDir::new().unwrap();
    let (pkg, dep) = fixture(&temp);
    write_script(&dep.join("bin/fail"), "exit 1");

    let exec = PackageExec::new(pkg, Sandbox::disabled());
    let err = exec.exec("https://example.test/tc.tar.gz", &["bin/fail".to_string()]).unwrap_err();

    assert!(matches!(err, ScriptError::Exec { .. }));
  }

  #[test]
  fn empty_argv_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (pkg, _) = fixture(&temp);

    let exec = PackageExec::new(pkg, Sandbox::disabled());
    assert!(exec.exec("https://example.test/tc.tar.gz", &[]).is_err());
  }
}
