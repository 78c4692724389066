//! Built-in build adapters.
//!
//! An [`AdapterTable`] is an ordered list of `(predicate, strategy)` rows; the
//! first row whose predicate accepts a package decides how it is built.
//! Command strategies are planned up front: every dependency a plan needs is
//! looked up before anything runs, so a missing toolchain surfaces as
//! [`BuildError::MissingDependency`] rather than a half-run build.

use std::path::PathBuf;
use std::sync::Arc;

use super::BuildError;
use super::step::BuildStep;
use crate::consts::{
  BASE_PATH, BAZEL_BINARY, BAZEL_RELEASES, BOOTSTRAP_GCC, BOOTSTRAP_MAKE, CMAKE, GCC, LIBC_GNU, LIBC_MUSL, MAKE,
  MULTICALL_BINARY, MUSL, OSTREE_RELEASES, PYTHON,
};
use crate::pattern::UrlPattern;
use crate::pkg::{EnvMap, Package};

/// Produces the commands that build a package.
pub type Planner = fn(&Package) -> Result<Vec<BuildStep>, BuildError>;

pub enum Strategy {
  /// Run the planned commands in order.
  Steps(Planner),
  /// Link every applet of the package's multi-call binary into `<chroot>/bin`.
  LinkApplets,
  /// The artifact is already runnable.
  Prebuilt,
}

pub struct AdapterRule {
  pub name: &'static str,
  predicate: Box<dyn Fn(&Package) -> bool + Send + Sync>,
  pub strategy: Strategy,
}

impl AdapterRule {
  pub fn new(
    name: &'static str,
    predicate: impl Fn(&Package) -> bool + Send + Sync + 'static,
    strategy: Strategy,
  ) -> Self {
    Self {
      name,
      predicate: Box::new(predicate),
      strategy,
    }
  }

  /// A rule keyed on the package URL alone.
  pub fn url(name: &'static str, pattern: UrlPattern, strategy: Strategy) -> Self {
    Self::new(name, move |pkg| pattern.matches(pkg.url()), strategy)
  }

  pub fn matches(&self, pkg: &Package) -> bool {
    (self.predicate)(pkg)
  }
}

impl std::fmt::Debug for AdapterRule {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AdapterRule").field("name", &self.name).finish()
  }
}

#[derive(Debug)]
pub struct AdapterTable {
  rules: Vec<AdapterRule>,
}

impl AdapterTable {
  pub fn new(rules: Vec<AdapterRule>) -> Self {
    Self { rules }
  }

  /// First rule accepting `pkg`.
  pub fn select(&self, pkg: &Package) -> Option<&AdapterRule> {
    self.rules.iter().find(|rule| rule.matches(pkg))
  }
}

impl Default for AdapterTable {
  fn default() -> Self {
    let gcc = UrlPattern::contains("gcc").except(BOOTSTRAP_GCC);
    let musl_gcc = gcc.clone();
    let python = UrlPattern::contains("python");
    let ostree = UrlPattern::contains(OSTREE_RELEASES);

    Self::new(vec![
      AdapterRule::new(
        "gcc",
        move |pkg| gcc.matches(pkg.url()) && pkg.libc() != Some(LIBC_MUSL),
        Strategy::Steps(plan_gcc),
      ),
      AdapterRule::url(
        "make",
        UrlPattern::contains("make").except(BOOTSTRAP_MAKE).without("cmake"),
        Strategy::Steps(plan_make),
      ),
      AdapterRule::url("musl", UrlPattern::contains("musl"), Strategy::Steps(plan_musl)),
      AdapterRule::new(
        "musl-gcc",
        move |pkg| musl_gcc.matches(pkg.url()) && pkg.libc() == Some(LIBC_MUSL),
        Strategy::Steps(plan_musl_gcc),
      ),
      AdapterRule::url("cmake", UrlPattern::contains("cmake"), Strategy::Steps(plan_cmake)),
      AdapterRule::new(
        "autotools",
        move |pkg| python.matches(pkg.url()) || ostree.matches(pkg.url()),
        Strategy::Steps(plan_autotools),
      ),
      AdapterRule::url("ninja", UrlPattern::contains("ninja"), Strategy::Steps(plan_ninja)),
      AdapterRule::url("meson", UrlPattern::contains("meson"), Strategy::Steps(plan_meson)),
      AdapterRule::url(
        "bazel-binary",
        UrlPattern::contains(BAZEL_RELEASES).without("tar"),
        Strategy::Prebuilt,
      ),
      AdapterRule::url(
        "bazel-source",
        UrlPattern::contains(BAZEL_RELEASES).and_contains("tar"),
        Strategy::Steps(plan_bazel),
      ),
      AdapterRule::new(
        "multi-call",
        |pkg| pkg.join(MULTICALL_BINARY).is_file(),
        Strategy::LinkApplets,
      ),
    ])
  }
}

fn require<'a>(pkg: &'a Package, url: &str) -> Result<&'a Arc<Package>, BuildError> {
  pkg.dep_from_url(url).ok_or_else(|| BuildError::MissingDependency {
    package: pkg.url().to_string(),
    url: url.to_string(),
    libc: pkg.libc().map(str::to_string),
  })
}

fn require_libc<'a>(pkg: &'a Package, url: &str, libc: &str) -> Result<&'a Arc<Package>, BuildError> {
  pkg
    .dep_from_url_libc(url, Some(libc))
    .ok_or_else(|| BuildError::MissingDependency {
      package: pkg.url().to_string(),
      url: url.to_string(),
      libc: Some(libc.to_string()),
    })
}

fn root(pkg: &Package) -> String {
  pkg.path().display().to_string()
}

/// Dependency closure environment with the host fallback search path.
pub(crate) fn base_env(pkg: &Package) -> EnvMap {
  let mut env = pkg.deps_env();
  let path = env.entry("PATH".to_string()).or_default();
  if !path.is_empty() {
    path.push(':');
  }
  path.push_str(BASE_PATH);
  env
}

/// [`base_env`] plus `CC`/`CXX` taken from `compilers`' `bin/<cc>` and `bin/<cxx>`.
fn toolchain_env(pkg: &Package, compilers: &Package, cc: &str, cxx: &str) -> EnvMap {
  let mut env = base_env(pkg);
  env.insert("CC".to_string(), compilers.join(&format!("bin/{}", cc)).display().to_string());
  env.insert("CXX".to_string(), compilers.join(&format!("bin/{}", cxx)).display().to_string());
  env
}

fn configure(pkg: &Package, env: &EnvMap) -> BuildStep {
  BuildStep::sandboxed("./configure", &[])
    .with_args([format!("--prefix={}", root(pkg))])
    .with_env(env.clone())
}

fn make(make: &Package, args: &[&str], env: &EnvMap) -> BuildStep {
  BuildStep::sandboxed(make.join("bin/make"), args).with_env(env.clone())
}

fn staged_install(pkg: &Package, make_pkg: &Package, env: &EnvMap) -> BuildStep {
  make(make_pkg, &[], env).with_args([format!("DESTDIR={}", root(pkg)), "install".to_string()])
}

fn plan_gcc(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let compilers = require(pkg, BOOTSTRAP_GCC)?;
  let make_pkg = require(pkg, BOOTSTRAP_MAKE)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![configure(pkg, &env), staged_install(pkg, make_pkg, &env)])
}

fn plan_make(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let compilers = require(pkg, GCC)?;
  let make_pkg = require(pkg, BOOTSTRAP_MAKE)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![configure(pkg, &env), staged_install(pkg, make_pkg, &env)])
}

fn plan_musl(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let make_pkg = require(pkg, MAKE)?;
  let compilers = require_libc(pkg, GCC, LIBC_GNU)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![make(make_pkg, &[], &env)])
}

fn plan_musl_gcc(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let make_pkg = require(pkg, MAKE)?;
  let compilers = require(pkg, MUSL)?;
  let env = toolchain_env(pkg, compilers, "musl-gcc", "musl-g++");
  Ok(vec![configure(pkg, &env), make(make_pkg, &[], &env)])
}

fn plan_cmake(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let make_pkg = require(pkg, MAKE)?;
  let compilers = require(pkg, GCC)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![
    BuildStep::sandboxed("./bootstrap", &["--", "-DCMAKE_BUILD_TYPE:STRING=Release"]).with_env(env.clone()),
    make(make_pkg, &[], &env),
  ])
}

fn plan_autotools(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let make_pkg = require(pkg, MAKE)?;
  let compilers = require(pkg, GCC)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![configure(pkg, &env), make(make_pkg, &[], &env)])
}

fn plan_ninja(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let make_pkg = require(pkg, MAKE)?;
  let compilers = require(pkg, GCC)?;
  let cmake = require(pkg, CMAKE)?;
  let env = toolchain_env(pkg, compilers, "gcc", "g++");
  Ok(vec![
    BuildStep::sandboxed(cmake.join("bin/cmake"), &["-S"])
      .with_args([root(pkg), "-Bbin".to_string(), "-DCMAKE_BUILD_TYPE:STRING=Release".to_string()])
      .with_env(env.clone()),
    make(make_pkg, &["-C", "bin"], &env),
  ])
}

fn plan_meson(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let python = require(pkg, PYTHON)?;
  let mut env = base_env(pkg);
  let venv = BuildStep::sandboxed(python.join("bin/python"), &["-m", "venv"])
    .with_args([root(pkg)])
    .with_env(env.clone());
  env.insert("VIRTUAL_ENV".to_string(), root(pkg));
  let install = BuildStep::sandboxed(pkg.join("bin/python"), &["-m", "pip", "install", "meson"]).with_env(env);
  Ok(vec![venv, install])
}

fn plan_bazel(pkg: &Package) -> Result<Vec<BuildStep>, BuildError> {
  let bazel = require(pkg, BAZEL_BINARY)?;
  let mut env = base_env(pkg);
  env.insert("HOME".to_string(), root(pkg));
  let bin_dir: PathBuf = pkg.join("bin");
  Ok(vec![
    BuildStep::sandboxed(bazel.join("bin/bazel"), &["build", "//src:bazel-dev"]).with_env(env.clone()),
    BuildStep::sandboxed("/bin/mkdir", &["-p"])
      .with_args([bin_dir.display().to_string()])
      .with_env(env.clone()),
    BuildStep::sandboxed("/bin/cp", &[])
      .with_args([
        pkg.join("bazel-bin/src/bazel-dev").display().to_string(),
        bin_dir.join("bazel").display().to_string(),
      ])
      .with_env(env),
  ])
}
