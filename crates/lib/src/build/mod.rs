//! Building packages.
//!
//! [`Builder::build`] walks the graph bottom-up like the unpacker: every
//! dependency in [`Package::all_deps`] is built concurrently, then the package
//! itself is dispatched through the [`BuildScheduler`], so a given content
//! hash is built at most once per process even when distinct branches of the
//! graph contain it.
//!
//! Dispatch picks the first applicable of:
//!
//! 1. an executable `.re.vi` hook in the package root, run in the sandbox
//!    with the root and dependency roots as arguments
//! 2. a `revi.lua` recipe (see [`crate::lua`])
//! 3. the built-in [`AdapterTable`]
//!
//! A successful dispatch leaves a `revi.built` stamp so later runs skip the
//! package.
//!
//! # Submodules
//!
//! - [`adapters`] - built-in per-ecosystem strategies
//! - [`sandbox`] - sandbox launcher command lines
//! - [`scheduler`] - hash-keyed single-flight execution
//! - [`step`] - running one planned command

pub mod adapters;
pub mod sandbox;
pub mod scheduler;
pub mod step;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::consts::{BUILT_STAMP, HOOK_FILE, MULTICALL_BINARY, RECIPE_FILE};
use crate::lua::{PackageExec, ScriptError, evaluate_recipe};
use crate::pkg::Package;
use crate::util::task::{BoxFuture, join_ordered};

pub use adapters::{AdapterRule, AdapterTable, Strategy};
pub use sandbox::Sandbox;
pub use scheduler::BuildScheduler;
pub use step::BuildStep;

/// Errors that can occur while building a package.
#[derive(Debug, Error)]
pub enum BuildError {
  /// An adapter needs a dependency the package graph does not provide.
  #[error("{package} requires {url}{} but it is not among its dependencies", .libc.as_deref().map(|l| format!(" ({l})")).unwrap_or_default())]
  MissingDependency {
    package: String,
    url: String,
    libc: Option<String>,
  },

  #[error("failed to start {cmd}: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}")]
  CommandFailed { cmd: String, code: Option<i32> },

  #[error("filesystem error at {path}: {source}")]
  Filesystem {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Script(#[from] ScriptError),

  /// Outcome of a build driven by another caller for the same hash.
  #[error(transparent)]
  Shared(Arc<BuildError>),

  #[error("build scheduler closed")]
  Closed,

  #[error("build task failed: {0}")]
  Task(#[from] JoinError),
}

fn fs_error(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
  move |source| BuildError::Filesystem {
    path: path.to_path_buf(),
    source,
  }
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
  pub sandbox: Sandbox,
  /// Maximum number of concurrent dispatches.
  pub parallelism: usize,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      sandbox: Sandbox::default(),
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
    }
  }
}

pub struct Builder {
  config: BuildConfig,
  adapters: AdapterTable,
  scheduler: BuildScheduler,
  semaphore: Semaphore,
}

impl Builder {
  pub fn new(config: BuildConfig) -> Arc<Self> {
    Self::with_adapters(config, AdapterTable::default())
  }

  pub fn with_adapters(config: BuildConfig, adapters: AdapterTable) -> Arc<Self> {
    let permits = config.parallelism.max(1);
    Arc::new(Self {
      config,
      adapters,
      scheduler: BuildScheduler::new(),
      semaphore: Semaphore::new(permits),
    })
  }

  /// Build `pkg` after everything it depends on.
  pub fn build(self: &Arc<Self>, pkg: Arc<Package>) -> BoxFuture<Result<(), BuildError>> {
    let this = Arc::clone(self);
    Box::pin(async move {
      let mut join_set = JoinSet::new();
      for (index, dep) in pkg.all_deps().cloned().enumerate() {
        let building = this.build(dep);
        join_set.spawn(async move { (index, building.await) });
      }
      join_ordered(join_set).await?;

      let hash = pkg.hash();
      this.scheduler.run_once(&hash, || this.dispatch(&pkg)).await
    })
  }

  async fn dispatch(&self, pkg: &Arc<Package>) -> Result<(), BuildError> {
    let stamp = pkg.join(BUILT_STAMP);
    if exists(&stamp)? {
      debug!(url = %pkg.url(), "already built");
      return Ok(());
    }

    let _permit = self.semaphore.acquire().await.map_err(|_| BuildError::Closed)?;
    info!(url = %pkg.url(), hash = %pkg.hash(), "building");

    let root = pkg.path();
    let binds: Vec<PathBuf> = pkg.all_deps().map(|d| d.path()).collect();

    let hook = pkg.join(HOOK_FILE);
    let recipe = pkg.join(RECIPE_FILE);
    if exists(&hook)? {
      self.run_hook(pkg, &hook, &root, &binds).await?;
    } else if exists(&recipe)? {
      self.run_recipe(pkg, recipe).await?;
    } else {
      self.run_adapter(pkg, &root, &binds).await?;
    }

    tokio::fs::write(&stamp, pkg.hash().as_str())
      .await
      .map_err(fs_error(&stamp))?;
    info!(url = %pkg.url(), "built");
    Ok(())
  }

  async fn run_hook(&self, pkg: &Package, hook: &Path, root: &Path, binds: &[PathBuf]) -> Result<(), BuildError> {
    debug!(url = %pkg.url(), hook = ?hook, "running build hook");
    let step = BuildStep::sandboxed(hook, &[])
      .with_args(std::iter::once(root).chain(binds.iter().map(PathBuf::as_path)).map(|p| p.display().to_string()))
      .with_env(adapters::base_env(pkg));
    step::run(&step, &self.config.sandbox, root, binds).await?;
    Ok(())
  }

  async fn run_recipe(&self, pkg: &Arc<Package>, recipe: PathBuf) -> Result<(), BuildError> {
    let exec = Arc::new(PackageExec::new(pkg.clone(), self.config.sandbox.clone()));
    let pkg = pkg.clone();
    tokio::task::spawn_blocking(move || evaluate_recipe(&recipe, &pkg, exec)).await??;
    Ok(())
  }

  async fn run_adapter(&self, pkg: &Package, root: &Path, binds: &[PathBuf]) -> Result<(), BuildError> {
    let Some(rule) = self.adapters.select(pkg) else {
      debug!(url = %pkg.url(), "no adapter, nothing to build");
      return Ok(());
    };
    debug!(url = %pkg.url(), adapter = rule.name, "selected adapter");

    match &rule.strategy {
      Strategy::Steps(plan) => {
        let steps = plan(pkg)?;
        for step in &steps {
          step::run(step, &self.config.sandbox, root, binds).await?;
        }
        Ok(())
      }
      Strategy::LinkApplets => self.link_applets(pkg, root, binds).await,
      Strategy::Prebuilt => Ok(()),
    }
  }

  /// Symlink every applet of the package's multi-call binary into
  /// `<chroot>/bin`, replacing whatever was there.
  async fn link_applets(&self, pkg: &Package, root: &Path, binds: &[PathBuf]) -> Result<(), BuildError> {
    let binary = pkg.join(MULTICALL_BINARY);
    let listing = step::run(&BuildStep::host(&binary, &[]), &self.config.sandbox, root, binds).await?;

    let bin_dir = PathBuf::from(format!("{}/bin", pkg.cfg().chroot));
    tokio::fs::create_dir_all(&bin_dir).await.map_err(fs_error(&bin_dir))?;

    let mut linked = 0usize;
    for applet in applets(&listing) {
      let link = bin_dir.join(applet);
      match tokio::fs::remove_file(&link).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(link = ?link, error = %e, "could not remove existing applet"),
      }
      symlink(&binary, &link).await.map_err(fs_error(&link))?;
      linked += 1;
    }

    info!(url = %pkg.url(), applets = linked, dir = ?bin_dir, "linked applets");
    Ok(())
  }
}

/// Applet names from a multi-call binary's comma-separated listing.
fn applets(listing: &str) -> impl Iterator<Item = &str> {
  listing
    .split(',')
    .map(str::trim)
    .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains(char::is_whitespace))
}

#[cfg(unix)]
async fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
  tokio::fs::symlink(original, link).await
}

#[cfg(not(unix))]
async fn symlink(_original: &Path, _link: &Path) -> std::io::Result<()> {
  Err(std::io::Error::new(
    std::io::ErrorKind::Unsupported,
    "applet links require symlinks",
  ))
}

fn exists(path: &Path) -> Result<bool, BuildError> {
  match std::fs::symlink_metadata(path) {
    Ok(_) => Ok(true),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(fs_error(path)(e)),
  }
}
