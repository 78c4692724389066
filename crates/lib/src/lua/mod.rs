//! Lua build recipes.
//!
//! A package root may carry a `revi.lua` recipe. It runs in a Lua 5.4
//! interpreter opened with only the deterministic standard libraries and a
//! single `revi` table:
//!
//! - `revi.out` - the package root
//! - `revi.url` - the package origin URL
//! - `revi.exec(dep_url, argv)` - run a program from a resolved dependency
//!   and return its stdout (see [`bridge`])
//!
//! # Submodules
//!
//! - [`bridge`] - the `revi.exec` capability and its package-backed implementation

pub mod bridge;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlua::prelude::*;
use thiserror::Error;
use tracing::info;

use crate::pkg::Package;

pub use bridge::{DepExec, PackageExec};

#[derive(Debug, Error)]
pub enum ScriptError {
  /// The recipe raised a Lua error.
  #[error("recipe failed: {0}")]
  Eval(String),

  #[error("{package} has no dependency {url}")]
  MissingDependency { package: String, url: String },

  /// A command started from a recipe could not run or exited non-zero.
  #[error("recipe command failed: {cmd}: {detail}")]
  Exec { cmd: String, detail: String },

  #[error("failed to read recipe {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl From<LuaError> for ScriptError {
  fn from(e: LuaError) -> Self {
    ScriptError::Eval(e.to_string())
  }
}

/// Create an interpreter with the `revi` table registered for `pkg`.
pub fn create_runtime(pkg: &Package, exec: Arc<dyn DepExec>) -> LuaResult<Lua> {
  let lua = Lua::new_with(
    LuaStdLib::TABLE | LuaStdLib::STRING | LuaStdLib::UTF8 | LuaStdLib::COROUTINE,
    LuaOptions::default(),
  )?;

  let revi = lua.create_table()?;
  revi.set("out", pkg.path().display().to_string())?;
  revi.set("url", pkg.url())?;
  bridge::register(&lua, &revi, exec)?;
  lua.globals().set("revi", revi)?;

  Ok(lua)
}

/// Evaluate the recipe at `path` for `pkg`. Blocking.
pub fn evaluate_recipe(path: &Path, pkg: &Package, exec: Arc<dyn DepExec>) -> Result<(), ScriptError> {
  let content = std::fs::read_to_string(path).map_err(|e| ScriptError::Read {
    path: path.to_path_buf(),
    source: e,
  })?;

  info!(url = %pkg.url(), recipe = ?path, "evaluating recipe");
  let lua = create_runtime(pkg, exec)?;
  lua.load(&content).set_name(format!("@{}", path.display())).exec()?;
  Ok(())
}
