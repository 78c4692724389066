//! Implementation of the `revi ostree-up` command.
//!
//! Builds the OSTree tool, then runs a nested `revi up` inside the sandbox
//! launcher with a scratch directory bound over `/re/vi`, and finally commits
//! the scratch root to the repository.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::{info, warn};

use revi_lib::config::RuntimeConfig;
use revi_lib::consts::{OSTREE, STORE_SUBDIR};

use super::up::Pipeline;

/// Execute the ostree-up command.
pub fn cmd_ostree_up(repo: &Path, branch: &str, urls: &[String], config: &RuntimeConfig) -> Result<()> {
  let launcher = config
    .sandbox
    .clone()
    .context("ostree-up stages the image inside the sandbox launcher; it cannot run with sandboxing disabled")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    let ostree = Pipeline::new(config).realize(OSTREE).await?;

    std::fs::create_dir_all(&config.tmp_dir)
      .with_context(|| format!("Failed to create {}", config.tmp_dir.display()))?;
    let scratch = tempfile::Builder::new()
      .prefix("ostree-")
      .tempdir_in(&config.tmp_dir)
      .context("Failed to create scratch root")?;
    let scratch_store = scratch.path().join(STORE_SUBDIR);
    std::fs::create_dir_all(&scratch_store)
      .with_context(|| format!("Failed to create {}", scratch_store.display()))?;

    if urls.is_empty() {
      warn!("no URLs given, committing an empty image");
    } else {
      let exe = std::env::current_exe().context("Failed to locate the revi executable")?;
      let mut nested = Command::new(&launcher);
      nested
        .args(["--bind", "/", "/", "--bind"])
        .arg(&scratch_store)
        .arg(format!("/{}", STORE_SUBDIR))
        .arg(exe)
        .arg("up")
        .arg("--chroot=")
        .arg(format!("--jobs={}", config.jobs));
      if let Some(libc) = &config.libc {
        nested.arg(format!("--libc={}", libc));
      }
      nested.args(urls);

      info!(scratch = ?scratch.path(), "building image");
      let status = nested.status().await.context("Failed to start nested build")?;
      if !status.success() {
        bail!("Nested build failed with {}", status);
      }
    }

    info!(repo = ?repo, branch = %branch, "committing image");
    let status = Command::new(ostree.join("bin/ostree"))
      .arg("--repo")
      .arg(repo)
      .arg("commit")
      .arg(format!("--branch={}", branch))
      .arg(scratch.path())
      .status()
      .await
      .context("Failed to start ostree")?;
    if !status.success() {
      bail!("ostree commit failed with {}", status);
    }

    Ok(())
  })
}
