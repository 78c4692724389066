//! Running a single build command.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::BuildError;
use super::sandbox::Sandbox;
use crate::pkg::EnvMap;

/// One command of an adapter plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub env: EnvMap,
  /// Run through the sandbox launcher. Only probes that merely read a
  /// package's own output run on the host.
  pub sandboxed: bool,
}

impl BuildStep {
  pub fn sandboxed(program: impl Into<PathBuf>, args: &[&str]) -> Self {
    Self {
      program: program.into(),
      args: args.iter().map(|a| a.to_string()).collect(),
      env: EnvMap::new(),
      sandboxed: true,
    }
  }

  pub fn host(program: impl Into<PathBuf>, args: &[&str]) -> Self {
    Self {
      sandboxed: false,
      ..Self::sandboxed(program, args)
    }
  }

  pub fn with_env(mut self, env: EnvMap) -> Self {
    self.env = env;
    self
  }

  pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
    self.args.extend(args);
    self
  }

  /// Command line for logs and error messages.
  pub fn display(&self) -> String {
    std::iter::once(self.program.display().to_string())
      .chain(self.args.iter().cloned())
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Run `step` in `root` with `binds` writable, returning its stdout.
///
/// The environment is cleared and replaced by the step's own.
pub async fn run(step: &BuildStep, sandbox: &Sandbox, root: &Path, binds: &[PathBuf]) -> Result<String, BuildError> {
  let cmd = step.display();
  info!(cmd = %cmd, sandboxed = step.sandboxed && sandbox.is_enabled(), "running build step");

  let mut command = if step.sandboxed {
    sandbox.command(root, binds, &step.program, &step.args)
  } else {
    Sandbox::disabled().command(root, binds, &step.program, &step.args)
  };
  command.env_clear().envs(&step.env);

  let output = command.output().await.map_err(|e| BuildError::Spawn {
    cmd: cmd.clone(),
    source: e,
  })?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }

    return Err(BuildError::CommandFailed {
      cmd,
      code: output.status.code(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
