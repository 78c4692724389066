mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use revi_lib::config::{RuntimeConfig, parse_sandbox};
use tracing_subscriber::EnvFilter;

/// revi - bootstrap a toolchain into a content-addressed store
#[derive(Parser)]
#[command(name = "revi")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

/// Overrides for the `REVI_*` environment variables.
#[derive(Args, Debug, Default)]
struct GlobalArgs {
  /// Filesystem root under which the store lives
  #[arg(long, global = true)]
  chroot: Option<String>,

  /// Libc tag for every resolved package (e.g. gnu, musl)
  #[arg(long, global = true)]
  libc: Option<String>,

  /// Sandbox launcher, or "none" to run build commands directly
  #[arg(long, global = true)]
  sandbox: Option<String>,

  /// Maximum number of packages building at once
  #[arg(short, long, global = true)]
  jobs: Option<usize>,
}

impl GlobalArgs {
  fn apply(&self, config: &mut RuntimeConfig) {
    if let Some(chroot) = &self.chroot {
      config.chroot = chroot.clone();
    }
    if let Some(libc) = &self.libc {
      config.libc = Some(libc.clone()).filter(|l| !l.is_empty());
    }
    if let Some(sandbox) = &self.sandbox {
      config.sandbox = parse_sandbox(sandbox);
    }
    if let Some(jobs) = self.jobs.filter(|j| *j > 0) {
      config.jobs = jobs;
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve, unpack and build packages
  Up {
    /// Artifact URLs
    #[arg(required = true)]
    urls: Vec<String>,
  },

  /// Build packages into a scratch root and commit it to an OSTree repository
  #[command(name = "ostree-up")]
  OstreeUp {
    /// OSTree repository to commit into
    repo: PathBuf,

    /// Branch receiving the commit
    #[arg(long, default_value = "revi")]
    branch: String,

    /// Artifact URLs to build into the image
    urls: Vec<String>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  let mut config = RuntimeConfig::from_env();
  cli.global.apply(&mut config);

  match cli.command {
    Commands::Up { urls } => cmd::cmd_up(&urls, &config),
    Commands::OstreeUp { repo, branch, urls } => cmd::cmd_ostree_up(&repo, &branch, &urls, &config),
  }
}
