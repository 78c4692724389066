//! Implementation of the `revi up` command.
//!
//! Resolves each URL into a package graph, unpacks it into the store and
//! builds it, printing the store path of every requested package.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use revi_lib::build::Builder;
use revi_lib::config::RuntimeConfig;
use revi_lib::fetch::Fetcher;
use revi_lib::pkg::Package;
use revi_lib::unpack::Unpacker;

/// Fetch, unpack and build stages sharing one store configuration.
///
/// The builder is shared between URLs, so a package reached from several
/// URLs is built once.
pub struct Pipeline {
  fetcher: Arc<Fetcher>,
  unpacker: Arc<Unpacker>,
  builder: Arc<Builder>,
}

impl Pipeline {
  pub fn new(config: &RuntimeConfig) -> Self {
    Self {
      fetcher: Fetcher::new(config.resolve_options()),
      unpacker: Unpacker::new(config.unpack_config()),
      builder: Builder::new(config.build_config()),
    }
  }

  pub async fn realize(&self, url: &str) -> Result<Arc<Package>> {
    let pkg = self
      .fetcher
      .fetch(url)
      .await
      .with_context(|| format!("Failed to resolve {}", url))?;
    self
      .unpacker
      .unpack(pkg.clone())
      .await
      .with_context(|| format!("Failed to unpack {}", url))?;
    self
      .builder
      .build(pkg.clone())
      .await
      .with_context(|| format!("Failed to build {}", url))?;

    info!(url = %url, hash = %pkg.hash(), path = ?pkg.path(), "package ready");
    Ok(pkg)
  }
}

/// Execute the up command.
pub fn cmd_up(urls: &[String], config: &RuntimeConfig) -> Result<()> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let pipeline = Pipeline::new(config);

  rt.block_on(async {
    for url in urls {
      let pkg = pipeline.realize(url).await?;
      println!("{}", pkg.path().display());
    }
    Ok(())
  })
}
