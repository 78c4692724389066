//! Package resolution.
//!
//! Turns a URL into a fully populated package graph: downloads the artifact,
//! reads the optional `<url>.deps` manifest (or infers bootstrap dependencies
//! when there is none), and resolves every dependency concurrently.
//!
//! # Submodules
//!
//! - [`bootstrap`] - URL-keyed bootstrap dependency table

pub mod bootstrap;

use std::sync::Arc;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

use crate::consts::MANIFEST_SUFFIX;
use crate::pkg::{Package, PackageCfg};
use crate::util::task::{BoxFuture, join_ordered};

pub use bootstrap::{BootstrapRule, BootstrapTable, Inferred};

/// Errors that can occur while resolving a package graph.
#[derive(Debug, Error)]
pub enum FetchError {
  /// The HTTP request for an artifact failed.
  #[error("fetch failed for {url}: {source}")]
  Network {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The artifact request returned a non-success status.
  #[error("fetch failed for {url}: HTTP {status}")]
  Status { url: String, status: u16 },

  /// A manifest chain leads back to one of its own ancestors.
  #[error("dependency cycle: {}", chain.join(" -> "))]
  Cycle { chain: Vec<String> },

  /// A resolver task panicked.
  #[error("resolver task failed: {0}")]
  Task(#[from] JoinError),
}

/// Settings stamped onto every resolved package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
  pub chroot: String,
  pub libc: Option<String>,
}

pub struct Fetcher {
  client: reqwest::Client,
  bootstrap: BootstrapTable,
  options: ResolveOptions,
}

impl Fetcher {
  pub fn new(options: ResolveOptions) -> Arc<Self> {
    Self::with_bootstrap(options, BootstrapTable::default())
  }

  pub fn with_bootstrap(options: ResolveOptions, bootstrap: BootstrapTable) -> Arc<Self> {
    Arc::new(Self {
      client: reqwest::Client::new(),
      bootstrap,
      options,
    })
  }

  /// Resolve `url` and its whole dependency tree.
  pub fn fetch(self: &Arc<Self>, url: &str) -> BoxFuture<Result<Arc<Package>, FetchError>> {
    self.resolve(url.to_string(), Arc::new(Vec::new()))
  }

  fn resolve(self: &Arc<Self>, url: String, ancestors: Arc<Vec<String>>) -> BoxFuture<Result<Arc<Package>, FetchError>> {
    let this = Arc::clone(self);
    Box::pin(async move {
      if ancestors.contains(&url) {
        let mut chain = ancestors.as_ref().clone();
        chain.push(url);
        return Err(FetchError::Cycle { chain });
      }

      let inferred = match this.fetch_manifest(&url).await {
        Some(deps) if !deps.is_empty() => Inferred {
          deps,
          target_file: None,
        },
        _ => {
          let inferred = this.bootstrap.infer(&url);
          debug!(url = %url, deps = ?inferred.deps, "inferred bootstrap dependencies");
          inferred
        }
      };

      let tarball = this.download(&url).await?;

      let mut chain = ancestors.as_ref().clone();
      chain.push(url.clone());
      let chain = Arc::new(chain);

      let mut join_set = JoinSet::new();
      for (index, dep_url) in inferred.deps.into_iter().enumerate() {
        let resolving = this.resolve(dep_url, chain.clone());
        join_set.spawn(async move { (index, resolving.await) });
      }
      let deps = join_ordered(join_set).await?;

      let mut pkg = Package::new(url, tarball).with_deps(deps).with_cfg(PackageCfg {
        libc: this.options.libc.clone(),
        chroot: this.options.chroot.clone(),
        ..Default::default()
      });
      if let Some(target_file) = inferred.target_file {
        pkg = pkg.with_target_file(target_file);
      }

      info!(url = %pkg.url(), hash = %pkg.hash(), deps = pkg.deps().len(), "resolved package");
      Ok(Arc::new(pkg))
    })
  }

  async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    info!(url = %url, "fetching artifact");

    let response = self.client.get(url).send().await.map_err(|e| FetchError::Network {
      url: url.to_string(),
      source: e,
    })?;

    if !response.status().is_success() {
      return Err(FetchError::Status {
        url: url.to_string(),
        status: response.status().as_u16(),
      });
    }

    let bytes = response.bytes().await.map_err(|e| FetchError::Network {
      url: url.to_string(),
      source: e,
    })?;

    debug!(url = %url, size = bytes.len(), "download complete");
    Ok(bytes.to_vec())
  }

  /// Best-effort fetch of `<url>.deps`. Any failure means "no manifest".
  async fn fetch_manifest(&self, url: &str) -> Option<Vec<String>> {
    let manifest_url = format!("{}{}", url, MANIFEST_SUFFIX);

    let response = match self.client.get(&manifest_url).send().await {
      Ok(response) => response,
      Err(e) => {
        debug!(url = %manifest_url, error = %e, "no manifest");
        return None;
      }
    };

    if !response.status().is_success() {
      debug!(url = %manifest_url, status = %response.status(), "no manifest");
      return None;
    }

    match response.text().await {
      Ok(text) => Some(parse_manifest(&text)),
      Err(e) => {
        debug!(url = %manifest_url, error = %e, "unreadable manifest");
        None
      }
    }
  }
}

/// Parse a newline-separated list of dependency URLs.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_manifest(text: &str) -> Vec<String> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(str::to_string)
    .collect()
}
