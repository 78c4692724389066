//! Single-flight build scheduling keyed by content hash.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::debug;

use super::BuildError;
use crate::util::hash::ObjectHash;

type Outcome = Result<(), Arc<BuildError>>;

/// Runs the build of each content hash at most once per process.
///
/// The first caller for a hash drives the build; concurrent and later
/// callers for the same hash await the same cell and observe the recorded
/// outcome. Waiters are parked on the cell, they never poll.
#[derive(Debug, Default)]
pub struct BuildScheduler {
  builds: Mutex<HashMap<ObjectHash, Arc<OnceCell<Outcome>>>>,
}

impl BuildScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn run_once<F, Fut>(&self, hash: &ObjectHash, build: F) -> Result<(), BuildError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), BuildError>>,
  {
    let cell = {
      let mut builds = self.builds.lock().unwrap_or_else(PoisonError::into_inner);
      builds.entry(hash.clone()).or_default().clone()
    };

    if cell.initialized() {
      debug!(hash = %hash, "build already settled");
    }

    let outcome = cell.get_or_init(|| async { build().await.map_err(Arc::new) }).await;
    outcome.clone().map_err(BuildError::Shared)
  }
}
