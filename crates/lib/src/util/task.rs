//! Fan-out/fan-in helpers shared by the resolver, unpacker and builder.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinSet};
use tracing::error;

/// A boxed, sendable future. Recursive graph traversals return this type.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Drain every task in `set` and collect their results.
///
/// Each task yields its spawn index alongside its result so values come
/// back in spawn order regardless of completion order. Every task is awaited
/// even after a failure is known. On failure the error of the lowest spawn
/// index is returned; a panicked task ranks after every reported error.
pub async fn join_ordered<T, E>(mut set: JoinSet<(usize, Result<T, E>)>) -> Result<Vec<T>, E>
where
  T: Send + 'static,
  E: From<JoinError> + Send + 'static,
{
  let mut values: Vec<(usize, T)> = Vec::with_capacity(set.len());
  let mut first_error: Option<(usize, E)> = None;

  while let Some(joined) = set.join_next().await {
    let (index, e) = match joined {
      Ok((index, Ok(value))) => {
        values.push((index, value));
        continue;
      }
      Ok((index, Err(e))) => (index, e),
      Err(e) => {
        error!(error = %e, "task panicked");
        (usize::MAX, E::from(e))
      }
    };
    if first_error.as_ref().is_none_or(|(seen, _)| index < *seen) {
      first_error = Some((index, e));
    }
  }

  if let Some((_, e)) = first_error {
    return Err(e);
  }

  values.sort_by_key(|(index, _)| *index);
  Ok(values.into_iter().map(|(_, value)| value).collect())
}
