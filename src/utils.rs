use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::model::Error;

/// Tries every candidate in order and returns the first success.
///
/// When all candidates fail the last failure is returned, `None` when there was no candidate at all.
pub async fn first_success<I, F, Fut, T, E>(candidates: I, mut attempt: F) -> Result<T, Option<E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error = None;
    for candidate in candidates {
        match attempt(candidate).await {
            Ok(value) => return Ok(value),
            Err(error) => last_error = Some(error),
        }
    }
    Err(last_error)
}

/// Drops the in-flight future as soon as the token is cancelled
pub async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}
