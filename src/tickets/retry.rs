//! Bounded retry for operations that run against a borrowed context.
//!
//! Unlike a backoff loop, nothing sleeps between attempts: the caller
//! classifies each error as retryable or fatal, and a retryable error simply
//! triggers another attempt until the bound is reached.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Boxed future borrowing the retry context for one attempt.
pub type AttemptFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; holds the last one.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the predicate refused to retry.
    #[error("{0}")]
    Fatal(E),
}

/// Runs `attempt` against `ctx` up to `max_attempts` times.
///
/// `attempt` receives the context and the 1-based attempt number. Errors for
/// which `is_retryable` returns true trigger another attempt; any other error
/// is returned at once as [`RetryError::Fatal`]. A `max_attempts` of zero is
/// treated as one.
pub async fn retry_if<C, T, E, P, F>(
    max_attempts: u32,
    ctx: &mut C,
    is_retryable: P,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    C: ?Sized + Send,
    P: Fn(&E) -> bool,
    F: for<'c> FnMut(&'c mut C, u32) -> AttemptFuture<'c, T, E>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;

    loop {
        match attempt(&mut *ctx, n).await {
            Ok(value) => {
                if n > 1 {
                    tracing::debug!(attempt = n, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
            Err(err) if n >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: n,
                    last: err,
                });
            }
            Err(err) => {
                tracing::warn!(attempt = n, max_attempts, error = %err, "Retrying operation");
                n += 1;
            }
        }
    }
}
