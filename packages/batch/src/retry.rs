//! Wholesale retry of store operations.
//!
//! Every store write replaces its whole key set, so a failed unit is
//! retried by running the same operation again from the start.

use std::future::Future;

use jscore_database::DbError;

use crate::BatchOptions;

/// The result of an operation and the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Attempts made, the successful one included.
    pub attempts: u32,
    /// Result of the last attempt.
    pub result: Result<T, DbError>,
}

/// Runs `op` until it succeeds or `options.max_attempts` is reached,
/// sleeping with exponential backoff between attempts.
pub async fn with_retry<T, F, Fut>(options: &BatchOptions, what: &str, mut op: F) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{what} succeeded on attempt {attempt}/{max_attempts}");
                }
                return Attempted {
                    attempts: attempt,
                    result: Ok(value),
                };
            }
            Err(e) if attempt >= max_attempts => {
                log::error!("{what} failed after {attempt} attempts: {e}");
                return Attempted {
                    attempts: attempt,
                    result: Err(e),
                };
            }
            Err(e) => {
                let delay = options.backoff(attempt);
                log::warn!("{what} failed (attempt {attempt}/{max_attempts}), retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
