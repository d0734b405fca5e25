//! Database lock retry
//!
//! Concurrent import workers write entries through one SQLite file. A write
//! that collides with another gets "database is locked"; it is retried with
//! doubling backoff until the wait budget is spent. Other errors are returned
//! as they are.

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Default total retry budget for a single write
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` has elapsed
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let budget = Duration::from_millis(max_wait_ms);
    let started = Instant::now();
    let mut backoff = INITIAL_BACKOFF;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::debug!(label, attempts, "Write went through after lock contention");
                }
                return Ok(value);
            }
            Err(err) if is_lock_error(&err) => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= budget {
            tracing::error!(label, attempts, waited_ms = waited.as_millis() as u64, error = %err, "Giving up on locked database");
            return Err(Error::Internal(format!(
                "{}: database still locked after {} attempts over {} ms",
                label,
                attempts,
                waited.as_millis()
            )));
        }

        tracing::warn!(label, attempts, backoff_ms = backoff.as_millis() as u64, "Database locked, backing off");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn is_lock_error(err: &Error) -> bool {
    let Error::Database(db_err) = err else {
        return false;
    };
    let message = db_err.to_string();
    message.contains("database is locked") || message.contains("database table is locked")
}
