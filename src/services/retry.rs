//! Exponential backoff for explorer requests and database queries.
//!
//! The sync pipeline runs sequentially, so a single failed page or timed out
//! query is retried in place instead of failing the whole run.

use std::future::Future;
use std::time::Duration;

/// Backoff parameters.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. The last error is returned.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    label,
                    attempt,
                    policy.max_attempts,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Whether a database error is worth retrying.
///
/// Covers pool acquire timeouts, dropped connections, serialization failures
/// (`40001`) and statement timeouts (`57014`).
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("57014"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(60), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<u32, &str> = retry(&instant_policy(5), "test", |_| true, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 3 { Err("transient") } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), &str> = retry(&instant_policy(4), "test", |_| true, || {
            calls.set(calls.get() + 1);
            async { Err("still down") }
        })
        .await;

        assert_eq!(result, Err("still down"));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), &str> =
            retry(&instant_policy(5), "test", |e: &&str| *e != "fatal", || {
                calls.set(calls.get() + 1);
                async { Err("fatal") }
            })
            .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn pool_timeout_is_transient() {
        assert!(is_transient_db_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient_db_error(&sqlx::Error::RowNotFound));
    }
}
