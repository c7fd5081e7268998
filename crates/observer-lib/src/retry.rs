//! Retry policy for platform calls
//!
//! Each [`PlatformErrorKind`] maps to a [`Disposition`]: retry with
//! exponential backoff, fail immediately, or treat the error as success
//! (for example a report superseded by a newer one).

use crate::error::{ObserverError, ObserverResult, PlatformErrorKind};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What to do with an error of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    Fatal,
    SuccessEquivalent,
}

/// Result of a call run under a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Completed(T),
    /// The call failed with an error the policy counts as success
    SuccessEquivalent,
}

impl<T> RetryOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            RetryOutcome::Completed(value) => Some(value),
            RetryOutcome::SuccessEquivalent => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Overall deadline across all attempts
    pub timeout: Duration,
    pub table: HashMap<PlatformErrorKind, Disposition>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let table = HashMap::from([
            (PlatformErrorKind::Timeout, Disposition::Retry),
            (PlatformErrorKind::Unavailable, Disposition::Retry),
            (PlatformErrorKind::Busy, Disposition::Retry),
            (PlatformErrorKind::StaleReport, Disposition::SuccessEquivalent),
        ]);

        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            table,
        }
    }
}

impl RetryPolicy {
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_disposition(mut self, kind: PlatformErrorKind, disposition: Disposition) -> Self {
        self.table.insert(kind, disposition);
        self
    }

    /// Disposition of an error; kinds missing from the table are fatal
    pub fn disposition(&self, error: &ObserverError) -> Disposition {
        self.table
            .get(&error.platform_kind())
            .copied()
            .unwrap_or(Disposition::Fatal)
    }

    /// Run `op` until it succeeds, fails fatally, the deadline passes or
    /// `cancel` fires
    pub async fn execute<T, F, Fut>(
        &self,
        mut op: F,
        cancel: &CancellationToken,
    ) -> ObserverResult<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ObserverResult<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = self.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ObserverError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ObserverError::Cancelled),
                result = tokio::time::timeout_at(deadline, op()) => match result {
                    Ok(result) => result,
                    Err(_) => return Err(ObserverError::Timeout(self.timeout)),
                },
            };

            let error = match result {
                Ok(value) => return Ok(RetryOutcome::Completed(value)),
                Err(ObserverError::Cancelled) => return Err(ObserverError::Cancelled),
                Err(error) => error,
            };

            match self.disposition(&error) {
                Disposition::SuccessEquivalent => {
                    debug!(attempt, error = %error, "Error treated as success");
                    return Ok(RetryOutcome::SuccessEquivalent);
                }
                Disposition::Fatal => return Err(error),
                Disposition::Retry => {}
            }

            if Instant::now() + backoff >= deadline {
                debug!(attempt, error = %error, "Retry deadline reached");
                return Err(ObserverError::Timeout(self.timeout));
            }

            debug!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Retrying after transient error"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ObserverError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }

            backoff = std::cmp::min(backoff * 2, self.max_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_backoff(Duration::from_millis(2), Duration::from_millis(8))
            .with_timeout(Duration::from_secs(5))
    }

    fn platform(kind: PlatformErrorKind) -> ObserverError {
        ObserverError::platform(kind, "test")
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let result = fast_policy()
            .execute(|| async { Ok::<_, ObserverError>(7) }, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, RetryOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let attempts = AtomicUsize::new(0);
        let result = fast_policy()
            .execute(
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(platform(PlatformErrorKind::Busy))
                        } else {
                            Ok("done")
                        }
                    }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result, RetryOutcome::Completed("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let attempts = AtomicUsize::new(0);
        let err = fast_policy()
            .execute(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(platform(PlatformErrorKind::Unauthorized)) }
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.platform_kind(), PlatformErrorKind::Unauthorized);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_report_is_success_equivalent() {
        let result = fast_policy()
            .execute(
                || async { Err::<(), _>(platform(PlatformErrorKind::StaleReport)) },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result, RetryOutcome::SuccessEquivalent);
    }

    #[tokio::test]
    async fn test_deadline_returns_timeout() {
        let policy = fast_policy().with_timeout(Duration::from_millis(30));
        let err = policy
            .execute(
                || async { Err::<(), _>(platform(PlatformErrorKind::Unavailable)) },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ObserverError::Timeout(Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fast_policy()
            .execute(|| async { Ok::<_, ObserverError>(()) }, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ObserverError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_secs(60), Duration::from_secs(60))
            .with_timeout(Duration::from_secs(600));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = policy
            .execute(
                || async { Err::<(), _>(platform(PlatformErrorKind::Timeout)) },
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err, ObserverError::Cancelled);
    }

    #[test]
    fn test_custom_disposition() {
        let policy = RetryPolicy::default()
            .with_disposition(PlatformErrorKind::NotFound, Disposition::SuccessEquivalent);
        assert_eq!(
            policy.disposition(&platform(PlatformErrorKind::NotFound)),
            Disposition::SuccessEquivalent
        );
        assert_eq!(
            policy.disposition(&ObserverError::InvalidArgument("x".into())),
            Disposition::Fatal
        );
    }
}
