//! Bounded, cancellation-aware retry
//!
//! Wraps a fallible async operation with a fixed delay schedule. The
//! operation runs once immediately; on failure it is retried after each
//! configured delay. Cancellation aborts the schedule between attempts.
//! Response decoding belongs inside the wrapped closure so malformed
//! bodies are retried like transport failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

/// Shared retry schedule handed to every adapter.
///
/// The number of delays is the number of retries; an empty schedule means
/// a single attempt.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    delays: Arc<[Duration]>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays: delays.into(),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Execute `op` with the given retry schedule.
///
/// All errors are retried alike; the schedule does not distinguish
/// retryable from permanent failures. When every attempt fails the last
/// error is returned wrapped in [`ProviderError::RetriesExhausted`].
pub async fn retry<T, F, Fut>(
    cancel: &CancellationToken,
    schedule: &RetrySchedule,
    operation_name: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut last_error = match op().await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for (attempt, delay) in schedule.delays().iter().enumerate() {
        debug!(
            operation = operation_name,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %last_error,
            "attempt failed, retrying after delay"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(*delay) => {}
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e,
        }
    }

    Err(ProviderError::RetriesExhausted(Box::new(last_error)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn short_schedule() -> RetrySchedule {
        RetrySchedule::new(vec![
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
        ])
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry(&cancel, &short_schedule(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(7) }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = retry(&cancel, &short_schedule(), "test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ProviderError::status("ByteMe", 500, "flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_the_last_error() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let err = retry(&cancel, &short_schedule(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::status("PingPerfect", 500, "down")) }
        })
        .await
        .unwrap_err();

        // one initial attempt plus three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(err.to_string().contains("all retries failed"));
    }

    #[tokio::test]
    async fn cancellation_aborts_between_attempts() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = retry(&cancel, &short_schedule(), "test", || async {
            Err::<(), _>(ProviderError::status("WebWunder", 500, "down"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ProviderError::Cancelled));
    }
}
