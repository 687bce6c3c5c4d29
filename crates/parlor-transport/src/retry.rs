// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic bounded-attempt retry combinator for transient network failures.
//!
//! The combinator knows nothing about which operations are safe to retry;
//! that decision belongs to the caller. It is used only around idempotent
//! calls (channel-configuration fetch, visitor upsert), never around
//! message sends.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use parlor_core::ParlorError;

/// Invokes `op` up to `attempts` times, retrying immediately on failure and
/// surfacing the last failure once attempts are exhausted.
///
/// `attempts` is clamped to at least one invocation.
pub async fn retry<T, F, Fut>(attempts: u32, op: F) -> Result<T, ParlorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ParlorError>>,
{
    retry_with_backoff(attempts, |_| Duration::ZERO, op).await
}

/// Like [`retry`], with an injected per-attempt delay. `delay(n)` is awaited
/// before retry attempt `n` (the first attempt is never delayed).
pub async fn retry_with_backoff<T, F, Fut, D>(
    attempts: u32,
    delay: D,
    mut op: F,
) -> Result<T, ParlorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ParlorError>>,
    D: Fn(u32) -> Duration,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let pause = delay(attempt);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt = attempt + 1, attempts, error = %e, "attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ParlorError::Internal("retry with zero attempts".into())))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ParlorError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ParlorError::Internal("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_failure_when_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(2, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(ParlorError::Internal(format!("failure {n}"))) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("failure 1"), "got: {err}");
    }

    #[tokio::test]
    async fn zero_attempts_still_invokes_once() {
        let calls = AtomicU32::new(0);
        let result = retry(0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ParlorError>(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
