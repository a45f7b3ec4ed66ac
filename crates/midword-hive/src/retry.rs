use midword_core::error::MwResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Runs `op` up to `attempts` times, doubling the delay after each transient
/// failure (with up to 50% jitter). Other errors are returned immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    attempts: usize,
    base_delay: Duration,
    mut op: F,
) -> MwResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = MwResult<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut i = 1;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && i < attempts => {
                let jitter = delay.mul_f64(fastrand::f64() * 0.5);
                warn!(
                    "⚠️  {} attempt {}/{} failed: {}. Retrying in {:?}...",
                    label,
                    i,
                    attempts,
                    e,
                    delay + jitter
                );
                sleep(delay + jitter).await;
                delay = delay.saturating_mul(2);
                i += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midword_core::error::MidwordError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out = retry_with_backoff("flaky", 3, Duration::from_millis(1), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(MidwordError::Transient("down".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_last_attempt() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out: MwResult<()> = retry_with_backoff("dead", 2, Duration::from_millis(1), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MidwordError::Transient("down".into()))
        })
        .await;
        assert!(out.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_integrity_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out: MwResult<()> = retry_with_backoff("broken", 5, Duration::from_millis(1), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MidwordError::Integrity("missing".into()))
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
