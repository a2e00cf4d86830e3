use std::future::Future;
use std::time::Duration;

use corpusdb_core::config::ResilienceSettings;
use corpusdb_core::{Error, Stage};

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Per-call timeout plus bounded exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn for_embedding(settings: &ResilienceSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.embed_timeout_ms),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }

    pub fn for_index(settings: &ResilienceSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.index_timeout_ms),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        }
    }

    /// Sleep before retry number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `f` until it succeeds within the timeout, at most
    /// `max_retries + 1` times. Exhaustion becomes [`Error::TransientIndex`].
    pub async fn run<T, F, Fut>(&self, stage: Stage, mut f: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut message = String::new();
        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(self.timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => message = format!("{e:#}"),
                Err(_) => message = format!("timed out after {} ms", self.timeout.as_millis()),
            }
            if attempt < self.max_retries {
                let delay = self.delay(attempt);
                tracing::warn!(%stage, attempt = attempt + 1, max_retries = self.max_retries, delay_ms = delay.as_millis() as u64, error = %message, "retrying");
                tokio::time::sleep(delay).await;
            }
        }
        Err(Error::TransientIndex { stage, attempts: self.max_retries + 1, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy { timeout: Duration::from_millis(50), max_retries, backoff: Duration::from_millis(1) }
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let p = RetryPolicy { timeout: Duration::from_secs(1), max_retries: 3, backoff: Duration::from_millis(100) };
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = policy(3)
            .run(Stage::VectorWrite, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("flaky")
                    }
                    Ok(n)
                }
            })
            .await
            .expect("eventually succeeds");
        assert_eq!(out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let err = policy(2)
            .run(Stage::KeywordWrite, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::anyhow!("down")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, Error::TransientIndex { stage: Stage::KeywordWrite, attempts: 3, .. }));
    }

    #[tokio::test]
    async fn timeouts_count_as_failures() {
        let err = policy(0)
            .run(Stage::Embed, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
