//! Polling loop shared by every status wait.

use crate::errors::{Result, SdkError};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_MS: u64 = 3_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub poll_ms: u64,
    pub timeout_ms: u64,
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_POLL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cancel: None,
        }
    }
}

impl WaitOptions {
    pub fn new(poll_ms: u64, timeout_ms: u64) -> Self {
        Self {
            poll_ms,
            timeout_ms,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// `[wait]` section of the config file.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    pub poll_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl From<&WaitConfig> for WaitOptions {
    fn from(config: &WaitConfig) -> Self {
        WaitOptions::new(
            config.poll_ms.unwrap_or(DEFAULT_POLL_MS),
            config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        )
    }
}

/// Run `check` until it yields a value, the deadline passes or the token is
/// cancelled. Cancellation is checked first on every iteration, then the
/// deadline, then the check runs. Check errors end the wait.
pub async fn poll_until<T, F, Fut>(what: &str, options: &WaitOptions, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let poll = Duration::from_millis(options.poll_ms.max(1));
    let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
    let mut attempts = 0u64;
    loop {
        if options
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(SdkError::cancelled(format!("wait for {what} cancelled"))
                .with_operation("wait")
                .with_context("attempts", attempts));
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(SdkError::timeout(format!(
                "timed out after {}ms waiting for {what}",
                options.timeout_ms
            ))
            .with_operation("wait")
            .with_context("attempts", attempts));
        }

        attempts += 1;
        if let Some(value) = check().await? {
            return Ok(value);
        }
        tracing::debug!(what, attempts, "not ready yet");

        let remaining = deadline.saturating_duration_since(Instant::now());
        let nap = poll.min(remaining);
        match &options.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(nap) => {}
                }
            }
            None => tokio::time::sleep(nap).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn times_out_instead_of_hanging() {
        let options = WaitOptions::new(20, 100);
        let started = std::time::Instant::now();
        let err = poll_until::<(), _, _>("never", &options, || async { Ok(None) })
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn returns_once_check_is_ready() {
        let calls = AtomicU32::new(0);
        let options = WaitOptions::new(1, 5_000);
        let value = poll_until("third try", &options, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n >= 2).then_some(n)) }
        })
        .await
        .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn cancellation_is_checked_first() {
        let token = CancellationToken::new();
        token.cancel();
        let options = WaitOptions::new(10, 10_000).with_cancel(token);
        let calls = AtomicU32::new(0);
        let err = poll_until::<(), _, _>("cancelled", &options, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap_err();
        assert!(err.is(ErrorKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let options = WaitOptions::new(60_000, 120_000).with_cancel(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let started = std::time::Instant::now();
        let err = poll_until::<(), _, _>("slow", &options, || async { Ok(None) })
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
