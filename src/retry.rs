//! Bounded exponential backoff for transient lock contention

use crate::error::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Maximum retry attempts exceeded")]
pub struct MaxRetriesExceeded;

impl ExponentialBackoff {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            max_retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once retries are spent
    pub fn next_delay(&self) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }

        let factor = 2_u64.saturating_pow(self.current_attempt);
        let delay = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay().ok_or(MaxRetriesExceeded)?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Re-run `op` while it fails with a busy/locked database
///
/// Non-transient errors and the last transient error are returned as-is.
pub async fn retry_transient<T, F, Fut>(backoff: &mut ExponentialBackoff, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    loop {
        match op().await {
            Err(err) if err.is_transient() => {
                log::warn!("⚠️  Transient store error: {}", err);
                if backoff.sleep().await.is_err() {
                    return Err(err);
                }
            }
            other => return other,
        }
    }
}
