//! Opt-in bounded retry for chunk uploads.
//!
//! Only `upload_chunk` is retried: re-sending a chunk index is idempotent,
//! while repeating `start` would open a second session and `complete`
//! failures need the caller to decide (see [`CompleteFailure`]).
//!
//! [`CompleteFailure`]: crate::error::CompleteFailure

use std::time::Duration;

use appvault_protocol::CommittedArtifact;
use tracing::warn;

use crate::transport::{ChunkAck, SessionTransport, StartUpload, TransportError, TransportFuture};

/// Exponential backoff settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based), with ±25% jitter.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }

    /// Whether another attempt is allowed after `attempt` failed with `err`.
    pub fn should_retry(&self, attempt: u32, err: &TransportError) -> bool {
        err.error_type().is_retryable() && attempt < self.max_attempts
    }
}

/// Wraps a transport and retries failed chunk uploads.
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: SessionTransport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: SessionTransport> SessionTransport for RetryingTransport<T> {
    fn start<'a>(&'a self, request: &'a StartUpload) -> TransportFuture<'a, String> {
        self.inner.start(request)
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: &'a [u8],
    ) -> TransportFuture<'a, ChunkAck> {
        Box::pin(async move {
            let mut attempt = 1;
            loop {
                match self.inner.upload_chunk(session_id, index, data).await {
                    Ok(ack) => return Ok(ack),
                    Err(e) if self.policy.should_retry(attempt, &e) => {
                        let delay = self.policy.delay_for_retry(attempt);
                        warn!(
                            session_id,
                            index,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "chunk upload failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }

    fn complete<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, CommittedArtifact> {
        self.inner.complete(session_id)
    }
}
