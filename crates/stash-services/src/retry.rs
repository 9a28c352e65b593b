//! Bounded retries for attachment saves.
//!
//! Attempt `i` (1-based) that fails with a transient error is followed by a
//! wait of `i * base_delay`. Waits race the caller's cancellation token.

use bytes::Bytes;
use stash_core::{Config, FileId};
use stash_storage::{AttachmentStorage, StorageError, StorageResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct RetryWrapper {
    storage: Arc<AttachmentStorage>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryWrapper {
    pub fn new(storage: Arc<AttachmentStorage>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            storage,
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(storage: Arc<AttachmentStorage>, config: &Config) -> Self {
        Self::new(storage, config.retry_max_attempts(), config.retry_base_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the given failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Save with the configured number of attempts.
    pub async fn save_with_retry(
        &self,
        data: Bytes,
        ext: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<FileId> {
        self.save_with_attempts(data, ext, self.max_attempts, cancel)
            .await
    }

    /// Save, retrying transient failures up to `max_attempts` times in total.
    ///
    /// A `max_attempts` of zero still makes one attempt.
    pub async fn save_with_attempts(
        &self,
        data: Bytes,
        ext: &str,
        max_attempts: u32,
        cancel: &CancellationToken,
    ) -> StorageResult<FileId> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match self.storage.save(data.clone(), ext, cancel).await {
                Ok(id) => {
                    if attempt > 1 {
                        tracing::info!(file.id = %id, attempt, "Save succeeded after retry");
                    }
                    return Ok(id);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                return Err(error);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    error = %error,
                    attempts = attempt,
                    "Save failed, retries exhausted"
                );
                return Err(StorageError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.delay_for_attempt(attempt);
            tracing::warn!(
                error = %error,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Save failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_storage::{MemoryObjectStore, StoreOp};
    use tokio::time::Instant;

    fn wrapper(store: &Arc<MemoryObjectStore>, max_attempts: u32) -> RetryWrapper {
        let storage = Arc::new(AttachmentStorage::new(
            store.clone(),
            "primary",
            Duration::from_secs(30),
        ));
        RetryWrapper::new(storage, max_attempts, Duration::from_secs(1))
    }

    #[test]
    fn delay_grows_linearly() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = wrapper(&store, 3);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_failures() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = wrapper(&store, 3);
        store.fail_next(StoreOp::Put, 2);

        let start = Instant::now();
        let id = retry
            .save_with_retry(Bytes::from_static(b"data"), "txt", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.calls(StoreOp::Put), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(store.keys("primary"), vec![format!("{}.txt", id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = wrapper(&store, 3);
        store.fail_next(StoreOp::Put, 10);

        let err = retry
            .save_with_retry(Bytes::from_static(b"data"), "txt", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            StorageError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, StorageError::UploadFailed(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.calls(StoreOp::Put), 3);
        assert!(store.keys("primary").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_means_one() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = wrapper(&store, 0);
        store.fail_next(StoreOp::Put, 1);

        let err = retry
            .save_with_retry(Bytes::from_static(b"data"), "txt", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::RetryExhausted { attempts: 1, .. }));
        assert_eq!(store.calls(StoreOp::Put), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = wrapper(&store, 3);
        let token = CancellationToken::new();
        token.cancel();

        let err = retry
            .save_with_retry(Bytes::from_static(b"data"), "txt", &token)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Cancelled));
        assert_eq!(store.calls(StoreOp::Put), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let store = Arc::new(MemoryObjectStore::new());
        let storage = Arc::new(AttachmentStorage::new(
            store.clone(),
            "primary",
            Duration::from_secs(30),
        ));
        let retry = RetryWrapper::new(storage, 5, Duration::from_secs(60));
        store.fail_next(StoreOp::Put, 5);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = retry
            .save_with_retry(Bytes::from_static(b"data"), "txt", &token)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Cancelled));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(store.calls(StoreOp::Put), 1);
    }
}
