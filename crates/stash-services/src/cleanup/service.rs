use chrono::{DateTime, Utc};
use stash_core::Config;
use stash_storage::{AttachmentStorage, StorageError, StorageResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Counters for one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
    pub retained: usize,
}

/// Deletes stored files older than the retention window on a fixed interval.
#[derive(Clone)]
pub struct RetentionSweeper {
    storage: Arc<AttachmentStorage>,
    interval: Duration,
    window: Duration,
}

impl RetentionSweeper {
    pub fn new(storage: Arc<AttachmentStorage>, interval: Duration, window: Duration) -> Self {
        Self {
            storage,
            interval,
            window,
        }
    }

    pub fn from_config(storage: Arc<AttachmentStorage>, config: &Config) -> Self {
        Self::new(storage, config.sweep_interval(), config.retention_window())
    }

    /// Start the background sweep task with the configured interval and window.
    /// Returns a JoinHandle for graceful shutdown
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let (interval, window) = (self.interval, self.window);
            self.run(token, interval, window).await;
        })
    }

    /// Sweep every `interval` until `token` is cancelled.
    ///
    /// The first pass runs one full interval after start. Cancellation is
    /// observed while waiting for a tick and between files of a pass.
    pub async fn run(&self, token: CancellationToken, interval: Duration, window: Duration) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_secs = window.as_secs(),
            "Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tracing::info!("Starting scheduled retention sweep");

            if let Err(e) = self.sweep(Utc::now(), window, &token).await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }

        tracing::info!("Retention sweeper stopped");
    }

    /// Run a single pass against `now` with the configured window.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> StorageResult<SweepReport> {
        self.sweep(now, self.window, &CancellationToken::new()).await
    }

    #[tracing::instrument(skip(self, token), fields(sweep.window_secs = window.as_secs()))]
    async fn sweep(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        token: &CancellationToken,
    ) -> StorageResult<SweepReport> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| StorageError::ConfigError(format!("Invalid retention window: {}", e)))?;
        let cutoff = now - window;

        let files = self.storage.list_files().await?;
        let mut report = SweepReport::default();

        for file in files {
            if token.is_cancelled() {
                tracing::info!(
                    scanned = report.scanned,
                    "Retention sweep interrupted by shutdown"
                );
                break;
            }

            report.scanned += 1;

            if file.created_at >= cutoff {
                report.retained += 1;
                continue;
            }

            tracing::info!(
                file.id = %file.id,
                extension = %file.extension,
                created_at = %file.created_at,
                "Deleting expired file"
            );

            match self.storage.delete_listed(&file).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        error = %e,
                        file.id = %file.id,
                        "Failed to delete expired file, continuing"
                    );
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            retained = report.retained,
            cutoff = %cutoff,
            "Retention sweep completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use stash_core::FileId;
    use stash_storage::{MemoryObjectStore, StoreOp};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    struct Fixture {
        store: Arc<MemoryObjectStore>,
        storage: Arc<AttachmentStorage>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryObjectStore::new());
        let storage = Arc::new(AttachmentStorage::new(
            store.clone(),
            "primary",
            Duration::from_secs(30),
        ));
        Fixture { store, storage }
    }

    async fn file_aged(fx: &Fixture, now: DateTime<Utc>, days: i64) -> FileId {
        let id = fx
            .storage
            .save(Bytes::from_static(b"x"), "txt", &CancellationToken::new())
            .await
            .unwrap();
        let key = format!("{}.txt", id);
        assert!(fx
            .store
            .set_last_modified("primary", &key, now - chrono::Duration::days(days)));
        id
    }

    fn sweeper(fx: &Fixture) -> RetentionSweeper {
        RetentionSweeper::new(fx.storage.clone(), DAY, 30 * DAY)
    }

    #[tokio::test]
    async fn deletes_only_files_past_the_window() {
        let fx = fixture();
        let now = Utc::now();
        let forty = file_aged(&fx, now, 40).await;
        let thirty_one = file_aged(&fx, now, 31).await;
        let ten = file_aged(&fx, now, 10).await;

        let report = sweeper(&fx).sweep_once(now).await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                scanned: 3,
                deleted: 2,
                failed: 0,
                retained: 1,
            }
        );
        assert!(fx.storage.get(&forty).await.unwrap_err().is_not_found());
        assert!(fx.storage.get(&thirty_one).await.unwrap_err().is_not_found());
        assert!(fx.storage.get(&ten).await.is_ok());
    }

    #[tokio::test]
    async fn file_exactly_at_cutoff_is_retained() {
        let fx = fixture();
        let now = Utc::now();
        let id = file_aged(&fx, now, 30).await;

        let report = sweeper(&fx).sweep_once(now).await.unwrap();

        assert_eq!(report.deleted, 0);
        assert!(fx.storage.get(&id).await.is_ok());
    }

    #[tokio::test]
    async fn one_failed_delete_does_not_stop_the_pass() {
        let fx = fixture();
        let now = Utc::now();
        let stuck = file_aged(&fx, now, 45).await;
        let a = file_aged(&fx, now, 40).await;
        let b = file_aged(&fx, now, 35).await;
        fx.store.fail_key(StoreOp::Delete, format!("{}.txt", stuck));

        let report = sweeper(&fx).sweep_once(now).await.unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 1);
        assert!(fx.storage.get(&a).await.unwrap_err().is_not_found());
        assert!(fx.storage.get(&b).await.unwrap_err().is_not_found());
        assert!(fx.storage.get(&stuck).await.is_ok());

        // The next pass picks it up once the backend recovers.
        fx.store.clear_faults();
        let report = sweeper(&fx).sweep_once(now).await.unwrap();
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let fx = fixture();
        fx.store.fail_next(StoreOp::List, 1);

        let err = sweeper(&fx).sweep_once(Utc::now()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_on_tick_and_stops_on_cancel() {
        let fx = fixture();
        let id = file_aged(&fx, Utc::now(), 40).await;
        let sweeper = Arc::new(RetentionSweeper::new(fx.storage.clone(), DAY, 30 * DAY));
        let token = CancellationToken::new();

        let handle = sweeper.spawn(token.clone());

        // Nothing happens before the first interval has elapsed.
        tokio::time::sleep(DAY - Duration::from_secs(60)).await;
        assert_eq!(fx.store.keys("primary").len(), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(fx.store.keys("primary").is_empty());
        assert!(!fx.storage.index().contains(&id).await);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_token_stops_a_pass_between_files() {
        let fx = fixture();
        let now = Utc::now();
        file_aged(&fx, now, 40).await;
        file_aged(&fx, now, 40).await;
        let token = CancellationToken::new();
        token.cancel();

        let report = sweeper(&fx).sweep(now, 30 * DAY, &token).await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(fx.store.keys("primary").len(), 2);
    }
}
