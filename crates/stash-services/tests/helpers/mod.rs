#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use stash_core::{Config, PipelineConfig, StorageBackend};
use stash_processing::{ScanError, ScanVerdict, VirusScanner};
use stash_services::{AttachmentService, MemoryObjectStore, ObjectStore};
use stash_storage::{ObjectEntry, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const EICAR: &[u8] = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
pub const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";

/// Deterministic scanner: flags payloads containing the EICAR marker, or
/// answers with a fixed outcome.
pub enum FakeScanner {
    Eicar,
    Fails(ScanError),
    Hangs,
}

pub struct CountingScanner {
    pub inner: FakeScanner,
    pub calls: AtomicUsize,
}

impl CountingScanner {
    pub fn new(inner: FakeScanner) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VirusScanner for CountingScanner {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            FakeScanner::Eicar => {
                if data.windows(5).any(|w| w == b"EICAR") {
                    Ok(ScanVerdict::Infected {
                        signature: "Eicar-Test-Signature".to_string(),
                    })
                } else {
                    Ok(ScanVerdict::Clean)
                }
            }
            FakeScanner::Fails(e) => Err(e.clone()),
            FakeScanner::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ScanVerdict::Clean)
            }
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Memory store that records when each put was attempted.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryObjectStore,
    pub put_times: Mutex<Vec<Instant>>,
}

impl RecordingStore {
    pub fn put_gaps(&self) -> Vec<Duration> {
        let times = self.put_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.put_times.lock().unwrap().push(Instant::now());
        self.inner.put(bucket, key, data).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.inner.get(bucket, key).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.inner.list(bucket, prefix).await
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectEntry>> {
        self.inner.head(bucket, key).await
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

pub fn test_config() -> Config {
    Config::from(PipelineConfig {
        storage_backend: StorageBackend::Memory,
        max_file_size_bytes: 1024,
        retry_base_delay: Duration::from_secs(1),
        scan_timeout: Duration::from_secs(30),
        ..PipelineConfig::default()
    })
}

pub fn service(
    store: Arc<dyn ObjectStore>,
    scanner: Arc<dyn VirusScanner>,
) -> AttachmentService {
    AttachmentService::from_config(&test_config(), store, scanner)
}
