#[cfg(feature = "storage-local")]
use crate::LocalObjectStore;
#[cfg(feature = "storage-s3")]
use crate::S3ObjectStore;
use crate::{MemoryObjectStore, ObjectStore, StorageBackend, StorageError, StorageResult};
use stash_core::Config;
use std::sync::Arc;

/// Region assumed for S3-compatible endpoints configured without one.
#[cfg(feature = "storage-s3")]
const FALLBACK_REGION: &str = "us-east-1";

/// Create an object store backend based on configuration
pub async fn create_object_store(config: &Config) -> StorageResult<Arc<dyn ObjectStore>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let region = match (config.s3_region(), config.s3_endpoint()) {
                (Some(region), _) => region.to_string(),
                (None, Some(_)) => FALLBACK_REGION.to_string(),
                (None, None) => {
                    return Err(StorageError::ConfigError(
                        "S3_REGION or AWS_REGION not configured".to_string(),
                    ))
                }
            };
            let endpoint = config.s3_endpoint().map(String::from);
            let buckets = [config.primary_bucket(), config.quarantine_bucket()];

            let store = S3ObjectStore::new(&buckets, region, endpoint).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;

            let store = LocalObjectStore::new(base_path).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object store; data will not survive a restart");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use stash_core::PipelineConfig;

    #[tokio::test]
    async fn builds_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from(PipelineConfig {
            storage_backend: StorageBackend::Local,
            local_storage_path: Some(dir.path().to_string_lossy().into_owned()),
            ..PipelineConfig::default()
        });

        let store = create_object_store(&config).await.unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Local);
    }

    #[tokio::test]
    async fn local_backend_requires_path() {
        let config = Config::from(PipelineConfig {
            storage_backend: StorageBackend::Local,
            local_storage_path: None,
            ..PipelineConfig::default()
        });

        let err = create_object_store(&config).await.err().unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[tokio::test]
    async fn builds_memory_backend() {
        let store = create_object_store(&Config::from(PipelineConfig::default()))
            .await
            .unwrap();
        assert_eq!(store.backend_type(), StorageBackend::Memory);
    }
}
