use crate::traits::{ObjectEntry, ObjectStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectMeta, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};
use std::collections::HashMap;

/// S3 object store
///
/// Holds one client per configured bucket (primary and quarantine). Works with
/// AWS and S3-compatible providers such as MinIO.
#[derive(Clone)]
pub struct S3ObjectStore {
    stores: HashMap<String, AmazonS3>,
    region: String,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore
    ///
    /// # Arguments
    /// * `buckets` - every bucket this store will be asked to touch
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        buckets: &[&str],
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut stores = HashMap::with_capacity(buckets.len());

        for bucket in buckets {
            let mut builder = AmazonS3Builder::from_env()
                .with_region(region.clone())
                .with_bucket_name(bucket.to_string());

            if let Some(ref endpoint) = endpoint_url {
                let allow_http = endpoint.starts_with("http://");
                builder = builder
                    .with_endpoint(endpoint.clone())
                    .with_allow_http(allow_http)
                    .with_virtual_hosted_style_request(false);
            }

            let store = builder
                .build()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;
            stores.insert(bucket.to_string(), store);
        }

        tracing::info!(
            buckets = ?buckets,
            region = %region,
            endpoint = ?endpoint_url,
            "S3 object store initialized"
        );

        Ok(S3ObjectStore { stores, region })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn store_for(&self, bucket: &str) -> StorageResult<&AmazonS3> {
        self.stores.get(bucket).ok_or_else(|| {
            StorageError::ConfigError(format!("Bucket '{}' is not configured", bucket))
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        let store = self.store_for(bucket)?;
        let size = data.len();
        let location = Path::from(key);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = object_store::ObjectStore::put_opts(
            store,
            &location,
            PutPayload::from(data),
            put_options(content_type),
        )
        .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            content_type = ?content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    fn entry_from_meta(meta: ObjectMeta) -> ObjectEntry {
        ObjectEntry {
            key: meta.location.to_string(),
            last_modified: meta.last_modified,
            size: meta.size,
        }
    }
}

/// Offset for a string-prefix listing.
///
/// S3 prefixes in object_store are path-segment based, so a bare id cannot be
/// used as a prefix. Listing starts strictly after the prefix with its last
/// character dropped, which keeps an exact match on the prefix itself.
fn listing_offset(prefix: &str) -> Option<Path> {
    let mut chars = prefix.chars();
    chars.next_back()?;
    let head = chars.as_str();
    if head.is_empty() {
        None
    } else {
        Some(Path::from(head))
    }
}

fn put_options(content_type: Option<&str>) -> PutOptions {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
    }
    PutOptions {
        attributes,
        ..Default::default()
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.put_object(bucket, key, data, None).await
    }

    async fn put_with_content_type(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.put_object(bucket, key, data, Some(content_type)).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 get failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(bytes)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key);
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let store = self.store_for(bucket)?;
        let start = std::time::Instant::now();

        let mut stream = match listing_offset(prefix) {
            Some(offset) => object_store::ObjectStore::list_with_offset(store, None, &offset),
            None => object_store::ObjectStore::list(store, None),
        };

        let mut entries = Vec::new();
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| StorageError::BackendError(e.to_string()))?
        {
            let entry = Self::entry_from_meta(meta);
            if entry.key.starts_with(prefix) {
                entries.push(entry);
            } else if !prefix.is_empty() && entry.key.as_str() > prefix {
                // S3 lists keys in byte order; nothing later can match.
                break;
            }
        }

        tracing::debug!(
            bucket = %bucket,
            prefix = %prefix,
            count = entries.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 list completed"
        );

        Ok(entries)
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectEntry>> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key);

        match store.head(&location).await {
            Ok(meta) => Ok(Some(Self::entry_from_meta(meta))),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_options_carry_content_type() {
        let opts = put_options(Some("application/pdf"));
        assert_eq!(
            opts.attributes.get(&Attribute::ContentType),
            Some(&AttributeValue::from("application/pdf"))
        );
        assert!(put_options(None).attributes.is_empty());
    }

    #[test]
    fn test_listing_offset() {
        assert!(listing_offset("").is_none());
        assert!(listing_offset("a").is_none());
        assert_eq!(listing_offset("abc").unwrap().as_ref(), "ab");
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_config_error() {
        let store = S3ObjectStore::new(
            &["primary"],
            "us-east-1".to_string(),
            Some("http://localhost:9000".to_string()),
        )
        .await
        .unwrap();

        let err = store.head("elsewhere", "abc.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
        assert_eq!(store.backend_type(), StorageBackend::S3);
    }
}
