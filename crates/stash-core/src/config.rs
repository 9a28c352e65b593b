//! Configuration module
//!
//! Process-level settings consumed by the ingestion pipeline, the quarantine
//! coordinator and the retention sweeper. Values come from the environment
//! (optionally seeded from a `.env` file) with typed defaults.

use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use crate::constants::*;
use crate::storage_types::StorageBackend;

/// Which networked scanner the service layer should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerBackend {
    /// clamd over TCP.
    ClamAv,
    /// HTTP endpoint answering `POST /scan` with `OK` for clean payloads.
    Http,
}

/// Settings shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub log_filter: String,
}

/// Attachment pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub base: BaseConfig,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub primary_bucket: String,
    pub quarantine_bucket: String,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // MinIO and other S3-compatible providers
    pub local_storage_path: Option<String>,
    pub storage_timeout: Duration,
    // Validation policy
    pub max_file_size_bytes: usize,
    pub allowed_extensions: BTreeSet<String>,
    pub content_sniffing: bool,
    // Scanner configuration
    pub scanner_backend: ScannerBackend,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub scanner_endpoint: Option<String>,
    pub scan_timeout: Duration,
    // Durability and lifecycle
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retention_window: Duration,
    pub sweep_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig {
                environment: "development".to_string(),
                log_filter: "stash=debug".to_string(),
            },
            storage_backend: StorageBackend::Memory,
            primary_bucket: DEFAULT_PRIMARY_BUCKET.to_string(),
            quarantine_bucket: DEFAULT_QUARANTINE_BUCKET.to_string(),
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: None,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            content_sniffing: true,
            scanner_backend: ScannerBackend::ClamAv,
            clamav_host: "localhost".to_string(),
            clamav_port: DEFAULT_CLAMAV_PORT,
            scanner_endpoint: None,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retention_window: Duration::from_secs(DEFAULT_RETENTION_DAYS * SECS_PER_DAY),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    fn as_pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = PipelineConfig::from_vars(|key| env::var(key).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn is_production(&self) -> bool {
        let env = self.as_pipeline().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn log_filter(&self) -> &str {
        &self.as_pipeline().base.log_filter
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_pipeline().storage_backend
    }

    pub fn primary_bucket(&self) -> &str {
        &self.as_pipeline().primary_bucket
    }

    pub fn quarantine_bucket(&self) -> &str {
        &self.as_pipeline().quarantine_bucket
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_pipeline().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_pipeline().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_pipeline().local_storage_path.as_deref()
    }

    pub fn storage_timeout(&self) -> Duration {
        self.as_pipeline().storage_timeout
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.as_pipeline().max_file_size_bytes
    }

    pub fn allowed_extensions(&self) -> &BTreeSet<String> {
        &self.as_pipeline().allowed_extensions
    }

    pub fn content_sniffing(&self) -> bool {
        self.as_pipeline().content_sniffing
    }

    pub fn scanner_backend(&self) -> ScannerBackend {
        self.as_pipeline().scanner_backend
    }

    pub fn clamav_host(&self) -> &str {
        &self.as_pipeline().clamav_host
    }

    pub fn clamav_port(&self) -> u16 {
        self.as_pipeline().clamav_port
    }

    pub fn scanner_endpoint(&self) -> Option<&str> {
        self.as_pipeline().scanner_endpoint.as_deref()
    }

    pub fn scan_timeout(&self) -> Duration {
        self.as_pipeline().scan_timeout
    }

    pub fn retry_max_attempts(&self) -> u32 {
        self.as_pipeline().retry_max_attempts
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.as_pipeline().retry_base_delay
    }

    pub fn retention_window(&self) -> Duration {
        self.as_pipeline().retention_window
    }

    pub fn sweep_interval(&self) -> Duration {
        self.as_pipeline().sweep_interval
    }
}

impl From<PipelineConfig> for Config {
    fn from(config: PipelineConfig) -> Self {
        Config(Box::new(config))
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl PipelineConfig {
    /// Build the configuration from a variable lookup (the environment in production).
    pub fn from_vars<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PipelineConfig::default();

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| defaults.base.environment.clone());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(s) => s.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let scanner_backend = match var("SCANNER_BACKEND").map(|s| s.to_lowercase()) {
            None => ScannerBackend::ClamAv,
            Some(s) if s == "clamav" => ScannerBackend::ClamAv,
            Some(s) if s == "http" => ScannerBackend::Http,
            Some(other) => return Err(anyhow::anyhow!("Invalid scanner backend: {}", other)),
        };

        let max_file_size_mb = parse_or(
            var("MAX_FILE_SIZE_MB"),
            defaults.max_file_size_bytes / (1024 * 1024),
        );
        let max_file_size_bytes = max_file_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("MAX_FILE_SIZE_MB is too large: {}", max_file_size_mb))?;

        let retention_days: u64 = parse_or(var("RETENTION_DAYS"), DEFAULT_RETENTION_DAYS);
        let retention_secs = retention_days
            .checked_mul(SECS_PER_DAY)
            .ok_or_else(|| anyhow::anyhow!("RETENTION_DAYS is too large: {}", retention_days))?;

        let allowed_extensions: BTreeSet<String> = match var("ALLOWED_EXTENSIONS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.allowed_extensions.clone(),
        };

        let config = PipelineConfig {
            base: BaseConfig {
                environment,
                log_filter: var("RUST_LOG").unwrap_or(defaults.base.log_filter),
            },
            storage_backend,
            primary_bucket: var("S3_BUCKET").unwrap_or(defaults.primary_bucket),
            quarantine_bucket: var("S3_QUARANTINE_BUCKET").unwrap_or(defaults.quarantine_bucket),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT").filter(|s| !s.is_empty()),
            local_storage_path: var("LOCAL_STORAGE_PATH").filter(|s| !s.is_empty()),
            storage_timeout: Duration::from_secs(parse_or(
                var("STORAGE_TIMEOUT_SECS"),
                defaults.storage_timeout.as_secs(),
            )),
            max_file_size_bytes,
            allowed_extensions,
            content_sniffing: parse_or(
                var("CONTENT_SNIFFING").map(|s| s.to_lowercase()),
                defaults.content_sniffing,
            ),
            scanner_backend,
            clamav_host: var("CLAMAV_HOST").unwrap_or(defaults.clamav_host),
            clamav_port: parse_or(var("CLAMAV_PORT"), defaults.clamav_port),
            scanner_endpoint: var("SCANNER_ENDPOINT").filter(|s| !s.is_empty()),
            scan_timeout: Duration::from_secs(parse_or(
                var("SCAN_TIMEOUT_SECS"),
                defaults.scan_timeout.as_secs(),
            )),
            retry_max_attempts: parse_or(var("RETRY_MAX_ATTEMPTS"), defaults.retry_max_attempts),
            retry_base_delay: Duration::from_millis(parse_or(
                var("RETRY_BASE_DELAY_MS"),
                defaults.retry_base_delay.as_millis() as u64,
            )),
            retention_window: Duration::from_secs(retention_secs),
            sweep_interval: Duration::from_secs(parse_or(
                var("SWEEP_INTERVAL_SECS"),
                defaults.sweep_interval.as_secs(),
            )),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than zero"));
        }

        if self.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_EXTENSIONS must list at least one extension"));
        }

        if self.retry_max_attempts == 0 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }

        if self.storage_timeout.is_zero() {
            return Err(anyhow::anyhow!("STORAGE_TIMEOUT_SECS must be greater than zero"));
        }

        if self.scan_timeout.is_zero() {
            return Err(anyhow::anyhow!("SCAN_TIMEOUT_SECS must be greater than zero"));
        }

        if chrono::Duration::from_std(self.retention_window).is_err() {
            return Err(anyhow::anyhow!("RETENTION_DAYS is too large"));
        }

        if self.sweep_interval.is_zero() {
            return Err(anyhow::anyhow!("SWEEP_INTERVAL_SECS must be greater than zero"));
        }

        if self.primary_bucket == self.quarantine_bucket {
            return Err(anyhow::anyhow!(
                "S3_QUARANTINE_BUCKET must differ from S3_BUCKET"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_region.is_none() && self.s3_endpoint.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION, AWS_REGION or S3_ENDPOINT must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        if self.scanner_backend == ScannerBackend::Http && self.scanner_endpoint.is_none() {
            return Err(anyhow::anyhow!(
                "SCANNER_ENDPOINT must be set when SCANNER_BACKEND=http"
            ));
        }

        Ok(())
    }
}
