//! Virus scanner capability.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { signature: String },
}

impl ScanVerdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, ScanVerdict::Clean)
    }
}

/// The scanner could not produce a verdict.
///
/// Distinct from [`ScanVerdict::Infected`]: the payload was not certified
/// either way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Scan timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scanner unreachable: {0}")]
    Transport(String),

    #[error("Unexpected scanner response: {0}")]
    MalformedResponse(String),
}

/// Classifies a byte payload as clean or infected.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "scanner"
    }
}

/// Run `scanner` with an upper bound on how long the caller waits.
pub async fn scan_with_timeout(
    scanner: &dyn VirusScanner,
    data: &[u8],
    timeout: Duration,
) -> Result<ScanVerdict, ScanError> {
    match tokio::time::timeout(timeout, scanner.scan(data)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                scanner = scanner.name(),
                timeout_ms = timeout.as_millis() as u64,
                size_bytes = data.len(),
                "Virus scan timed out"
            );
            Err(ScanError::Timeout(timeout))
        }
    }
}
