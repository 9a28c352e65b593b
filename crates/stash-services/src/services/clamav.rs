use async_trait::async_trait;
use clamav_client::clean;
use clamav_client::tokio::{scan_buffer, Tcp};
use stash_core::constants::DEFAULT_SCAN_TIMEOUT;
use stash_processing::{ScanError, ScanVerdict, VirusScanner};
use std::str;
use std::time::{Duration, Instant};

/// Scanner backed by a clamd daemon over TCP (INSTREAM).
#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    /// Upper bound for a single scan, connection included
    timeout: Duration,
}

impl ClamAvScanner {
    /// Create a new ClamAvScanner.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeout(host, port, DEFAULT_SCAN_TIMEOUT)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(host: String, port: u16, timeout: Duration) -> Self {
        Self {
            host,
            port,
            timeout,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Extract the signature name from a clamd reply such as `stream: Eicar-Test-Signature FOUND`.
fn signature_from_response(response: &[u8]) -> String {
    let response = str::from_utf8(response)
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
        .unwrap_or("");
    if !response.contains("FOUND") {
        return "unknown".to_string();
    }
    response
        .split(':')
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .filter(|name| *name != "FOUND")
        .unwrap_or("unknown")
        .to_string()
}

/// Stream `data` to clamd, giving up (and closing the socket) after `deadline`.
async fn scan_within(data: &[u8], address: &str, deadline: Duration) -> Result<Vec<u8>, ScanError> {
    let connection = Tcp {
        host_address: address,
    };
    match tokio::time::timeout(deadline, scan_buffer(data, connection, None)).await {
        Ok(response) => {
            response.map_err(|e| ScanError::Transport(format!("ClamAV scan error: {}", e)))
        }
        Err(_) => Err(ScanError::Timeout(deadline)),
    }
}

fn verdict_from_response(response: &[u8]) -> Result<ScanVerdict, ScanError> {
    match clean(response) {
        Ok(true) => Ok(ScanVerdict::Clean),
        Ok(false) => Ok(ScanVerdict::Infected {
            signature: signature_from_response(response),
        }),
        Err(e) => Err(ScanError::MalformedResponse(format!(
            "Failed to parse ClamAV response: {}",
            e
        ))),
    }
}

#[async_trait]
impl VirusScanner for ClamAvScanner {
    /// The async client's futures are not `Send`, so each scan runs on a
    /// private current-thread runtime inside `spawn_blocking`. The deadline is
    /// enforced on that runtime too: when it fires the clamd connection is
    /// dropped and the blocking thread is released.
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError> {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, "Starting ClamAV scan");
        let data = data.to_vec();
        let address = self.address();
        let deadline = self.timeout;

        let task = tokio::task::spawn_blocking(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ScanError::Transport(format!("ClamAV runtime error: {}", e)))?;
            let response = runtime.block_on(scan_within(&data, &address, deadline))?;
            verdict_from_response(&response)
        });

        let result = match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ScanError::Transport(format!(
                "ClamAV scan task join error: {}",
                e
            ))),
            Err(_) => Err(ScanError::Timeout(deadline)),
        };

        match &result {
            Ok(ScanVerdict::Clean) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "File scan completed: clean"
                );
            }
            Ok(ScanVerdict::Infected { signature }) => {
                tracing::warn!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    virus = %signature,
                    "File scan detected virus"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    host = %self.host,
                    port = %self.port,
                    "ClamAV scan failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &'static str {
        "clamav"
    }
}
