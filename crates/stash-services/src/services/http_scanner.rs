use async_trait::async_trait;
use stash_processing::{ScanError, ScanVerdict, VirusScanner};
use std::time::{Duration, Instant};

/// Longest signature text kept from a scanner reply.
const MAX_SIGNATURE_LEN: usize = 128;

/// Scanner reached over HTTP (clamav-rest style).
///
/// The payload is POSTed to `{endpoint}/scan`; a `200` whose body is `OK`
/// means clean, any other `200` body names the detection.
#[derive(Clone)]
pub struct HttpScanner {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpScanner {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn scan_url(&self) -> String {
        format!("{}/scan", self.endpoint)
    }
}

#[async_trait]
impl VirusScanner for HttpScanner {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict, ScanError> {
        let start = Instant::now();
        let url = self.scan_url();

        let response = self
            .client
            .post(&url)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %url, "Scan request failed");
                if e.is_timeout() {
                    ScanError::Timeout(self.timeout)
                } else {
                    ScanError::Transport(format!("failed to send scan request: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScanError::Transport(format!(
                "scanner unavailable: status {}",
                status.as_u16()
            )));
        }
        if status != reqwest::StatusCode::OK {
            return Err(ScanError::MalformedResponse(format!(
                "unexpected status code: {}",
                status.as_u16()
            )));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScanError::Timeout(self.timeout)
            } else {
                ScanError::Transport(format!("failed to read response body: {}", e))
            }
        })?;

        let body = body.trim();
        let verdict = if body == "OK" {
            ScanVerdict::Clean
        } else {
            let signature: String = body.chars().take(MAX_SIGNATURE_LEN).collect();
            ScanVerdict::Infected {
                signature: if signature.is_empty() {
                    "unknown".to_string()
                } else {
                    signature
                },
            }
        };

        tracing::info!(
            url = %url,
            size_bytes = data.len(),
            clean = verdict.is_clean(),
            duration_ms = start.elapsed().as_millis() as u64,
            "HTTP scan completed"
        );

        Ok(verdict)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
