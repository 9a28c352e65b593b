//! Networked virus scanners.

#[cfg(feature = "clamav")]
pub mod clamav;
#[cfg(feature = "http-scanner")]
pub mod http_scanner;

use stash_core::{Config, ScannerBackend};
use stash_processing::VirusScanner;
use std::sync::Arc;

/// Build the scanner selected by configuration
pub fn create_scanner(config: &Config) -> Result<Arc<dyn VirusScanner>, anyhow::Error> {
    match config.scanner_backend() {
        #[cfg(feature = "clamav")]
        ScannerBackend::ClamAv => Ok(Arc::new(clamav::ClamAvScanner::with_timeout(
            config.clamav_host().to_string(),
            config.clamav_port(),
            config.scan_timeout(),
        ))),

        #[cfg(not(feature = "clamav"))]
        ScannerBackend::ClamAv => Err(anyhow::anyhow!(
            "ClamAV scanner not available (clamav feature not enabled)"
        )),

        #[cfg(feature = "http-scanner")]
        ScannerBackend::Http => {
            let endpoint = config
                .scanner_endpoint()
                .ok_or_else(|| anyhow::anyhow!("SCANNER_ENDPOINT not configured"))?;
            let scanner = http_scanner::HttpScanner::new(endpoint, config.scan_timeout())?;
            Ok(Arc::new(scanner))
        }

        #[cfg(not(feature = "http-scanner"))]
        ScannerBackend::Http => Err(anyhow::anyhow!(
            "HTTP scanner not available (http-scanner feature not enabled)"
        )),
    }
}
