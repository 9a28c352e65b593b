use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing
///
/// `RUST_LOG` wins over `default_filter`. With `json` set, events are written
/// as one JSON object per line.
pub fn init_telemetry(default_filter: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()?;

    tracing::debug!(json, "Tracing initialized");
    Ok(())
}
