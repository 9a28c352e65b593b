//! Stash CLI: operator commands for the attachment pipeline.
//!
//! Configuration comes from the environment (see `Config::from_env`); a `.env`
//! file in the working directory is honored.

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use stash_cli::{declared_extension, default_output_path, Cli, Commands};
use stash_core::{Config, FileStatus};
use stash_services::telemetry::init_telemetry;
use stash_services::{create_object_store, create_scanner, AttachmentService, RetentionSweeper};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry(config.log_filter(), config.is_production())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let store = create_object_store(&config)
        .await
        .context("Failed to create object store")?;
    let scanner = create_scanner(&config)?;
    let service = AttachmentService::from_config(&config, store, scanner);

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        }
    });

    match cli.command {
        Commands::Ingest { file, ext } => {
            let ext = ext
                .or_else(|| declared_extension(&file))
                .unwrap_or_default();
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let id = service.ingest(Bytes::from(data), &ext, &token).await?;
            print_json(&serde_json::json!({ "id": id, "extension": ext }))?;
        }
        Commands::Get { id, output } => {
            let (data, ext) = service.download(&id).await?;
            let path = match output {
                Some(path) => path,
                None => {
                    let stem = id.split('.').next().unwrap_or(&id);
                    default_output_path(&std::env::current_dir()?, stem, &ext)
                }
            };
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_json(&serde_json::json!({
                "path": path,
                "extension": ext,
                "content_type": stash_services::content_type_for_extension(&ext),
                "size": data.len(),
            }))?;
        }
        Commands::Delete { id } => {
            service.delete(&id).await?;
            print_json(&serde_json::json!({ "id": id, "status": FileStatus::Deleted }))?;
        }
        Commands::Quarantine { id } => {
            // A primary copy left behind surfaces as an error and a non-zero exit.
            let id = service.quarantine(&id).await?;
            print_json(&serde_json::json!({ "id": id, "status": FileStatus::Quarantined }))?;
        }
        Commands::List { quarantined } => {
            let files = if quarantined {
                service.list_quarantined().await?
            } else {
                service.list_files().await?
            };
            print_json(&files)?;
        }
        Commands::Sweep { once } => {
            let sweeper = Arc::new(RetentionSweeper::from_config(
                service.storage().clone(),
                &config,
            ));
            if once {
                let report = sweeper.sweep_once(chrono::Utc::now()).await?;
                print_json(&serde_json::json!({
                    "scanned": report.scanned,
                    "deleted": report.deleted,
                    "failed": report.failed,
                    "retained": report.retained,
                }))?;
            } else {
                sweeper.spawn(token).await?;
            }
        }
    }

    Ok(())
}
