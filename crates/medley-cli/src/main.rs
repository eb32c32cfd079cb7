//! Medley CLI — upload files through the local queue and manage assets via
//! the Medley API.
//!
//! Uploads run in-process: the configured asset store backends are driven
//! directly by the upload queue, then each completed transfer is registered
//! with the API. The other commands are plain API calls; set MEDLEY_API_URL.

use std::path::PathBuf;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;

use medley_cli::{guess_content_type, init_tracing, ApiClient};
use medley_core::Config;
use medley_storage::create_backends;
use medley_uploader::{UploadEvent, UploadFile, UploadQueue, UploadQueueConfig};

#[derive(Parser)]
#[command(name = "medley", about = "Medley media CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files through the queue and register them
    Upload {
        /// Paths of the files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum concurrent transfers
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List all registered assets, newest first
    List,
    /// Get a single asset by id
    Get {
        /// Asset id
        id: String,
    },
    /// Bulk-delete assets by id
    Delete {
        /// Asset ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show or extend an asset's usage list
    Usage {
        /// Asset id
        id: String,
        /// Record a new usage reference instead of just listing
        #[arg(long)]
        add: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn upload(
    client: &ApiClient,
    paths: Vec<PathBuf>,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let backends = create_backends(&config).await?;

    let mut queue_config = UploadQueueConfig::from(config.upload);
    if let Some(n) = concurrency {
        queue_config.max_concurrent = n;
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?
            .to_string();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Read {}", path.display()))?;
        files.push(UploadFile {
            content_type: guess_content_type(&name).to_string(),
            name,
            data: Bytes::from(data),
        });
    }

    let expected = files.len();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let queue = UploadQueue::new(backends, queue_config, Some(event_tx));
    queue.enqueue(files).await?;

    let mut registered = Vec::new();
    let mut failures = 0usize;
    while let Some(event) = event_rx.recv().await {
        match event {
            UploadEvent::Completed { asset, .. } => {
                let stored = client
                    .register_asset(&asset)
                    .await
                    .with_context(|| format!("Register {}", asset.name))?;
                tracing::info!(asset_id = %stored.id, name = %stored.name, "Uploaded");
                registered.push(stored);
            }
            UploadEvent::Failed { name, error, .. } => {
                eprintln!("Upload failed: {name}: {error}");
                failures += 1;
            }
            UploadEvent::Drained => break,
        }
    }
    queue.shutdown().await;

    print_json(&registered)?;
    if failures > 0 {
        anyhow::bail!("{failures} of {expected} uploads failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let client = ApiClient::from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Upload { files, concurrency } => {
            upload(&client, files, concurrency).await?;
        }
        Commands::List => {
            let assets = client.list_assets().await?;
            print_json(&assets)?;
        }
        Commands::Get { id } => {
            let asset = client.get_asset(&id).await?;
            print_json(&asset)?;
        }
        Commands::Delete { ids } => {
            let response = client
                .bulk(&serde_json::json!({ "operation": "delete", "ids": ids }))
                .await?;
            print_json(&response)?;
        }
        Commands::Usage { id, add } => {
            if let Some(reference) = add {
                let usage = client.add_usage(&id, &reference).await?;
                print_json(&usage)?;
            } else {
                let response = client
                    .bulk(&serde_json::json!({ "operation": "usage", "ids": [id] }))
                    .await?;
                print_json(&response)?;
            }
        }
    }

    Ok(())
}
