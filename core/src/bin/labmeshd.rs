//! labmeshd - Labmesh core daemon
//!
//! Boots the orchestration core, waits for Ctrl-C and drains it.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use labmesh_core::{
    precompute_image_checksums, BackgroundJob, CoreConfig, HttpTransport, JsonComputeStore,
    LifecycleSequencer,
};

#[derive(Parser)]
#[command(name = "labmeshd")]
#[command(version = labmesh_core::VERSION)]
#[command(about = "Labmesh orchestration daemon", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match cli.config {
        Some(path) => CoreConfig::load(&path)?,
        None => CoreConfig::default(),
    };
    info!(version = labmesh_core::VERSION, "labmeshd starting");

    let store = Arc::new(JsonComputeStore::new(config.computes_file.clone()));
    let transport = Arc::new(HttpTransport::new(config.connect_timeout()));

    let mut sequencer = LifecycleSequencer::new(config.clone(), store, transport);
    let images_dir = config.images_dir.clone();
    sequencer.add_background_job(BackgroundJob::new("image-checksums", async move {
        precompute_image_checksums(images_dir).await.map(|_| ())
    }));

    if let Err(e) = sequencer.startup().await {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    sequencer.shutdown().await?;
    Ok(())
}
