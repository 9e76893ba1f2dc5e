//! facelogd - camera face-log ingestion service.
//!
//! Receives batches of face detections from camera devices, resolves each to
//! a persistent identity, logs the sightings and pushes them to live
//! dashboards.

mod config;
mod server;
mod service;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use facelog_faceid::{store, MemoryCameraLog, MemoryCatalog, Resolver, ResolverConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::service::Service;

/// Camera face-log ingestion service.
#[derive(Parser, Debug)]
#[command(name = "facelogd")]
#[command(about = "Camera face-log ingestion service with live identity broadcast")]
#[command(version)]
pub struct Args {
    /// Config file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address (e.g. :8080 or 127.0.0.1:8080)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Database file; omit to keep everything in memory
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Dashboard directory served at /; omit for the embedded index
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Maximum distance for a detection to match a known identity
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging; RUST_LOG takes precedence over -v.
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = ServiceConfig::load(&args)?;
    let resolver = Resolver::with_monotonic_ids(ResolverConfig {
        threshold: cfg.threshold,
    })?;

    let service = match &cfg.data {
        Some(path) => {
            let (catalog, log) = store::open(path)?;
            info!(path = %path.display(), "using persistent store");
            Service::new(resolver, Box::new(catalog), Box::new(log), cfg.live_buffer)
        }
        None => {
            info!("using in-memory store");
            Service::new(
                resolver,
                Box::new(MemoryCatalog::new()),
                Box::new(MemoryCameraLog::new()),
                cfg.live_buffer,
            )
        }
    };

    info!(threshold = cfg.threshold, "identity resolver ready");
    server::serve(&cfg.listen, Arc::new(service), cfg.static_dir).await
}
