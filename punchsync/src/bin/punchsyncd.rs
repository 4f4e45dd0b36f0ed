//! Punch sync daemon
//!
//! ```text
//! punchsyncd [config.toml]
//! ```
//!
//! The config path may also come from `PUNCHSYNC_CONFIG`. Without one the
//! daemon starts with defaults and no devices. Log level follows `RUST_LOG`
//! (default `info`).

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use punchsync::{InMemoryAttendanceStore, Reconciler, SyncConfig, SyncCoordinator};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config() -> anyhow::Result<SyncConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PUNCHSYNC_CONFIG").ok());

    match path {
        Some(path) => SyncConfig::load(&path).with_context(|| format!("loading config {}", path)),
        None => {
            warn!("No config given; running with defaults and no devices");
            let mut config = SyncConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config()?;
    info!(
        "Loaded {} devices and {} employees",
        config.devices.len(),
        config.employees.len()
    );

    let store = Arc::new(InMemoryAttendanceStore::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(config.employee_directory()),
        store.clone(),
    ));

    let coordinator = SyncCoordinator::new(Arc::new(config.device_directory()), reconciler)
        .with_options(config.options());

    coordinator.start().await.context("starting sync")?;

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Interrupted");

    coordinator.stop().await;

    let status = coordinator.status();
    info!(
        "Final stats: {} applied, {} malformed, {} failed",
        status.stats.applied, status.stats.malformed_records, status.stats.failed
    );
    for record in store.records() {
        info!("{}", record);
    }

    Ok(())
}
