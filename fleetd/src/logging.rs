//! Structured logging setup (§10.3): `tracing` + `tracing-subscriber`,
//! initialized once before any other component touches disk or network.

use std::path::PathBuf;

use eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber, writing to stderr. `log_level`
/// seeds the default filter when `RUST_LOG` is unset.
pub fn init(log_level: &str) -> Result<()> {
    let log_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("fleetd").join("logs");
    std::fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(?log_dir, "logging initialized");
    Ok(())
}
