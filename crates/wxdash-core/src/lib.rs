pub mod config;

pub use config::{
    ApiConfig, Config, ServiceSettings, ServicesConfig, StorageConfig, ThemeConfig, Units,
    ValidationMode, ValidationResult,
};

use anyhow::Result;

/// Initialize tracing/logging for the process.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::info!("wxdash core initialized");
    Ok(())
}
