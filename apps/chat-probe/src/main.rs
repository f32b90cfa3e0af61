//! rentchat probe entry point.
//!
//! Connects to the chat broker, prints messages for one room and publishes
//! every line read from stdin.
//!
//! Usage: `rentchat-probe [config.toml]`

mod app;
mod config;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting rentchat probe");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = config::Config::load(path.as_deref())?;
    tracing::info!(
        base_url = %config.connection.base_url,
        room = %config.room,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("probe shut down cleanly");
    Ok(())
}
