//! FlightLens API Server
//!
//! Run with: cargo run --bin flightlens-api [-- path/to/config.toml]
//!
//! # Configuration
//!
//! Without a path the first of `~/.config/flightlens/config.toml`,
//! `/etc/flightlens/config.toml` and `./config.toml` that exists is used.
//! Environment variables override the file:
//! - `FLIGHTLENS_HOST`, `FLIGHTLENS_PORT`: Bind address (default: 0.0.0.0:5000)
//! - `FLIGHTLENS_MAX_BODY_MB`: Request body limit (default: 20)
//! - `FLIGHTLENS_WORK_DIR`: Upload scratch space
//! - `FLIGHTLENS_STORE`: `sqlite`, `file` or `memory` (default: sqlite)
//! - `FLIGHTLENS_DATA_DIR`: Profile store directory
//! - `FLIGHTLENS_LOG_LEVEL`, `FLIGHTLENS_LOG_FORMAT`: Logging (`RUST_LOG` also works)

use anyhow::Context;
use flightlens::api::{serve, AppState};
use flightlens::config::Config;
use flightlens::logging::init_tracing;
use flightlens::persistence::open_store;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Config::load_with_env(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_default(),
    };

    init_tracing(&config.logging).context("failed to initialize tracing")?;

    tracing::info!("Starting FlightLens API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Upload work dir: {:?}", config.uploads.work_dir);

    let profiles = open_store(&config.persistence);
    tracing::info!(backend = profiles.backend_name(), "Profile store ready");

    let state = AppState::new(&config, profiles);
    let reaper = Arc::clone(&state.assembler).start_reaper();

    serve(state, &config.api).await?;

    reaper.abort();
    tracing::info!("FlightLens API server stopped");

    Ok(())
}
