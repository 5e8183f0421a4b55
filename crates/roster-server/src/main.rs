//! roster-server binary.
//!
//! Reads `roster.toml` (or the path given with `--config`), opens the SQLite
//! store, and serves the record API over HTTP.

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use roster_core::service::RecordService;
use roster_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Roster person-record server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "roster.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  let store = match server_cfg.store_file() {
    Some(path) => SqliteStore::open(&path)
      .await
      .with_context(|| format!("failed to open store at {path:?}"))?,
    None => {
      tracing::warn!("using an in-memory store; records will not survive a restart");
      SqliteStore::open_in_memory()
        .await
        .context("failed to open in-memory store")?
    }
  };

  if server_cfg.faults.enabled {
    tracing::warn!(one_in = server_cfg.faults.one_in, "synthetic create failures enabled");
  }

  let service = RecordService::new(Arc::new(store))
    .with_retry_policy(server_cfg.retry.policy())
    .with_faults(server_cfg.faults.injector())
    .with_max_page_size(server_cfg.max_page_size);

  let app = roster_api::api_router(Arc::new(service)).layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
