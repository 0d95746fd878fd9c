//! Binary TCP server for the matching engine.

use std::sync::Arc;

use anyhow::Result;
use engine_server::{server, Config, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    info!(
        addr = %config.socket_addr_string(),
        max_clients = config.max_clients,
        persist_timeout_ms = config.persist_timeout.as_millis() as u64,
        "starting engine-server"
    );

    server::run(config, Arc::new(MemoryStore::new())).await
}
