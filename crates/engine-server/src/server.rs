//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Opens the [`Exchange`] over the given store.
//! - Accepts new TCP connections, up to `max_clients` at a time.
//! - Assigns each connection a `ClientId` and spawns its request loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::client;
use crate::config::Config;
use crate::exchange::Exchange;
use crate::persistence::PersistenceAdapter;
use crate::types::{ClientId, ClientRegistry};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_client_id() -> ClientId {
    ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Run the TCP server with the given configuration.
pub async fn run(config: Config, store: Arc<dyn PersistenceAdapter>) -> Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "listening");

    let exchange = Exchange::open(store, config.persist_timeout)
        .await
        .context("opening exchange")?;
    serve(listener, Arc::new(exchange), config.max_clients).await
}

/// Accept connections on an already bound listener until it fails.
pub async fn serve(
    listener: TcpListener,
    exchange: Arc<Exchange>,
    max_clients: usize,
) -> Result<()> {
    let clients: ClientRegistry = Arc::new(DashMap::new());

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        if clients.len() >= max_clients {
            warn!(%peer_addr, max_clients, "rejecting connection: max_clients reached");
            // Dropping the stream closes it.
            continue;
        }

        let client_id = next_client_id();
        info!(client = client_id.0, %peer_addr, "accepted connection");
        clients.insert(client_id, peer_addr);

        let clients = clients.clone();
        let exchange = exchange.clone();
        tokio::spawn(async move {
            match client::run_client(client_id, stream, exchange, clients).await {
                Ok(()) => info!(client = client_id.0, "client disconnected"),
                Err(err) => warn!(client = client_id.0, error = %err, "client error"),
            }
        });
    }
}
