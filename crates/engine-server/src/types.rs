//! Shared types for the engine TCP server.
//!
//! - `ClientId`: a lightweight handle for connected clients
//! - `ClientRegistry`: who is connected, used to enforce `max_clients`
//! - `WireFormat`: the line format a connection speaks

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

/// Identifier for a connected client.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// Registry of connected clients and their peer addresses.
pub type ClientRegistry = Arc<DashMap<ClientId, SocketAddr>>;

/// Line format of a connection, fixed by its first request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Csv,
}

impl WireFormat {
    /// JSON requests are objects; anything else is read as CSV.
    pub fn detect(first_line: &str) -> Self {
        if first_line.trim_start().starts_with('{') {
            WireFormat::Json
        } else {
            WireFormat::Csv
        }
    }
}
