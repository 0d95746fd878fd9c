//! engine-server
//!
//! Per-symbol coordinators around the matching engine, the persistence
//! seam they write through, and a multi-client TCP line server.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod server;
pub mod types;

// internal module, not re-exported
mod client;

pub use config::Config;
pub use coordinator::SymbolCoordinator;
pub use error::CoordinatorError;
pub use exchange::Exchange;
pub use persistence::{LastIds, MemoryStore, PersistenceAdapter, PersistenceError};
