//! Durable-state seam for the coordinators.
//!
//! A [`PersistenceAdapter`] receives one [`StateDelta`] per committed
//! operation and must apply it all-or-nothing. Coordinators bound every
//! `persist` call with a timeout and drop the future when it expires, so an
//! implementation must not leave a partially applied delta behind when its
//! future is dropped.
//!
//! [`MemoryStore`] is the in-process implementation used by the binary and
//! the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use engine_core::{Order, OrderId, OrderStatus, StateDelta, Trade, TradeId};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The store refused the write; nothing was applied.
    #[error("store rejected the write: {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store did not acknowledge within {0:?}")]
    TimedOut(Duration),
}

/// Highest ids the store has seen, used to seed the id generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastIds {
    pub order_id: OrderId,
    pub trade_id: TradeId,
}

#[async_trait]
pub trait PersistenceAdapter: Send + Sync + 'static {
    /// Apply one operation's changes atomically.
    async fn persist(&self, delta: &StateDelta) -> Result<(), PersistenceError>;

    /// Open orders of `symbol`, in any order.
    async fn load_open_orders(&self, symbol: &str) -> Result<Vec<Order>, PersistenceError>;

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError>;

    /// Trades of `symbol` in creation order.
    async fn load_trades(&self, symbol: &str) -> Result<Vec<Trade>, PersistenceError>;

    async fn last_ids(&self) -> Result<LastIds, PersistenceError>;
}

#[derive(Debug, Default)]
struct StoreState {
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

/// In-memory store with failure and latency injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    fail_next: AtomicUsize,
    latency_ms: AtomicU64,
    persists: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` persist calls.
    pub fn fail_next_persists(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every persist call by `latency` before it is applied.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of deltas applied so far.
    pub fn persisted_count(&self) -> u64 {
        self.persists.load(Ordering::SeqCst)
    }

    /// Write orders and trades directly, bypassing the coordinators.
    pub fn seed(
        &self,
        orders: impl IntoIterator<Item = Order>,
        trades: impl IntoIterator<Item = Trade>,
    ) {
        let mut state = self.state.write();
        for order in orders {
            state.orders.insert(order.id, order);
        }
        state.trades.extend(trades);
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn persist(&self, delta: &StateDelta) -> Result<(), PersistenceError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.take_injected_failure() {
            return Err(PersistenceError::Rejected("injected failure".to_string()));
        }

        let mut state = self.state.write();
        for order in delta.new_orders.iter().chain(&delta.updated_orders) {
            state.orders.insert(order.id, order.clone());
        }
        state.trades.extend(delta.new_trades.iter().cloned());
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_open_orders(&self, symbol: &str) -> Result<Vec<Order>, PersistenceError> {
        let state = self.state.read();
        Ok(state
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Open)
            .cloned()
            .collect())
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self.state.read().orders.get(&id).cloned())
    }

    async fn load_trades(&self, symbol: &str) -> Result<Vec<Trade>, PersistenceError> {
        let state = self.state.read();
        Ok(state
            .trades
            .iter()
            .filter(|t| t.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn last_ids(&self) -> Result<LastIds, PersistenceError> {
        let state = self.state.read();
        Ok(LastIds {
            order_id: state.orders.keys().copied().max().unwrap_or(0),
            trade_id: state.trades.iter().map(|t| t.id).max().unwrap_or(0),
        })
    }
}
