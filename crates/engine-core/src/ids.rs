//! Identifier and timestamp sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::messages::TradeId;
use crate::order::OrderId;

/// Hands out order ids and trade ids from two independent sequences.
///
/// Shared by every symbol in the process, so ids are unique across
/// symbols and increase in admission order within one symbol.
#[derive(Debug)]
pub struct IdGenerator {
    next_order: AtomicU64,
    next_trade: AtomicU64,
}

impl IdGenerator {
    /// Fresh generator: first order id and first trade id are both 1.
    pub fn new() -> Self {
        Self::starting_after(0, 0)
    }

    /// Generator whose first ids are `last_order_id + 1` and
    /// `last_trade_id + 1`.
    pub fn starting_after(last_order_id: OrderId, last_trade_id: TradeId) -> Self {
        IdGenerator {
            next_order: AtomicU64::new(last_order_id + 1),
            next_trade: AtomicU64::new(last_trade_id + 1),
        }
    }

    pub fn next_order_id(&self) -> OrderId {
        self.next_order.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_trade_id(&self) -> TradeId {
        self.next_trade.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-symbol clock that never repeats or goes backwards.
#[derive(Debug, Clone, Default)]
pub struct MonotonicClock {
    last_ns: u64,
}

impl MonotonicClock {
    /// Clock that will only return values strictly greater than `last_ns`.
    pub fn starting_after(last_ns: u64) -> Self {
        MonotonicClock { last_ns }
    }

    /// `max(wall clock, last + 1)`.
    pub fn now_ns(&mut self) -> u64 {
        let ts = current_timestamp_ns().max(self.last_ns.saturating_add(1));
        self.last_ns = ts;
        ts
    }
}

/// Get the current timestamp in nanoseconds since the Unix epoch.
pub fn current_timestamp_ns() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs()
        .saturating_mul(1_000_000_000)
        .saturating_add(now.subsec_nanos() as u64)
}
