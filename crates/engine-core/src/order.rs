//! Order representation: the admitted, id-bearing order that lives in the
//! book and in the persistence store.

use serde::{Deserialize, Serialize};

use crate::messages::ValidOrder;
use crate::order_type::OrderType;
use crate::side::Side;

/// Process-unique, monotonically increasing order identifier.
pub type OrderId = u64;

/// Lifecycle state of an order.
///
/// `Open` is the only non-terminal state. `Filled` and `Canceled` are each
/// reached at most once and never left.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
        }
    }
}

/// A single admitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,

    /// Limit price in integer ticks; `None` for market orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,

    /// Original quantity.
    pub quantity: u64,
    /// Remaining unfilled quantity.
    #[serde(rename = "remaining_quantity")]
    pub remaining_qty: u64,
    pub status: OrderStatus,

    /// Time priority (nanoseconds since epoch, strictly increasing per symbol).
    pub created_at_ns: u64,
}

impl Order {
    /// Admit a validated request: status `Open`, remaining = quantity.
    pub fn admit(id: OrderId, request: ValidOrder, created_at_ns: u64) -> Self {
        Order {
            id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            quantity: request.quantity,
            remaining_qty: request.quantity,
            status: OrderStatus::Open,
            created_at_ns,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Fill the order by up to `qty` units.
    ///
    /// Returns the quantity that was actually filled (which will be
    /// `<= qty` and `<= remaining_qty`).
    pub fn fill(&mut self, qty: u64) -> u64 {
        let filled = qty.min(self.remaining_qty);
        self.remaining_qty -= filled;
        filled
    }

    /// The crossing bound used when walking the opposite side of the book.
    pub fn crossing_limit(&self) -> Option<u64> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit => self.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_book::crosses;

    fn limit(side: Side, price: u64, qty: u64) -> Order {
        Order {
            id: 1,
            symbol: "X".into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity: qty,
            remaining_qty: qty,
            status: OrderStatus::Open,
            created_at_ns: 1,
        }
    }

    #[test]
    fn fill_is_capped_at_remaining() {
        let mut o = limit(Side::Buy, 10, 5);
        assert_eq!(o.fill(3), 3);
        assert_eq!(o.fill(3), 2);
        assert_eq!(o.remaining_qty, 0);
        assert_eq!(o.fill(1), 0);
    }

    #[test]
    fn crossing_depends_on_side() {
        let buy = limit(Side::Buy, 10, 1);
        assert!(crosses(buy.side, buy.crossing_limit(), 9));
        assert!(crosses(buy.side, buy.crossing_limit(), 10));
        assert!(!crosses(buy.side, buy.crossing_limit(), 11));

        let sell = limit(Side::Sell, 10, 1);
        assert!(crosses(sell.side, sell.crossing_limit(), 11));
        assert!(!crosses(sell.side, sell.crossing_limit(), 9));
    }

    #[test]
    fn market_crosses_everything() {
        let mut m = limit(Side::Buy, 0, 1);
        m.order_type = OrderType::Market;
        m.price = None;
        assert_eq!(m.crossing_limit(), None);
        assert!(crosses(m.side, m.crossing_limit(), u64::MAX));
    }
}
