//! Message types used by the core matching engine.
//!
//! These are **transport-agnostic** logical messages:
//! - [`NewOrder`]: a raw admission request, as handed over by whatever
//!   transport decoded it. Nothing in it has been checked yet.
//! - [`ValidOrder`]: the same request after [`NewOrder::validate`].
//! - [`Trade`]: an immutable execution record.
//! - [`StateDelta`]: everything one submit/cancel changed, handed to the
//!   persistence layer as a single all-or-nothing unit.
//!
//! Encoders live in the `engine-protocol` crate; this module is purely
//! logical.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::order::{Order, OrderId};
use crate::order_type::OrderType;
use crate::side::Side;

/// Maximum symbol length in bytes.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Process-unique trade identifier.
pub type TradeId = u64;

/// New order request (input).
///
/// Quantity and price are signed so that a transport can pass through
/// whatever the client sent and let validation reject it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Instrument symbol, e.g. `"IBM"` or `"BTC-USD"`.
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Price in integer ticks. Required for limit, ignored for market.
    #[serde(default)]
    pub price: Option<i64>,
    pub quantity: i64,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidOrder {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<u64>,
    pub quantity: u64,
}

impl NewOrder {
    pub fn limit(symbol: impl Into<String>, side: Side, price: i64, quantity: i64) -> Self {
        NewOrder {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
        }
    }

    pub fn market(symbol: impl Into<String>, side: Side, quantity: i64) -> Self {
        NewOrder {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
        }
    }

    /// Check the request and normalize it.
    ///
    /// A price supplied with a market order is dropped.
    pub fn validate(&self) -> Result<ValidOrder, ValidationError> {
        validate_symbol(&self.symbol)?;

        if self.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }

        let price = match self.order_type {
            OrderType::Market => None,
            OrderType::Limit => match self.price {
                None => return Err(ValidationError::MissingPrice),
                Some(p) if p <= 0 => return Err(ValidationError::NonPositivePrice(p)),
                Some(p) => Some(p as u64),
            },
        };

        Ok(ValidOrder {
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: self.order_type,
            price,
            quantity: self.quantity as u64,
        })
    }
}

/// Symbols are short, non-empty, and free of separators used by the
/// line codecs.
pub fn validate_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if symbol.len() > MAX_SYMBOL_LEN
        || symbol.chars().any(|c| c.is_whitespace() || c == ',')
    {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }
    Ok(())
}

/// Trade event (output). Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    /// Execution price: always the resting order's price.
    pub price: u64,
    pub quantity: u64,
    pub created_at_ns: u64,
}

/// The full set of changes produced by one coordinator operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Orders admitted by this operation (final state).
    pub new_orders: Vec<Order>,
    /// Previously admitted orders whose state changed (final state).
    pub updated_orders: Vec<Order>,
    pub new_trades: Vec<Trade>,
}
