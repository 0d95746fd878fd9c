//! Logical request/response types shared by both line codecs.
//!
//! JSON shapes (one object per line):
//!
//! ```text
//! {"op":"submit","symbol":"X","side":"buy","type":"limit","price":10,"quantity":5}
//! {"op":"cancel","id":7}
//! {"op":"order_book","symbol":"X"}
//! {"op":"trades","symbol":"X"}
//! {"op":"order_status","id":7}
//! ```
//!
//! Responses are tagged by `"type"`: `order`, `canceled`, `order_book`,
//! `trades`, `order_status`, `error`.

use engine_core::{BookSnapshot, NewOrder, Order, OrderId, Trade};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A client request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Submit a new limit or market order.
    Submit(NewOrder),

    /// Cancel a resting order.
    Cancel { id: OrderId },

    /// Resting orders of a symbol, both sides.
    OrderBook { symbol: String },

    /// Trade history of a symbol, oldest first.
    Trades { symbol: String },

    /// Current state of one order.
    OrderStatus { id: OrderId },
}

/// A server response; exactly one per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Final state of a submitted order and the trades it caused.
    Order { order: Order, trades: Vec<Trade> },

    /// The order as it was canceled.
    Canceled { order: Order },

    /// `buy`: price descending/time ascending;
    /// `sell`: price ascending/time ascending.
    OrderBook {
        symbol: String,
        buy: Vec<Order>,
        sell: Vec<Order>,
    },

    Trades { symbol: String, trades: Vec<Trade> },

    OrderStatus { order: Order },

    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn order_book(snapshot: &BookSnapshot) -> Self {
        Response::OrderBook {
            symbol: snapshot.symbol.clone(),
            buy: snapshot.bids.clone(),
            sell: snapshot.asks.clone(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Stable error categories reported to clients.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed order; nothing changed.
    Validation,
    /// Unknown order id.
    NotFound,
    /// The order exists but is no longer open.
    NotCancelable,
    /// The store did not accept the change; nothing changed, safe to retry.
    Persistence,
    /// The symbol stopped accepting changes after an internal fault.
    Halted,
    /// The request line could not be decoded.
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotCancelable => "not_cancelable",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Halted => "halted",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Decoding/encoding failure of a single line.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid CSV line {line:?}: {reason}")]
    Csv { line: String, reason: String },
}

impl ProtocolError {
    pub(crate) fn csv(line: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Csv {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}
