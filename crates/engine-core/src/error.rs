//! Error types for the core matching engine.
//!
//! Two families:
//! - [`ValidationError`]: a malformed admission request. Raised before
//!   any book mutation; the caller fixes the input and resubmits.
//! - [`EngineError`]: everything a proposed book operation can fail with.
//!   Validation and not-resting errors leave the book untouched; the
//!   [fatal](EngineError::is_fatal) ones mean the book broke its
//!   ordering/fill invariants and the owning coordinator must stop
//!   mutating that symbol.

use thiserror::Error;

use crate::order::OrderId;

/// Rejection of a malformed order request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    #[error("limit order requires a price")]
    MissingPrice,

    #[error("price must be positive, got {0}")]
    NonPositivePrice(i64),

    #[error("symbol must be non-empty")]
    EmptySymbol,

    #[error("invalid symbol {0:?}")]
    InvalidSymbol(String),

    #[error("order for {got} submitted to book {expected}")]
    SymbolMismatch { expected: String, got: String },
}

/// Failure of a proposed book operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The order is not resting in this book (unknown, filled, or
    /// already canceled).
    #[error("order {0} is not resting in the book")]
    NotResting(OrderId),

    /// A resting order or price level is inconsistent with the book's
    /// ordering/fill invariants.
    #[error("order book invariant violated: {0}")]
    InvariantViolation(String),

    /// Rollback could not locate an order it expected to restore.
    #[error("rollback failed for order {0}")]
    RollbackFailed(OrderId),
}

impl EngineError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        EngineError::InvariantViolation(msg.into())
    }

    /// Whether the book can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvariantViolation(_) | EngineError::RollbackFailed(_)
        )
    }
}
