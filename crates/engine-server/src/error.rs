//! Errors surfaced by coordinators and the exchange.

use engine_core::{EngineError, OrderId, OrderStatus, ValidationError};
use engine_protocol::{ErrorKind, Response};
use thiserror::Error;

use crate::persistence::PersistenceError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {id} is {}", .status.as_str())]
    NotCancelable { id: OrderId, status: OrderStatus },

    /// Nothing was applied; the caller may retry.
    #[error("not applied: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("symbol {symbol} is halted")]
    Halted { symbol: String },

    #[error(transparent)]
    Engine(EngineError),

    #[error("coordinator for {symbol} is unavailable")]
    Unavailable { symbol: String },
}

impl From<EngineError> for CoordinatorError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(v) => CoordinatorError::Validation(v),
            other => CoordinatorError::Engine(other),
        }
    }
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::Validation(_) => ErrorKind::Validation,
            CoordinatorError::NotFound(_) => ErrorKind::NotFound,
            CoordinatorError::NotCancelable { .. } => ErrorKind::NotCancelable,
            CoordinatorError::Persistence(_) => ErrorKind::Persistence,
            CoordinatorError::Halted { .. } => ErrorKind::Halted,
            CoordinatorError::Engine(_) | CoordinatorError::Unavailable { .. } => {
                ErrorKind::Internal
            }
        }
    }

    pub fn to_response(&self) -> Response {
        Response::error(self.kind(), self.to_string())
    }
}
