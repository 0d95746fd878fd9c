//! engine-core
//!
//! Pure matching engine logic:
//! - order / trade model and admission validation
//! - per-symbol order book (price-time priority)
//! - the matching pass
//! - per-symbol engine with propose / commit-or-abort semantics
//!
//! Nothing here does I/O or knows about threads; the server crate puts a
//! single-writer coordinator and a persistence adapter around it.

pub mod side;
pub mod order_type;
pub mod messages;
pub mod order;
pub mod order_book;
pub mod matching_engine;
pub mod symbol_engine;
pub mod ids;
pub mod error;

pub use side::Side;
pub use order_type::OrderType;

pub use messages::{validate_symbol, NewOrder, StateDelta, Trade, TradeId, ValidOrder};

pub use order::{Order, OrderId, OrderStatus};
pub use order_book::{BookSnapshot, OrderBook, UndoLog};
pub use matching_engine::{match_order, MatchPass};
pub use symbol_engine::{Proposal, Submission, SymbolEngine};
pub use ids::{IdGenerator, MonotonicClock};
pub use error::{EngineError, ValidationError};
