//! Per-symbol engine: admission, matching, and cancel for one book, in a
//! propose / commit-or-abort shape.
//!
//! Every mutating call applies its change to the book immediately and
//! returns a [`Proposal`] carrying the outcome, the [`StateDelta`] to
//! persist, and the undo log. The caller then either
//! [commits](SymbolEngine::commit) it (the change stays) or
//! [aborts](SymbolEngine::abort) it (the book is restored exactly). No
//! other operation may run against the engine while a proposal is pending.
//!
//! The engine itself has no notion of concurrency or I/O; the server's
//! coordinator wraps it in a single-writer task.

use std::sync::Arc;

use crate::error::{EngineError, ValidationError};
use crate::ids::{IdGenerator, MonotonicClock};
use crate::matching_engine::match_order;
use crate::messages::{NewOrder, StateDelta, Trade};
use crate::order::{Order, OrderId, OrderStatus};
use crate::order_book::{BookSnapshot, OrderBook, UndoLog};
use crate::side::Side;

/// Result of a submit: the incoming order's final state and its trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub order: Order,
    pub trades: Vec<Trade>,
}

/// A book change that has been applied but not yet committed.
#[derive(Debug)]
#[must_use = "a proposal must be committed or aborted"]
pub struct Proposal<T> {
    pub outcome: T,
    pub delta: StateDelta,
    undo: UndoLog,
}

/// Order book plus the clock and id source needed to admit orders into it.
#[derive(Debug)]
pub struct SymbolEngine {
    book: OrderBook,
    clock: MonotonicClock,
    ids: Arc<IdGenerator>,
}

impl SymbolEngine {
    pub fn new(symbol: impl Into<String>, ids: Arc<IdGenerator>) -> Self {
        Self::with_book(OrderBook::new(symbol), ids)
    }

    /// Wrap an existing (e.g. warm-started) book. The clock resumes after
    /// the newest resting order so new arrivals queue behind it.
    pub fn with_book(book: OrderBook, ids: Arc<IdGenerator>) -> Self {
        let newest = [Side::Buy, Side::Sell]
            .into_iter()
            .flat_map(|side| book.side_orders(side))
            .map(|o| o.created_at_ns)
            .max()
            .unwrap_or(0);
        SymbolEngine {
            book,
            clock: MonotonicClock::starting_after(newest),
            ids,
        }
    }

    pub fn symbol(&self) -> &str {
        self.book.symbol()
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn snapshot(&self) -> BookSnapshot {
        self.book.snapshot()
    }

    /// Validate, admit, and match a new order.
    ///
    /// Validation failures return before anything is touched. A fatal
    /// error during the pass is returned after a best-effort rollback.
    pub fn propose_submit(
        &mut self,
        request: &NewOrder,
    ) -> Result<Proposal<Submission>, EngineError> {
        let valid = request.validate()?;
        if valid.symbol != self.book.symbol() {
            return Err(ValidationError::SymbolMismatch {
                expected: self.book.symbol().to_string(),
                got: valid.symbol,
            }
            .into());
        }

        let now_ns = self.clock.now_ns();
        let mut order = Order::admit(self.ids.next_order_id(), valid, now_ns);
        let mut undo = UndoLog::new();

        let pass = match match_order(&mut self.book, &mut order, &self.ids, now_ns, &mut undo) {
            Ok(pass) => pass,
            Err(err) => {
                self.book.rollback(undo)?;
                return Err(err);
            }
        };

        let delta = StateDelta {
            new_orders: vec![order.clone()],
            updated_orders: pass.updated,
            new_trades: pass.trades.clone(),
        };
        Ok(Proposal {
            outcome: Submission {
                order,
                trades: pass.trades,
            },
            delta,
            undo,
        })
    }

    /// Take a resting order out of the book and mark it canceled.
    pub fn propose_cancel(&mut self, id: OrderId) -> Result<Proposal<Order>, EngineError> {
        let mut undo = UndoLog::new();
        let mut order = self
            .book
            .remove_logged(id, &mut undo)
            .ok_or(EngineError::NotResting(id))?;
        order.status = OrderStatus::Canceled;

        let delta = StateDelta {
            updated_orders: vec![order.clone()],
            ..Default::default()
        };
        Ok(Proposal {
            outcome: order,
            delta,
            undo,
        })
    }

    /// Keep the proposed change.
    pub fn commit<T>(&mut self, proposal: Proposal<T>) -> T {
        proposal.outcome
    }

    /// Restore the book to its state before the proposal.
    pub fn abort<T>(&mut self, proposal: Proposal<T>) -> Result<(), EngineError> {
        self.book.rollback(proposal.undo)
    }

    /// Full structural check of the book.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        self.book.check_invariants()
    }
}
