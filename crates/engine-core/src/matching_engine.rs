//! The matching pass.
//!
//! [`match_order`] takes one book and one incoming order and walks the
//! opposite side in price-time priority:
//!
//! - each fill trades `min(incoming.remaining, resting.remaining)` at the
//!   *resting* order's price,
//! - a resting order that is used up is marked `Filled` and leaves the book,
//! - a partially used resting order keeps its place in the queue,
//! - the walk stops when the incoming order is done or nothing crosses.
//!
//! Afterwards the incoming order is resolved: `Filled` if nothing is left,
//! otherwise a market order is `Canceled` (immediate-or-cancel) and a limit
//! order rests in the book as `Open`.
//!
//! The function holds no state of its own; ids come from the passed
//! [`IdGenerator`], time from `now_ns`, and every book mutation is recorded
//! in the passed [`UndoLog`].

use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::messages::Trade;
use crate::order::{Order, OrderStatus};
use crate::order_book::{OrderBook, UndoLog};
use crate::order_type::OrderType;
use crate::side::Side;

/// What one matching pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPass {
    /// Trades in execution order.
    pub trades: Vec<Trade>,
    /// Post-pass state of every resting order the pass touched, in the
    /// order they were touched.
    pub updated: Vec<Order>,
    /// The incoming remainder was inserted into the book.
    pub rested: bool,
}

/// Match `incoming` against `book`, resolve its final status, and rest any
/// limit remainder.
pub fn match_order(
    book: &mut OrderBook,
    incoming: &mut Order,
    ids: &IdGenerator,
    now_ns: u64,
    undo: &mut UndoLog,
) -> Result<MatchPass, EngineError> {
    if !incoming.is_open() || incoming.remaining_qty == 0 {
        return Err(EngineError::invariant(format!(
            "incoming order {} is not matchable",
            incoming.id
        )));
    }
    let limit = incoming.crossing_limit();
    if incoming.order_type == OrderType::Limit && limit.is_none() {
        return Err(EngineError::invariant(format!(
            "limit order {} has no price",
            incoming.id
        )));
    }

    let mut pass = MatchPass::default();

    while incoming.remaining_qty > 0 {
        let Some(resting) = book.best_opposing(incoming.side, limit) else {
            break;
        };

        if !resting.is_open() || resting.remaining_qty == 0 {
            return Err(EngineError::invariant(format!(
                "resting order {} is {} with {} remaining",
                resting.id,
                resting.status.as_str(),
                resting.remaining_qty
            )));
        }
        // Trade price is passive (the resting order's level).
        let price = resting.price.ok_or_else(|| {
            EngineError::invariant(format!("resting order {} has no price", resting.id))
        })?;

        let resting_id = resting.id;
        let trade_qty = incoming.remaining_qty.min(resting.remaining_qty);

        if trade_qty < resting.remaining_qty {
            undo.record_reduced(resting_id, resting.remaining_qty);
            resting.fill(trade_qty);
            pass.updated.push(resting.clone());
        } else {
            let mut done = book
                .remove_logged(resting_id, undo)
                .ok_or_else(|| EngineError::invariant(format!("order {} vanished", resting_id)))?;
            done.fill(trade_qty);
            done.status = OrderStatus::Filled;
            pass.updated.push(done);
        }

        let (buy_order_id, sell_order_id) = match incoming.side {
            Side::Buy => (incoming.id, resting_id),
            Side::Sell => (resting_id, incoming.id),
        };
        incoming.fill(trade_qty);

        pass.trades.push(Trade {
            id: ids.next_trade_id(),
            symbol: incoming.symbol.clone(),
            buy_order_id,
            sell_order_id,
            price,
            quantity: trade_qty,
            created_at_ns: now_ns,
        });
    }

    if incoming.remaining_qty == 0 {
        incoming.status = OrderStatus::Filled;
    } else {
        match incoming.order_type {
            OrderType::Market => incoming.status = OrderStatus::Canceled,
            OrderType::Limit => {
                book.insert_logged(incoming.clone(), undo)?;
                pass.rested = true;
            }
        }
    }

    Ok(pass)
}
