//! Single-symbol order book with price-time priority.
//!
//! - One instance per symbol.
//! - Bids: descending by price (best = highest).
//! - Asks: ascending by price (best = lowest).
//! - FIFO (time-priority) within each price level.
//!
//! Every order held here is a *resting* order: status `Open` and
//! `remaining_qty > 0`. An order leaves the book the moment it becomes
//! `Filled` or `Canceled`.
//!
//! Mutations that may have to be undone (a matching pass, a cancel) go
//! through the `*_logged` methods, which record enough in an [`UndoLog`]
//! for [`OrderBook::rollback`] to restore the exact previous book,
//! including each order's position within its level.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::order::{Order, OrderId};
use crate::side::Side;

type Levels = BTreeMap<u64, VecDeque<Order>>;

/// Single-symbol order book.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,

    /// Bids: price -> FIFO queue of orders at that price.
    ///
    /// We use `BTreeMap` so keys are sorted ascending; we treat the
    /// highest key as best bid.
    bids: Levels,

    /// Asks: price -> FIFO queue of orders at that price.
    ///
    /// We use `BTreeMap` so keys are sorted ascending; we treat the
    /// lowest key as best ask.
    asks: Levels,

    /// Order id -> (side, price) of the level holding it.
    index: HashMap<OrderId, (Side, u64)>,
}

/// Point-in-time, owned copy of the resting orders of one book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    /// Price descending, then time ascending.
    pub bids: Vec<Order>,
    /// Price ascending, then time ascending.
    pub asks: Vec<Order>,
}

impl BookSnapshot {
    pub fn side(&self, side: Side) -> &[Order] {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }
}

/// Record of book mutations, replayed backwards by [`OrderBook::rollback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoLog {
    entries: Vec<UndoEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum UndoEntry {
    /// A new resting order was appended.
    Inserted(OrderId),
    /// A resting order's remaining quantity was reduced in place.
    Reduced { id: OrderId, previous_remaining: u64 },
    /// A resting order was taken out of its level at `position`.
    Removed { order: Order, position: usize },
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn record_reduced(&mut self, id: OrderId, previous_remaining: u64) {
        self.entries.push(UndoEntry::Reduced {
            id,
            previous_remaining,
        });
    }
}

/// Whether a resting order at `resting_price` satisfies the price condition
/// of an incoming order on `incoming_side` bounded by `limit`
/// (`None` = market, crosses everything).
pub fn crosses(incoming_side: Side, limit: Option<u64>, resting_price: u64) -> bool {
    match limit {
        None => true,
        Some(limit) => match incoming_side {
            Side::Buy => resting_price <= limit,
            Side::Sell => resting_price >= limit,
        },
    }
}

impl OrderBook {
    /// Create a new order book for the given symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        OrderBook {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild a book from persisted open orders.
    ///
    /// Orders are re-queued by (creation time, id), so the rebuilt book has
    /// the same priority as the one that produced them. Any order that
    /// cannot legally rest is an invariant violation.
    pub fn from_resting(
        symbol: impl Into<String>,
        mut orders: Vec<Order>,
    ) -> Result<Self, EngineError> {
        let mut book = OrderBook::new(symbol);
        orders.sort_by_key(|o| (o.created_at_ns, o.id));
        for order in orders {
            book.insert(order)?;
        }
        book.check_invariants()?;
        Ok(book)
    }

    /// Returns the symbol of this book.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Number of resting orders on both sides.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Look up a resting order by id.
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let (side, price) = *self.index.get(&id)?;
        self.levels(side).get(&price)?.iter().find(|o| o.id == id)
    }

    /// Add a resting order at the back of its price level.
    pub fn insert(&mut self, order: Order) -> Result<(), EngineError> {
        let price = self.check_restable(&order)?;
        self.index.insert(order.id, (order.side, price));
        self.levels_mut(order.side)
            .entry(price)
            .or_default()
            .push_back(order);
        Ok(())
    }

    /// [`insert`](Self::insert), recording the change in `undo`.
    pub fn insert_logged(&mut self, order: Order, undo: &mut UndoLog) -> Result<(), EngineError> {
        let id = order.id;
        self.insert(order)?;
        undo.entries.push(UndoEntry::Inserted(id));
        Ok(())
    }

    /// Delete a resting order, returning it.
    pub fn remove(&mut self, id: OrderId) -> Option<Order> {
        self.take(id).map(|(order, _)| order)
    }

    /// [`remove`](Self::remove), recording the order and its queue position
    /// in `undo`.
    pub fn remove_logged(&mut self, id: OrderId, undo: &mut UndoLog) -> Option<Order> {
        let (order, position) = self.take(id)?;
        undo.entries.push(UndoEntry::Removed {
            order: order.clone(),
            position,
        });
        Some(order)
    }

    /// Head of the best opposite level that crosses `limit`.
    ///
    /// Calling this again after the returned order was consumed and
    /// removed yields the next candidate in priority order, so the matching
    /// loop always sees the book as its own previous steps left it.
    pub fn best_opposing(
        &mut self,
        incoming_side: Side,
        limit: Option<u64>,
    ) -> Option<&mut Order> {
        let (price, queue) = match incoming_side {
            Side::Buy => self.asks.iter_mut().next()?,
            Side::Sell => self.bids.iter_mut().next_back()?,
        };
        if !crosses(incoming_side, limit, *price) {
            return None;
        }
        queue.front_mut()
    }

    /// All resting orders an incoming order on `incoming_side` bounded by
    /// `limit` could match, in matching priority.
    pub fn opposing(
        &self,
        incoming_side: Side,
        limit: Option<u64>,
    ) -> impl Iterator<Item = &Order> + '_ {
        self.priced_side(incoming_side.opposite())
            .take_while(move |(price, _)| crosses(incoming_side, limit, *price))
            .map(|(_, order)| order)
    }

    /// Resting orders of one side in priority order.
    pub fn side_orders(&self, side: Side) -> impl Iterator<Item = &Order> + '_ {
        self.priced_side(side).map(|(_, order)| order)
    }

    /// Get best bid price, if any.
    pub fn best_bid_price(&self) -> Option<u64> {
        self.bids.keys().next_back().copied()
    }

    /// Get best ask price, if any.
    pub fn best_ask_price(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    /// Owned copy of both sides in priority order.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            symbol: self.symbol.clone(),
            bids: self.side_orders(Side::Buy).cloned().collect(),
            asks: self.side_orders(Side::Sell).cloned().collect(),
        }
    }

    /// Undo every change recorded in `undo`, newest first.
    pub fn rollback(&mut self, undo: UndoLog) -> Result<(), EngineError> {
        for entry in undo.entries.into_iter().rev() {
            match entry {
                UndoEntry::Inserted(id) => {
                    self.take(id).ok_or(EngineError::RollbackFailed(id))?;
                }
                UndoEntry::Reduced {
                    id,
                    previous_remaining,
                } => {
                    let order = self.get_mut(id).ok_or(EngineError::RollbackFailed(id))?;
                    order.remaining_qty = previous_remaining;
                }
                UndoEntry::Removed { order, position } => {
                    self.restore_at(order, position)?;
                }
            }
        }
        Ok(())
    }

    /// Verify the structural invariants of the book.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let mut seen = 0usize;
        for side in [Side::Buy, Side::Sell] {
            for (&price, queue) in self.levels(side) {
                if queue.is_empty() {
                    return Err(EngineError::invariant(format!(
                        "empty {} level at {}",
                        side.as_str(),
                        price
                    )));
                }
                let mut last_ts = 0u64;
                for order in queue {
                    seen += 1;
                    if order.side != side || order.price != Some(price) {
                        return Err(EngineError::invariant(format!(
                            "order {} misplaced at {} {}",
                            order.id,
                            side.as_str(),
                            price
                        )));
                    }
                    if !order.is_open()
                        || order.remaining_qty == 0
                        || order.remaining_qty > order.quantity
                    {
                        return Err(EngineError::invariant(format!(
                            "order {} cannot rest: status {}, remaining {}/{}",
                            order.id,
                            order.status.as_str(),
                            order.remaining_qty,
                            order.quantity
                        )));
                    }
                    if order.symbol != self.symbol {
                        return Err(EngineError::invariant(format!(
                            "order {} belongs to {}",
                            order.id, order.symbol
                        )));
                    }
                    if order.created_at_ns < last_ts {
                        return Err(EngineError::invariant(format!(
                            "order {} breaks time priority at {}",
                            order.id, price
                        )));
                    }
                    last_ts = order.created_at_ns;
                    if self.index.get(&order.id) != Some(&(side, price)) {
                        return Err(EngineError::invariant(format!(
                            "index out of sync for order {}",
                            order.id
                        )));
                    }
                }
            }
        }
        if let (Some(bid), Some(ask)) = (self.best_bid_price(), self.best_ask_price()) {
            if bid >= ask {
                return Err(EngineError::invariant(format!(
                    "book is crossed: best bid {} >= best ask {}",
                    bid, ask
                )));
            }
        }
        if seen != self.index.len() {
            return Err(EngineError::invariant(format!(
                "index holds {} ids for {} resting orders",
                self.index.len(),
                seen
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn levels(&self, side: Side) -> &Levels {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut Levels {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// `(level price, order)` pairs of one side in priority order.
    fn priced_side(&self, side: Side) -> Box<dyn Iterator<Item = (u64, &Order)> + '_> {
        fn flatten<'a>(
            (price, queue): (&'a u64, &'a VecDeque<Order>),
        ) -> impl Iterator<Item = (u64, &'a Order)> {
            queue.iter().map(move |o| (*price, o))
        }
        match side {
            Side::Buy => Box::new(self.bids.iter().rev().flat_map(flatten)),
            Side::Sell => Box::new(self.asks.iter().flat_map(flatten)),
        }
    }

    fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        let (side, price) = *self.index.get(&id)?;
        self.levels_mut(side)
            .get_mut(&price)?
            .iter_mut()
            .find(|o| o.id == id)
    }

    /// Remove an order and report where in its level it sat.
    fn take(&mut self, id: OrderId) -> Option<(Order, usize)> {
        let (side, price) = *self.index.get(&id)?;
        let levels = self.levels_mut(side);
        let queue = levels.get_mut(&price)?;
        let position = queue.iter().position(|o| o.id == id)?;
        let order = queue.remove(position)?;
        if queue.is_empty() {
            levels.remove(&price);
        }
        self.index.remove(&id);
        Some((order, position))
    }

    fn restore_at(&mut self, order: Order, position: usize) -> Result<(), EngineError> {
        let price = self.check_restable(&order)?;
        self.index.insert(order.id, (order.side, price));
        let queue = self.levels_mut(order.side).entry(price).or_default();
        let position = position.min(queue.len());
        queue.insert(position, order);
        Ok(())
    }

    /// Checks every order must pass to be held in the book; returns its price.
    fn check_restable(&self, order: &Order) -> Result<u64, EngineError> {
        if self.index.contains_key(&order.id) {
            return Err(EngineError::invariant(format!(
                "order {} is already resting",
                order.id
            )));
        }
        if order.symbol != self.symbol {
            return Err(EngineError::invariant(format!(
                "order {} for {} inserted into {}",
                order.id, order.symbol, self.symbol
            )));
        }
        if !order.is_open() || order.remaining_qty == 0 || order.remaining_qty > order.quantity {
            return Err(EngineError::invariant(format!(
                "order {} cannot rest: status {}, remaining {}/{}",
                order.id,
                order.status.as_str(),
                order.remaining_qty,
                order.quantity
            )));
        }
        order.price.ok_or_else(|| {
            EngineError::invariant(format!("order {} has no price to rest at", order.id))
        })
    }
}
