//! Multi-symbol router.
//!
//! Owns the store, the process-wide id generator, and one
//! [`SymbolCoordinator`] per symbol, created (and warm-started) by the
//! first `submit` or `cancel` that needs it. Requests for different symbols
//! never wait on each other once their coordinators exist.
//!
//! Reads never start a coordinator. A symbol without one has no writer, so
//! its reads go straight to the store while the spawn lock keeps a writer
//! from appearing mid-read.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use engine_core::{
    validate_symbol, BookSnapshot, IdGenerator, NewOrder, Order, OrderBook, OrderId, Submission,
    Trade,
};
use engine_protocol::{Request, Response};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::coordinator::SymbolCoordinator;
use crate::error::CoordinatorError;
use crate::persistence::{PersistenceAdapter, PersistenceError};

pub struct Exchange {
    store: Arc<dyn PersistenceAdapter>,
    ids: Arc<IdGenerator>,
    persist_timeout: Duration,
    symbols: DashMap<String, SymbolCoordinator>,
    spawn_lock: Mutex<()>,
}

/// Where a read for one symbol is served from.
enum Reader<'a> {
    Running(SymbolCoordinator),
    /// No coordinator exists, and none can start while this is held.
    Idle(MutexGuard<'a, ()>),
}

impl Exchange {
    /// Open an exchange over `store`, continuing its id sequences.
    pub async fn open(
        store: Arc<dyn PersistenceAdapter>,
        persist_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let last = store.last_ids().await?;
        info!(
            last_order_id = last.order_id,
            last_trade_id = last.trade_id,
            "exchange opened"
        );
        Ok(Exchange {
            store,
            ids: Arc::new(IdGenerator::starting_after(last.order_id, last.trade_id)),
            persist_timeout,
            symbols: DashMap::new(),
            spawn_lock: Mutex::new(()),
        })
    }

    /// Coordinator for `symbol`, spawning it on first use.
    pub async fn coordinator(&self, symbol: &str) -> Result<SymbolCoordinator, CoordinatorError> {
        if let Some(existing) = self.running(symbol) {
            return Ok(existing);
        }

        let _guard = self.spawn_lock.lock().await;
        if let Some(existing) = self.running(symbol) {
            return Ok(existing);
        }
        let coordinator = SymbolCoordinator::spawn(
            symbol,
            self.store.clone(),
            self.ids.clone(),
            self.persist_timeout,
        )
        .await?;
        self.symbols.insert(symbol.to_string(), coordinator.clone());
        Ok(coordinator)
    }

    fn running(&self, symbol: &str) -> Option<SymbolCoordinator> {
        self.symbols.get(symbol).map(|entry| entry.value().clone())
    }

    async fn reader(&self, symbol: &str) -> Reader<'_> {
        if let Some(existing) = self.running(symbol) {
            return Reader::Running(existing);
        }
        let guard = self.spawn_lock.lock().await;
        match self.running(symbol) {
            Some(existing) => Reader::Running(existing),
            None => Reader::Idle(guard),
        }
    }

    pub async fn submit(&self, order: NewOrder) -> Result<Submission, CoordinatorError> {
        order.validate()?;
        self.coordinator(&order.symbol).await?.submit(order).await
    }

    /// Cancel a resting order, wherever it rests. The owning coordinator
    /// decides whether it is still cancelable.
    pub async fn cancel(&self, id: OrderId) -> Result<Order, CoordinatorError> {
        let known = self
            .store
            .load_order(id)
            .await?
            .ok_or(CoordinatorError::NotFound(id))?;
        self.coordinator(&known.symbol).await?.cancel(id).await
    }

    pub async fn order_book(&self, symbol: &str) -> Result<Arc<BookSnapshot>, CoordinatorError> {
        validate_symbol(symbol)?;
        let _idle = match self.reader(symbol).await {
            Reader::Running(coordinator) => return coordinator.snapshot(),
            Reader::Idle(guard) => guard,
        };
        let resting = self.store.load_open_orders(symbol).await?;
        match OrderBook::from_resting(symbol, resting) {
            Ok(book) => Ok(Arc::new(book.snapshot())),
            Err(err) => {
                warn!(symbol, %err, "stored open orders do not form a valid book");
                Err(CoordinatorError::Halted {
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    pub async fn trades(&self, symbol: &str) -> Result<Vec<Trade>, CoordinatorError> {
        validate_symbol(symbol)?;
        let _idle = match self.reader(symbol).await {
            Reader::Running(coordinator) => return coordinator.trades().await,
            Reader::Idle(guard) => guard,
        };
        Ok(self.store.load_trades(symbol).await?)
    }

    pub async fn order(&self, id: OrderId) -> Result<Order, CoordinatorError> {
        let known = self
            .store
            .load_order(id)
            .await?
            .ok_or(CoordinatorError::NotFound(id))?;
        match self.reader(&known.symbol).await {
            Reader::Running(coordinator) => coordinator.order(id).await,
            // Nothing has ever written this symbol's orders in this process.
            Reader::Idle(_) => Ok(known),
        }
    }

    /// Symbols with a running coordinator.
    pub fn symbols(&self) -> Vec<String> {
        self.symbols.iter().map(|e| e.key().clone()).collect()
    }

    /// Serve one wire request.
    pub async fn handle(&self, request: Request) -> Response {
        debug!(?request, "request");
        let result = match request {
            Request::Submit(order) => self
                .submit(order)
                .await
                .map(|s| Response::Order {
                    order: s.order,
                    trades: s.trades,
                }),
            Request::Cancel { id } => self
                .cancel(id)
                .await
                .map(|order| Response::Canceled { order }),
            Request::OrderBook { symbol } => self
                .order_book(&symbol)
                .await
                .map(|snapshot| Response::order_book(&snapshot)),
            Request::Trades { symbol } => self
                .trades(&symbol)
                .await
                .map(|trades| Response::Trades { symbol, trades }),
            Request::OrderStatus { id } => self
                .order(id)
                .await
                .map(|order| Response::OrderStatus { order }),
        };
        result.unwrap_or_else(|err| {
            debug!(%err, "request rejected");
            err.to_response()
        })
    }
}
