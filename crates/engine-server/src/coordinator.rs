//! Per-symbol coordinator.
//!
//! One task per symbol owns that symbol's [`SymbolEngine`] and processes
//! `submit` / `cancel` commands strictly one at a time, in the order they
//! arrived on its channel. Every mutation goes through
//! propose → persist → commit, or rollback when the store does not
//! acknowledge in time.
//!
//! Readers never talk to the task. After each commit it publishes an
//! immutable [`BookSnapshot`] on a `watch` channel, and trades/order state
//! come from the store. The task holds the symbol's visibility gate for
//! writing from persist through publish, and store reads take it for
//! reading, so a reader never sees a delta in the store whose book has not
//! been published yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_core::{
    validate_symbol, BookSnapshot, EngineError, IdGenerator, NewOrder, Order, OrderBook, OrderId,
    Proposal, Side, Submission, SymbolEngine, Trade,
};
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::CoordinatorError;
use crate::persistence::{PersistenceAdapter, PersistenceError};

type Reply<T> = oneshot::Sender<Result<T, CoordinatorError>>;

enum Command {
    Submit { order: NewOrder, reply: Reply<Submission> },
    Cancel { id: OrderId, reply: Reply<Order> },
}

/// Handle to a running coordinator. Cheap to clone; the task stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct SymbolCoordinator {
    symbol: Arc<str>,
    tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<Option<Arc<BookSnapshot>>>,
    halted: Arc<AtomicBool>,
    gate: Arc<RwLock<()>>,
    store: Arc<dyn PersistenceAdapter>,
}

impl SymbolCoordinator {
    /// Warm-start `symbol` from the store's open orders and spawn its task.
    ///
    /// Open orders that cannot form a valid book leave the coordinator
    /// halted from the start with no book to publish: book reads and
    /// mutations both answer `Halted`.
    pub async fn spawn(
        symbol: &str,
        store: Arc<dyn PersistenceAdapter>,
        ids: Arc<IdGenerator>,
        persist_timeout: Duration,
    ) -> Result<Self, CoordinatorError> {
        validate_symbol(symbol)?;
        let resting = store.load_open_orders(symbol).await?;
        let count = resting.len();

        let halted = Arc::new(AtomicBool::new(false));
        let (engine, published) = match OrderBook::from_resting(symbol, resting) {
            Ok(book) => {
                let engine = SymbolEngine::with_book(book, ids);
                let snapshot = Arc::new(engine.snapshot());
                (engine, Some(snapshot))
            }
            Err(err) => {
                error!(symbol, %err, "stored open orders do not form a valid book; halting symbol");
                halted.store(true, Ordering::SeqCst);
                (SymbolEngine::new(symbol, ids), None)
            }
        };
        info!(symbol, resting = count, "symbol coordinator started");

        let (snapshot_tx, snapshot_rx) = watch::channel(published);
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(RwLock::new(()));

        let worker = Worker {
            engine,
            store: store.clone(),
            persist_timeout,
            snapshot_tx,
            halted: halted.clone(),
            gate: gate.clone(),
        };
        tokio::spawn(worker.run(rx));

        Ok(SymbolCoordinator {
            symbol: Arc::from(symbol),
            tx,
            snapshot_rx,
            halted,
            gate,
            store,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn submit(&self, order: NewOrder) -> Result<Submission, CoordinatorError> {
        self.request(|reply| Command::Submit { order, reply }).await
    }

    pub async fn cancel(&self, id: OrderId) -> Result<Order, CoordinatorError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Last committed state of the book, or `Halted` when the stored book
    /// could not be loaded.
    pub fn snapshot(&self) -> Result<Arc<BookSnapshot>, CoordinatorError> {
        self.snapshot_rx
            .borrow()
            .clone()
            .ok_or_else(|| CoordinatorError::Halted {
                symbol: self.symbol.to_string(),
            })
    }

    /// Resting orders of one side, in priority order.
    pub fn resting(&self, side: Side) -> Result<Vec<Order>, CoordinatorError> {
        Ok(self.snapshot()?.side(side).to_vec())
    }

    /// Committed trades of this symbol.
    pub async fn trades(&self) -> Result<Vec<Trade>, CoordinatorError> {
        let _visible = self.gate.read().await;
        Ok(self.store.load_trades(&self.symbol).await?)
    }

    /// Committed state of an order of this symbol.
    pub async fn order(&self, id: OrderId) -> Result<Order, CoordinatorError> {
        let _visible = self.gate.read().await;
        match self.store.load_order(id).await? {
            Some(order) if *order.symbol == *self.symbol => Ok(order),
            _ => Err(CoordinatorError::NotFound(id)),
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    fn unavailable(&self) -> CoordinatorError {
        CoordinatorError::Unavailable {
            symbol: self.symbol.to_string(),
        }
    }
}

/// State owned by the coordinator task.
struct Worker {
    engine: SymbolEngine,
    store: Arc<dyn PersistenceAdapter>,
    persist_timeout: Duration,
    snapshot_tx: watch::Sender<Option<Arc<BookSnapshot>>>,
    halted: Arc<AtomicBool>,
    gate: Arc<RwLock<()>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Submit { order, reply } => {
                    let result = self.submit(order).await;
                    let _ = reply.send(result);
                }
                Command::Cancel { id, reply } => {
                    let result = self.cancel(id).await;
                    let _ = reply.send(result);
                }
            }
        }
        debug!(symbol = self.engine.symbol(), "coordinator shutting down");
    }

    async fn submit(&mut self, order: NewOrder) -> Result<Submission, CoordinatorError> {
        self.ensure_running()?;
        let proposal = match self.engine.propose_submit(&order) {
            Ok(p) => p,
            Err(err) => return Err(self.engine_failure(err)),
        };
        let submission = self.commit_durably(proposal).await?;
        debug!(
            symbol = self.engine.symbol(),
            id = submission.order.id,
            status = submission.order.status.as_str(),
            trades = submission.trades.len(),
            "order admitted"
        );
        Ok(submission)
    }

    async fn cancel(&mut self, id: OrderId) -> Result<Order, CoordinatorError> {
        self.ensure_running()?;
        let proposal = match self.engine.propose_cancel(id) {
            Ok(p) => p,
            Err(EngineError::NotResting(_)) => return Err(self.not_cancelable(id).await),
            Err(err) => return Err(self.engine_failure(err)),
        };
        let order = self.commit_durably(proposal).await?;
        debug!(symbol = self.engine.symbol(), id, "order canceled");
        Ok(order)
    }

    /// Persist the proposal's delta, then commit it; roll it back on any
    /// store failure.
    async fn commit_durably<T>(&mut self, proposal: Proposal<T>) -> Result<T, CoordinatorError> {
        let gate = self.gate.clone();
        let _publishing = gate.write().await;

        let persist = self.store.persist(&proposal.delta);
        let persisted = match timeout(self.persist_timeout, persist).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::TimedOut(self.persist_timeout)),
        };

        if let Err(err) = persisted {
            warn!(symbol = self.engine.symbol(), %err, "persist failed, rolling back");
            if let Err(fault) = self.engine.abort(proposal) {
                return Err(self.engine_failure(fault));
            }
            return Err(err.into());
        }

        let outcome = self.engine.commit(proposal);
        if cfg!(debug_assertions) {
            if let Err(fault) = self.engine.check_invariants() {
                self.halt(&fault);
                return Ok(outcome);
            }
        }
        self.snapshot_tx.send_replace(Some(Arc::new(self.engine.snapshot())));
        Ok(outcome)
    }

    async fn not_cancelable(&self, id: OrderId) -> CoordinatorError {
        match self.store.load_order(id).await {
            Ok(Some(order)) if order.symbol == self.engine.symbol() => {
                CoordinatorError::NotCancelable {
                    id,
                    status: order.status,
                }
            }
            Ok(_) => CoordinatorError::NotFound(id),
            Err(err) => err.into(),
        }
    }

    fn ensure_running(&self) -> Result<(), CoordinatorError> {
        if self.halted.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Halted {
                symbol: self.engine.symbol().to_string(),
            });
        }
        Ok(())
    }

    fn engine_failure(&self, err: EngineError) -> CoordinatorError {
        if err.is_fatal() {
            self.halt(&err);
        }
        err.into()
    }

    fn halt(&self, fault: &EngineError) {
        error!(symbol = self.engine.symbol(), %fault, "book invariant broken; symbol halted");
        self.halted.store(true, Ordering::SeqCst);
    }
}
