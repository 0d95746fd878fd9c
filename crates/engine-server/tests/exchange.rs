use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_core::{NewOrder, Order, OrderId, OrderStatus, OrderType, Side, StateDelta, Trade};
use engine_protocol::{ErrorKind, Request, Response};
use engine_server::{
    CoordinatorError, Exchange, LastIds, MemoryStore, PersistenceAdapter, PersistenceError,
};

async fn open(store: &Arc<MemoryStore>) -> Exchange {
    Exchange::open(store.clone(), Duration::from_secs(1))
        .await
        .unwrap()
}

fn resting(id: u64, symbol: &str, side: Side, price: u64, qty: u64) -> Order {
    Order {
        id,
        symbol: symbol.into(),
        side,
        order_type: OrderType::Limit,
        price: Some(price),
        quantity: qty,
        remaining_qty: qty,
        status: OrderStatus::Open,
        created_at_ns: id,
    }
}

#[tokio::test]
async fn failed_persist_leaves_book_orders_and_trades_untouched() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;
    let a = ex.submit(NewOrder::limit("X", Side::Sell, 10, 2)).await.unwrap().order;
    let b = ex.submit(NewOrder::limit("X", Side::Sell, 11, 3)).await.unwrap().order;
    let book_before = ex.order_book("X").await.unwrap();

    store.fail_next_persists(1);
    let err = ex.submit(NewOrder::market("X", Side::Buy, 4)).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Persistence(_)));

    assert_eq!(ex.order_book("X").await.unwrap(), book_before);
    assert_eq!(ex.order(a.id).await.unwrap(), a);
    assert_eq!(ex.order(b.id).await.unwrap(), b);
    assert!(ex.trades("X").await.unwrap().is_empty());

    // Retrying the same request is safe.
    let s = ex.submit(NewOrder::market("X", Side::Buy, 4)).await.unwrap();
    assert_eq!(s.order.status, OrderStatus::Filled);
    let fills: Vec<_> = s.trades.iter().map(|t| (t.sell_order_id, t.price, t.quantity)).collect();
    assert_eq!(fills, vec![(a.id, 10, 2), (b.id, 11, 2)]);
    assert_eq!(ex.trades("X").await.unwrap(), s.trades);
}

#[tokio::test]
async fn failed_cancel_keeps_order_resting() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;
    let id = ex.submit(NewOrder::limit("X", Side::Buy, 10, 5)).await.unwrap().order.id;

    store.fail_next_persists(1);
    assert!(matches!(
        ex.cancel(id).await.unwrap_err(),
        CoordinatorError::Persistence(_)
    ));
    assert_eq!(ex.order(id).await.unwrap().status, OrderStatus::Open);
    assert_eq!(ex.order_book("X").await.unwrap().bids[0].id, id);

    assert_eq!(ex.cancel(id).await.unwrap().status, OrderStatus::Canceled);
}

#[tokio::test]
async fn cancel_succeeds_once() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;
    let id = ex.submit(NewOrder::limit("X", Side::Buy, 10, 5)).await.unwrap().order.id;

    let canceled = ex.cancel(id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(canceled.remaining_qty, 5);
    assert!(ex.order_book("X").await.unwrap().bids.is_empty());

    assert_eq!(
        ex.cancel(id).await.unwrap_err(),
        CoordinatorError::NotCancelable {
            id,
            status: OrderStatus::Canceled
        }
    );
    assert_eq!(ex.cancel(999).await.unwrap_err(), CoordinatorError::NotFound(999));
}

#[tokio::test]
async fn cancel_of_filled_order_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;
    let sell = ex.submit(NewOrder::limit("X", Side::Sell, 10, 2)).await.unwrap().order;
    ex.submit(NewOrder::limit("X", Side::Buy, 10, 2)).await.unwrap();

    let book_before = ex.order_book("X").await.unwrap();
    assert_eq!(
        ex.cancel(sell.id).await.unwrap_err(),
        CoordinatorError::NotCancelable {
            id: sell.id,
            status: OrderStatus::Filled
        }
    );
    assert_eq!(ex.order_book("X").await.unwrap(), book_before);
    assert_eq!(ex.order(sell.id).await.unwrap().status, OrderStatus::Filled);
}

#[tokio::test]
async fn market_remainder_is_canceled_and_never_rests() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;
    ex.submit(NewOrder::limit("X", Side::Sell, 10, 2)).await.unwrap();

    let s = ex.submit(NewOrder::market("X", Side::Buy, 5)).await.unwrap();
    assert_eq!(s.order.status, OrderStatus::Canceled);
    assert_eq!(s.order.remaining_qty, 3);
    let book = ex.order_book("X").await.unwrap();
    assert!(book.bids.is_empty() && book.asks.is_empty());
    assert_eq!(ex.order(s.order.id).await.unwrap(), s.order);
}

#[tokio::test]
async fn validation_errors_spawn_nothing() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;

    let err = ex.submit(NewOrder::limit("X", Side::Buy, 10, 0)).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation(_)));
    let err = ex
        .submit(NewOrder {
            price: None,
            ..NewOrder::limit("X", Side::Buy, 10, 1)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Validation(_)));

    assert!(ex.symbols().is_empty());
    assert_eq!(store.persisted_count(), 0);
}

#[tokio::test]
async fn warm_start_restores_book_and_continues_ids() {
    let store = Arc::new(MemoryStore::new());
    let (first, book_before, last_trade) = {
        let ex = open(&store).await;
        let first = ex.submit(NewOrder::limit("X", Side::Sell, 10, 5)).await.unwrap().order;
        ex.submit(NewOrder::limit("X", Side::Sell, 10, 1)).await.unwrap();
        ex.submit(NewOrder::limit("X", Side::Buy, 8, 4)).await.unwrap();
        let crossing = ex.submit(NewOrder::limit("X", Side::Buy, 10, 2)).await.unwrap();
        let trade = crossing.trades[0].clone();
        (first, ex.order_book("X").await.unwrap(), trade)
    };
    assert_eq!(book_before.asks[0].id, first.id);
    assert_eq!(book_before.asks[0].remaining_qty, 3);

    let ex = open(&store).await;
    assert_eq!(ex.order_book("X").await.unwrap(), book_before);

    let late = ex.submit(NewOrder::limit("X", Side::Sell, 10, 1)).await.unwrap().order;
    assert!(late.id > 4);
    let asks: Vec<_> = ex.order_book("X").await.unwrap().asks.iter().map(|o| o.id).collect();
    assert_eq!(asks.last(), Some(&late.id));

    // The partially filled order keeps its place at the head of the level.
    let s = ex.submit(NewOrder::limit("X", Side::Buy, 10, 3)).await.unwrap();
    assert_eq!(s.trades.len(), 1);
    assert_eq!(s.trades[0].sell_order_id, first.id);
    assert!(s.trades[0].id > last_trade.id);
}

#[tokio::test]
async fn symbols_run_independently_under_concurrency() {
    let store = Arc::new(MemoryStore::new());
    let ex = Arc::new(open(&store).await);
    let symbols = ["AAA", "BBB", "CCC", "DDD"];

    let mut tasks = Vec::new();
    for symbol in symbols {
        for i in 0..100 {
            let ex = ex.clone();
            let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
            tasks.push(tokio::spawn(async move {
                ex.submit(NewOrder::limit(symbol, side, 10, 1)).await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for symbol in symbols {
        let book = ex.order_book(symbol).await.unwrap();
        assert!(book.bids.is_empty() && book.asks.is_empty(), "{} not flat", symbol);
        let trades = ex.trades(symbol).await.unwrap();
        assert_eq!(trades.len(), 50);
        assert!(trades.iter().all(|t| t.symbol == symbol && t.quantity == 1));
        assert!(trades.windows(2).all(|w| w[0].id < w[1].id));
    }
}

#[tokio::test]
async fn admission_order_defines_time_priority() {
    let store = Arc::new(MemoryStore::new());
    let ex = Arc::new(open(&store).await);
    let coordinator = ex.coordinator("X").await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let c = coordinator.clone();
        tasks.push(tokio::spawn(async move {
            c.submit(NewOrder::limit("X", Side::Buy, 10, 1)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let queue = coordinator.resting(Side::Buy).unwrap();
    assert_eq!(queue.len(), 64);
    assert!(queue
        .windows(2)
        .all(|w| w[0].id < w[1].id && w[0].created_at_ns < w[1].created_at_ns));
}

#[tokio::test]
async fn corrupt_stored_book_halts_only_its_symbol() {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        vec![
            resting(1, "X", Side::Buy, 11, 1),
            resting(2, "X", Side::Sell, 10, 1),
        ],
        vec![],
    );
    let ex = open(&store).await;
    let halted = CoordinatorError::Halted { symbol: "X".into() };

    // Book reads refuse too, before and after a coordinator exists.
    assert_eq!(ex.order_book("X").await.unwrap_err(), halted);
    let err = ex.submit(NewOrder::limit("X", Side::Buy, 9, 1)).await.unwrap_err();
    assert_eq!(err, halted);
    assert_eq!(err.kind(), ErrorKind::Halted);
    assert_eq!(ex.cancel(1).await.unwrap_err(), halted);
    assert!(ex.coordinator("X").await.unwrap().is_halted());
    assert_eq!(ex.order_book("X").await.unwrap_err(), halted);
    assert_eq!(ex.order(2).await.unwrap().status, OrderStatus::Open);

    let s = ex.submit(NewOrder::limit("Y", Side::Buy, 9, 1)).await.unwrap();
    assert!(s.order.id > 2);
    assert_eq!(store.load_open_orders("X").await.unwrap().len(), 2);
}

#[tokio::test]
async fn handle_maps_requests_to_responses() {
    let store = Arc::new(MemoryStore::new());
    let ex = open(&store).await;

    let resp = ex
        .handle(Request::Submit(NewOrder::limit("X", Side::Sell, 10, 5)))
        .await;
    let (order, trades) = match resp {
        Response::Order { order, trades } => (order, trades),
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(order.status, OrderStatus::Open);
    assert!(trades.is_empty());

    let resp = ex.handle(Request::OrderBook { symbol: "X".into() }).await;
    assert_eq!(
        resp,
        Response::OrderBook {
            symbol: "X".into(),
            buy: vec![],
            sell: vec![order.clone()],
        }
    );

    let resp = ex.handle(Request::OrderStatus { id: order.id }).await;
    assert_eq!(resp, Response::OrderStatus { order: order.clone() });

    let resp = ex.handle(Request::OrderStatus { id: 77 }).await;
    assert_eq!(resp, Response::error(ErrorKind::NotFound, "order 77 not found"));

    let resp = ex.handle(Request::Trades { symbol: "X".into() }).await;
    assert_eq!(
        resp,
        Response::Trades {
            symbol: "X".into(),
            trades: vec![],
        }
    );

    let resp = ex
        .handle(Request::Submit(NewOrder::limit("X", Side::Buy, 10, -1)))
        .await;
    assert!(matches!(
        resp,
        Response::Error {
            kind: ErrorKind::Validation,
            ..
        }
    ));
}

#[tokio::test]
async fn read_only_queries_start_no_coordinators() {
    let store = Arc::new(MemoryStore::new());
    store.seed(vec![resting(1, "KEPT", Side::Sell, 10, 4)], vec![]);
    let ex = open(&store).await;

    for i in 0..500 {
        let symbol = format!("S{}", i);
        let book = ex.order_book(&symbol).await.unwrap();
        assert!(book.bids.is_empty() && book.asks.is_empty());
        assert!(ex.trades(&symbol).await.unwrap().is_empty());
    }
    let kept = ex.order_book("KEPT").await.unwrap();
    assert_eq!(kept.asks, vec![resting(1, "KEPT", Side::Sell, 10, 4)]);
    assert_eq!(ex.order(1).await.unwrap().remaining_qty, 4);
    assert!(ex.order(2).await.is_err());
    assert!(ex.order_book("A B").await.is_err());

    assert!(ex.symbols().is_empty());
}

/// Writes through immediately but acknowledges late, like a store that
/// waits on fsync or a replica.
struct LateAck {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl PersistenceAdapter for LateAck {
    async fn persist(&self, delta: &StateDelta) -> Result<(), PersistenceError> {
        self.inner.persist(delta).await?;
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn load_open_orders(&self, symbol: &str) -> Result<Vec<Order>, PersistenceError> {
        self.inner.load_open_orders(symbol).await
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        self.inner.load_order(id).await
    }

    async fn load_trades(&self, symbol: &str) -> Result<Vec<Trade>, PersistenceError> {
        self.inner.load_trades(symbol).await
    }

    async fn last_ids(&self) -> Result<LastIds, PersistenceError> {
        self.inner.last_ids().await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_agree_while_a_match_is_being_acknowledged() {
    let store = Arc::new(LateAck {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(300),
    });
    let ex = Arc::new(
        Exchange::open(store, Duration::from_secs(2))
            .await
            .unwrap(),
    );
    let sell = ex.submit(NewOrder::limit("X", Side::Sell, 10, 2)).await.unwrap().order;

    let book = ex.order_book("X").await.unwrap();
    assert_eq!(book.asks, vec![sell.clone()]);
    assert!(ex.trades("X").await.unwrap().is_empty());
    assert_eq!(ex.order(sell.id).await.unwrap().status, OrderStatus::Open);

    let buy = tokio::spawn({
        let ex = ex.clone();
        async move { ex.submit(NewOrder::limit("X", Side::Buy, 10, 2)).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The match is in the store but not yet acknowledged.
    let status = ex.order(sell.id).await.unwrap().status;
    let book = ex.order_book("X").await.unwrap();
    let trades = ex.trades("X").await.unwrap();
    assert_eq!(status, OrderStatus::Filled);
    assert!(book.asks.is_empty(), "book still lists {:?}", book.asks);
    assert_eq!(trades.len(), 1);

    let s = buy.await.unwrap().unwrap();
    assert_eq!(s.trades, trades);
    assert_eq!(ex.order(s.order.id).await.unwrap().status, OrderStatus::Filled);
    let book = ex.order_book("X").await.unwrap();
    assert!(book.bids.is_empty() && book.asks.is_empty());
}
