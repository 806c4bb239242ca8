use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use galley_core::{
    CabinClass, Category, ChangeSource, ChunkStream, InventoryDocument, MealInventory, Revision,
    SeatId, StaticSeatId, StoreError,
};
use galley_order::{Cart, CartError, CartEvent, InventoryCache, ReservationOutcome};
use galley_seat::{ChangeFeedConsumer, FeedStatus, SeatSession};
use galley_store::app_config::{FeedConfig, ReservationConfig};
use galley_store::MemoryInventoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn seat(id: &str) -> SeatId {
    SeatId::new(id).unwrap()
}

fn inventory() -> InventoryDocument {
    let mut doc = InventoryDocument::new("economyinventory", Revision::new("1-seed"));
    doc.items.dinner.push(MealInventory::new("economymeal7", 1));
    doc.items.dessert.push(MealInventory::new("economymeal9", 10));
    doc
}

fn feed_config() -> FeedConfig {
    FeedConfig {
        reconnect_delay_ms: 20,
        ..FeedConfig::default()
    }
}

fn session(id: &str, store: &Arc<MemoryInventoryStore>) -> SeatSession {
    SeatSession::new(
        CabinClass::Economy,
        &StaticSeatId(seat(id)),
        store.clone(),
        store.clone(),
        &ReservationConfig::default(),
        &feed_config(),
    )
}

async fn wait_connected(session: &SeatSession) {
    let mut status = session.feed_status();
    timeout(WAIT, status.wait_for(|s| s.status == FeedStatus::Connected))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_rival_confirmation_evicts_selection() {
    let store = Arc::new(MemoryInventoryStore::new(inventory()));
    let a = session("seat-a", &store);
    let b = session("seat-b", &store);
    a.refresh().await.unwrap();
    b.refresh().await.unwrap();

    b.select("economymeal7", Category::Dinner, "Short rib").await.unwrap();
    b.select("economymeal9", Category::Dessert, "Sorbet").await.unwrap();
    let mut b_events = b.subscribe_cart().await;
    b.start_feed(|_| {}).await;
    wait_connected(&b).await;

    a.select("economymeal7", Category::Dinner, "Short rib").await.unwrap();
    let outcome = a.confirm().await.unwrap();
    assert!(matches!(outcome, ReservationOutcome::Confirmed(_)));

    let evicted = timeout(WAIT, async {
        loop {
            if let CartEvent::Evicted(e) = b_events.recv().await.unwrap() {
                return e;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(evicted.meal_id, "economymeal7");
    assert_eq!(evicted.seat_id, "seat-b");

    let remaining: Vec<_> = b.cart_items().await.into_iter().map(|i| i.meal_id).collect();
    assert_eq!(remaining, vec!["economymeal9".to_string()]);

    // The feed has already told B the meal is gone.
    assert_eq!(
        b.select("economymeal7", Category::Dinner, "Short rib").await,
        Err(CartError::Unavailable("economymeal7".to_string()))
    );

    b.stop_feed().await;
}

#[tokio::test]
async fn test_holder_keeps_its_meal_and_can_release() {
    let store = Arc::new(MemoryInventoryStore::new(inventory()));
    let a = session("seat-a", &store);
    a.refresh().await.unwrap();

    a.select("economymeal7", Category::Dinner, "Short rib").await.unwrap();
    a.confirm().await.unwrap();

    let view = a.availability(Category::Dinner, "economymeal7").await.unwrap();
    assert!(view.held_by_seat);
    assert!(!view.out_of_stock);

    // Locked until editing starts.
    assert_eq!(
        a.select("economymeal9", Category::Dessert, "Sorbet").await,
        Err(CartError::OrderLocked)
    );
    a.begin_edit().await;
    a.select("economymeal9", Category::Dessert, "Sorbet").await.unwrap();
    a.confirm().await.unwrap();
    assert_eq!(store.snapshot().await.reservations_for(&seat("seat-a")).len(), 2);

    a.cancel_order().await.unwrap();
    assert!(store.snapshot().await.reservations_for(&seat("seat-a")).is_empty());
    assert!(a.cart_items().await.is_empty());
}

#[tokio::test]
async fn test_confirm_out_of_stock_keeps_cart() {
    let store = Arc::new(MemoryInventoryStore::new(inventory()));
    let a = session("seat-a", &store);
    let b = session("seat-b", &store);
    a.refresh().await.unwrap();
    b.refresh().await.unwrap();

    // Both see the meal free; A commits first.
    a.select("economymeal7", Category::Dinner, "Short rib").await.unwrap();
    b.select("economymeal7", Category::Dinner, "Short rib").await.unwrap();
    a.confirm().await.unwrap();

    match b.confirm().await.unwrap() {
        ReservationOutcome::OutOfStock(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].meal_id, "economymeal7");
        }
        other => panic!("expected OutOfStock, got {:?}", other),
    }
    assert_eq!(b.cart_items().await.len(), 1);
    assert_eq!(store.snapshot().await.reservations_for(&seat("seat-b")).len(), 0);
}

/// Fails the first subscription, then serves one row and stays open.
struct FlakySource {
    subscriptions: AtomicUsize,
    row: Bytes,
}

#[async_trait]
impl ChangeSource for FlakySource {
    async fn subscribe(&self, _doc_id: &str) -> Result<ChunkStream, StoreError> {
        if self.subscriptions.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        let (head, tail) = self.row.split_at(17);
        let chunks: Vec<Result<Bytes, StoreError>> = vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ];
        Ok(stream::iter(chunks).chain(stream::pending()).boxed())
    }
}

/// Every subscription ends immediately.
struct ClosingSource {
    subscriptions: AtomicUsize,
}

#[async_trait]
impl ChangeSource for ClosingSource {
    async fn subscribe(&self, _doc_id: &str) -> Result<ChunkStream, StoreError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(stream::empty().boxed())
    }
}

/// Serves the same rows on every subscription and stays open.
struct ReplaySource {
    rows: Bytes,
}

#[async_trait]
impl ChangeSource for ReplaySource {
    async fn subscribe(&self, _doc_id: &str) -> Result<ChunkStream, StoreError> {
        let chunks: Vec<Result<Bytes, StoreError>> = vec![Ok(self.rows.clone())];
        Ok(stream::iter(chunks).chain(stream::pending()).boxed())
    }
}

fn change_row(doc: &InventoryDocument) -> Bytes {
    let row = serde_json::json!({"seq": doc.revision.generation(), "id": doc.id, "doc": doc});
    let mut line = b"\n".to_vec();
    line.extend(serde_json::to_vec(&row).unwrap());
    line.push(b'\n');
    Bytes::from(line)
}

fn consumer(
    source: Arc<dyn ChangeSource>,
    delay: Duration,
) -> (ChangeFeedConsumer, Arc<InventoryCache>, Arc<Mutex<Cart>>) {
    let cache = Arc::new(InventoryCache::new(CabinClass::Economy, seat("seat-a")));
    let cart = Arc::new(Mutex::new(Cart::new(CabinClass::Economy, seat("seat-a"))));
    let feed = ChangeFeedConsumer::new(source, cache.clone(), cart.clone(), delay);
    (feed, cache, cart)
}

async fn next_eviction(events: &mut tokio::sync::broadcast::Receiver<CartEvent>) -> (Category, String) {
    timeout(WAIT, async {
        loop {
            if let CartEvent::Evicted(e) = events.recv().await.unwrap() {
                return (e.category, e.name);
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_meal_removed_from_document_is_evicted() {
    // Every meal was taken off the document.
    let emptied = InventoryDocument::new("economyinventory", Revision::new("9-x"));
    let source = Arc::new(ReplaySource {
        rows: change_row(&emptied),
    });
    let (feed, cache, cart) = consumer(source, Duration::from_millis(10));

    let mut events = {
        let mut cart = cart.lock().await;
        cart.select("economymeal7", Category::Dinner, "Short rib").unwrap();
        cart.subscribe()
    };

    feed.start(CabinClass::Economy, |_| {}).await;
    let evicted = next_eviction(&mut events).await;
    assert_eq!(evicted, (Category::Dinner, "Short rib".to_string()));

    assert!(cart.lock().await.items().is_empty());
    assert_eq!(cache.snapshot().await.unwrap().revision.as_str(), "9-x");
    feed.stop().await;
}

#[tokio::test]
async fn test_eviction_matches_category_of_sold_out_meal() {
    let mut doc = InventoryDocument::new("economyinventory", Revision::new("3-x"));
    doc.items.breakfast.push(MealInventory::new("m1", 5));
    let mut soup = MealInventory::new("m1", 1);
    soup.reserve(&seat("seat-b"));
    doc.items.lunch.push(soup);

    let source = Arc::new(ReplaySource {
        rows: change_row(&doc),
    });
    let (feed, _cache, cart) = consumer(source, Duration::from_millis(10));

    let mut events = {
        let mut cart = cart.lock().await;
        cart.select("m1", Category::Breakfast, "Eggs").unwrap();
        cart.select("m1", Category::Lunch, "Soup").unwrap();
        cart.subscribe()
    };

    feed.start(CabinClass::Economy, |_| {}).await;
    let evicted = next_eviction(&mut events).await;
    assert_eq!(evicted, (Category::Lunch, "Soup".to_string()));

    let left: Vec<_> = cart
        .lock()
        .await
        .items()
        .iter()
        .map(|i| (i.category, i.name.clone()))
        .collect();
    assert_eq!(left, vec![(Category::Breakfast, "Eggs".to_string())]);
    feed.stop().await;
}

#[tokio::test]
async fn test_reconnects_after_failure() {
    let mut doc = inventory();
    doc.revision = Revision::new("4-abc");

    let source = Arc::new(FlakySource {
        subscriptions: AtomicUsize::new(0),
        row: change_row(&doc),
    });
    let (feed, cache, _cart) = consumer(source.clone(), Duration::from_millis(10));

    let (tx, mut rx) = mpsc::unbounded_channel();
    feed.start(CabinClass::Economy, move |update| {
        let _ = tx.send(update);
    })
    .await;

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.meal_id, "economymeal7");
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 2);
    assert_eq!(cache.snapshot().await.unwrap().revision.as_str(), "4-abc");

    let state = feed.status().borrow().clone();
    assert_eq!(state.status, FeedStatus::Connected);
    assert!(state.last_error.unwrap().contains("connection refused"));

    feed.stop().await;
}

#[tokio::test]
async fn test_stop_suppresses_reconnect() {
    let source = Arc::new(ClosingSource {
        subscriptions: AtomicUsize::new(0),
    });
    let (feed, _cache, _cart) = consumer(source.clone(), Duration::from_millis(200));

    feed.start(CabinClass::Economy, |_| {}).await;
    let mut status = feed.status();
    let ended = |s: &galley_seat::FeedState| {
        s.status == FeedStatus::Disconnected && source.subscriptions.load(Ordering::SeqCst) == 1
    };
    timeout(WAIT, status.wait_for(ended))
        .await
        .unwrap()
        .unwrap();

    feed.stop().await;
    assert!(!feed.is_running().await);
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
    assert_eq!(feed.status().borrow().status, FeedStatus::Disconnected);
}
