use galley_core::{
    CabinClass, Category, ChangeSource, InventoryStore, MealAvailability, MealId, SeatId,
    SeatIdProvider, StoreError,
};
use galley_order::{
    Cart, CartError, CartEvent, CartItem, InventoryCache, ReservationEngine, ReservationEvent,
    ReservationOutcome, ReserveError, SelectionSet,
};
use galley_shared::models::events::InventoryChangedEvent;
use galley_store::app_config::{FeedConfig, ReservationConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::worker::{ChangeFeedConsumer, FeedState};

/// Everything one seat needs: its cart, the cabin's cached inventory, the
/// reservation engine and the change feed that keeps the cache current.
pub struct SeatSession {
    cabin: CabinClass,
    seat_id: SeatId,
    store: Arc<dyn InventoryStore>,
    engine: ReservationEngine,
    cart: Arc<Mutex<Cart>>,
    cache: Arc<InventoryCache>,
    feed: ChangeFeedConsumer,
}

impl SeatSession {
    pub fn new(
        cabin: CabinClass,
        seats: &dyn SeatIdProvider,
        store: Arc<dyn InventoryStore>,
        changes: Arc<dyn ChangeSource>,
        reservation: &ReservationConfig,
        feed: &FeedConfig,
    ) -> Self {
        let seat_id = seats.current_seat_id();
        let engine = ReservationEngine::from_config(store.clone(), reservation);
        let cart = Arc::new(Mutex::new(Cart::new(cabin, seat_id.clone())));
        let cache = Arc::new(InventoryCache::new(cabin, seat_id.clone()));
        let feed = ChangeFeedConsumer::new(
            changes,
            cache.clone(),
            cart.clone(),
            Duration::from_millis(feed.reconnect_delay_ms),
        );

        Self {
            cabin,
            seat_id,
            store,
            engine,
            cart,
            cache,
            feed,
        }
    }

    pub fn seat_id(&self) -> &SeatId {
        &self.seat_id
    }

    pub fn cabin(&self) -> CabinClass {
        self.cabin
    }

    /// Loads the current document into the cache. Empty when the cache
    /// already held a newer revision.
    pub async fn refresh(&self) -> Result<Vec<MealAvailability>, StoreError> {
        let document = self.store.fetch().await?;
        Ok(self.cache.apply(document).await.unwrap_or_default())
    }

    pub async fn availability(&self, category: Category, meal_id: &str) -> Option<MealAvailability> {
        self.cache.availability(category, meal_id).await
    }

    /// Adds a meal to the cart. Refused when the cache already knows the
    /// meal is gone, unless this seat holds it.
    pub async fn select(
        &self,
        meal_id: impl Into<MealId>,
        category: Category,
        name: impl Into<String>,
    ) -> Result<(), CartError> {
        let meal_id = meal_id.into();
        let refused = match self.cache.availability(category, &meal_id).await {
            Some(view) => view.out_of_stock,
            // Unknown meal in a loaded document: it was removed.
            None => self.cache.is_loaded().await,
        };
        if refused {
            return Err(CartError::Unavailable(meal_id));
        }
        self.cart.lock().await.select(meal_id, category, name)
    }

    pub async fn deselect(&self, name: &str) -> Result<Option<CartItem>, CartError> {
        self.cart.lock().await.deselect(name)
    }

    pub async fn begin_edit(&self) {
        self.cart.lock().await.begin_edit();
    }

    pub async fn cart_items(&self) -> Vec<CartItem> {
        self.cart.lock().await.items().to_vec()
    }

    /// Reserves the cart's selections and folds the outcome back into the
    /// cart and the cache.
    pub async fn confirm(&self) -> Result<ReservationOutcome, ReserveError> {
        let selections = self.cart.lock().await.selections();
        info!(seat = %self.seat_id, count = selections.len(), "Confirming meal order");

        let outcome = self.engine.reserve(&self.seat_id, &selections).await?;
        self.cart.lock().await.apply_outcome(&outcome);
        if let ReservationOutcome::Confirmed(document) = &outcome {
            self.cache.apply(document.clone()).await;
        }
        Ok(outcome)
    }

    /// Releases every meal the seat holds and empties the cart.
    pub async fn cancel_order(&self) -> Result<(), ReserveError> {
        match self.engine.reserve(&self.seat_id, &SelectionSet::new()).await? {
            ReservationOutcome::Confirmed(document) => {
                self.cache.apply(document).await;
            }
            ReservationOutcome::OutOfStock(items) => {
                // An empty selection has nothing to be out of.
                warn!(seat = %self.seat_id, ?items, "Release reported unavailable meals");
            }
        }
        self.cart.lock().await.clear();
        Ok(())
    }

    pub async fn start_feed<F>(&self, on_update: F)
    where
        F: Fn(MealAvailability) + Send + Sync + 'static,
    {
        self.feed.start(self.cabin, on_update).await;
    }

    pub async fn stop_feed(&self) {
        self.feed.stop().await;
    }

    pub fn feed_status(&self) -> watch::Receiver<FeedState> {
        self.feed.status()
    }

    pub async fn subscribe_cart(&self) -> broadcast::Receiver<CartEvent> {
        self.cart.lock().await.subscribe()
    }

    pub fn subscribe_inventory(&self) -> broadcast::Receiver<InventoryChangedEvent> {
        self.cache.subscribe()
    }

    pub fn subscribe_reservations(&self) -> broadcast::Receiver<ReservationEvent> {
        self.engine.subscribe()
    }
}
