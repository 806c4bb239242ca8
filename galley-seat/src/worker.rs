//! Change feed consumer.
//!
//! Holds one streaming subscription per cabin, folds every document it
//! carries into the inventory cache, and evicts cart selections that another
//! seat has taken. The connection is re-opened after a fixed delay until
//! `stop()` is called.

use futures_util::StreamExt;
use galley_core::{CabinClass, ChangeSource, InventoryDocument, MealAvailability, StoreError};
use galley_order::{Cart, InventoryCache};
use galley_store::changes::parse_frame;
use galley_store::FrameDecoder;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedStatus {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedState {
    pub status: FeedStatus,
    pub last_error: Option<String>,
}

impl FeedState {
    fn new(status: FeedStatus) -> Self {
        Self { status, last_error: None }
    }
}

pub type UpdateCallback = Arc<dyn Fn(MealAvailability) + Send + Sync>;

struct FeedContext {
    source: Arc<dyn ChangeSource>,
    cache: Arc<InventoryCache>,
    cart: Arc<Mutex<Cart>>,
    reconnect_delay: Duration,
    state: watch::Sender<FeedState>,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ChangeFeedConsumer {
    ctx: Arc<FeedContext>,
    running: Mutex<Option<Running>>,
}

impl ChangeFeedConsumer {
    pub fn new(
        source: Arc<dyn ChangeSource>,
        cache: Arc<InventoryCache>,
        cart: Arc<Mutex<Cart>>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(FeedState::new(FeedStatus::Disconnected));
        Self {
            ctx: Arc::new(FeedContext {
                source,
                cache,
                cart,
                reconnect_delay,
                state,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn status(&self) -> watch::Receiver<FeedState> {
        self.ctx.state.subscribe()
    }

    /// Opens the subscription for the cabin's inventory document. A feed that
    /// is already running is stopped first.
    pub async fn start<F>(&self, cabin: CabinClass, on_update: F)
    where
        F: Fn(MealAvailability) + Send + Sync + 'static,
    {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            previous.shutdown.cancel();
            let _ = previous.handle.await;
        }

        let shutdown = CancellationToken::new();
        let ctx = self.ctx.clone();
        let token = shutdown.clone();
        let on_update: UpdateCallback = Arc::new(on_update);
        let doc_id = cabin.inventory_doc_id().to_string();

        info!(%cabin, doc_id, "Starting change feed");
        let handle = tokio::spawn(async move { ctx.run(doc_id, on_update, token).await });
        *running = Some(Running { shutdown, handle });
    }

    /// Cancels the live connection and any pending reconnect. Waits for the
    /// read loop to exit.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.shutdown.cancel();
        if let Err(e) = running.handle.await {
            error!("Change feed task ended abnormally: {}", e);
        }
        self.ctx.state.send_replace(FeedState::new(FeedStatus::Disconnected));
        info!("Change feed stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl FeedContext {
    async fn run(&self, doc_id: String, on_update: UpdateCallback, shutdown: CancellationToken) {
        loop {
            self.set_status(FeedStatus::Connecting, None);

            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.consume(&doc_id, &on_update) => result,
            };

            match result {
                Ok(()) => {
                    info!(doc_id, "Change feed ended, reconnecting");
                    self.set_status(FeedStatus::Disconnected, None);
                }
                Err(e) => {
                    warn!(doc_id, "Change feed failed: {}", e);
                    self.set_status(FeedStatus::Error, Some(e.to_string()));
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        debug!(doc_id, "Change feed loop exited");
    }

    /// One connection: returns `Ok` on a clean end of stream.
    async fn consume(&self, doc_id: &str, on_update: &UpdateCallback) -> Result<(), StoreError> {
        let mut stream = self.source.subscribe(doc_id).await?;
        self.set_status(FeedStatus::Connected, None);

        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = stream.next().await {
            for frame in decoder.push(&chunk?) {
                self.handle_frame(doc_id, &frame, on_update).await;
            }
        }
        if let Some(frame) = decoder.finish() {
            self.handle_frame(doc_id, &frame, on_update).await;
        }
        Ok(())
    }

    async fn handle_frame(&self, doc_id: &str, frame: &[u8], on_update: &UpdateCallback) {
        let document = match parse_frame(frame) {
            Ok(Some(document)) => document,
            Ok(None) => return,
            Err(e) => {
                warn!("Dropping change frame: {}", e);
                return;
            }
        };

        if document.id != doc_id {
            debug!(id = %document.id, "Skipping change for another document");
            return;
        }

        self.fold(document, on_update).await;
    }

    async fn fold(&self, document: InventoryDocument, on_update: &UpdateCallback) {
        // Stale frame: the cache already holds newer state.
        let Some(updates) = self.cache.apply(document.clone()).await else {
            return;
        };
        for update in &updates {
            on_update(update.clone());
        }

        let mut cart = self.cart.lock().await;
        let doomed: Vec<_> = cart
            .items()
            .iter()
            .filter(|item| match document.meal(item.category, &item.meal_id) {
                Some(meal) => meal.availability(item.category, cart.seat_id()).out_of_stock,
                None => true,
            })
            .map(|item| (item.category, item.meal_id.clone()))
            .collect();

        for (category, meal_id) in doomed {
            cart.evict(category, &meal_id);
        }
    }

    fn set_status(&self, status: FeedStatus, last_error: Option<String>) {
        self.state.send_modify(|state| {
            state.status = status;
            if last_error.is_some() {
                state.last_error = last_error;
            }
        });
    }
}
