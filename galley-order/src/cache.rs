use galley_core::{CabinClass, Category, InventoryDocument, MealAvailability, SeatId};
use galley_shared::models::events::{now_ts, InventoryChangedEvent};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Last known state of the cabin's inventory document, seen from one seat.
///
/// Advisory only. Reservations always work from a fresh fetch.
pub struct InventoryCache {
    seat: SeatId,
    cabin: CabinClass,
    snapshot: RwLock<Option<InventoryDocument>>,
    changes: broadcast::Sender<InventoryChangedEvent>,
}

impl InventoryCache {
    pub fn new(cabin: CabinClass, seat: SeatId) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            seat,
            cabin,
            snapshot: RwLock::new(None),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InventoryChangedEvent> {
        self.changes.subscribe()
    }

    pub fn cabin(&self) -> CabinClass {
        self.cabin
    }

    /// Folds a full document into the cache and returns the availability of
    /// every meal in it.
    ///
    /// A document older than the cached one (lower revision generation) is
    /// dropped and yields `None`. A current document with no meals yields an
    /// empty list.
    pub async fn apply(&self, document: InventoryDocument) -> Option<Vec<MealAvailability>> {
        let mut snapshot = self.snapshot.write().await;

        if let Some(current) = snapshot.as_ref() {
            if let (Some(have), Some(incoming)) =
                (current.revision.generation(), document.revision.generation())
            {
                if incoming < have {
                    debug!(
                        current = %current.revision,
                        incoming = %document.revision,
                        "Ignoring stale inventory document"
                    );
                    return None;
                }
            }
        }

        let updates: Vec<MealAvailability> = document
            .meals()
            .map(|(category, meal)| meal.availability(category, &self.seat))
            .collect();
        *snapshot = Some(document);
        drop(snapshot);

        let timestamp = now_ts();
        for update in &updates {
            let _ = self.changes.send(InventoryChangedEvent {
                cabin: self.cabin,
                category: update.category,
                meal_id: update.meal_id.clone(),
                capacity: update.capacity,
                active_count: update.active_count,
                available: update.available,
                timestamp,
            });
        }
        Some(updates)
    }

    /// `None` until the first document arrives, or when the meal is not in it.
    pub async fn availability(&self, category: Category, meal_id: &str) -> Option<MealAvailability> {
        self.snapshot
            .read()
            .await
            .as_ref()?
            .meal(category, meal_id)
            .map(|m| m.availability(category, &self.seat))
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    pub async fn snapshot(&self) -> Option<InventoryDocument> {
        self.snapshot.read().await.clone()
    }
}
