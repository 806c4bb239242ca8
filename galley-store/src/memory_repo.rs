//! In-process inventory store with the same revision semantics as the real
//! one. Every successful write is also published as a change-feed row.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use galley_core::{ChangeSource, ChunkStream, InventoryDocument, InventoryStore, Revision, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

struct MemoryState {
    document: InventoryDocument,
    generation: u64,
}

pub struct MemoryInventoryStore {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<Bytes>,
    writes: AtomicUsize,
    conflicts: AtomicUsize,
}

impl MemoryInventoryStore {
    /// Provisions the store. The document's revision is replaced with a
    /// fresh generation-1 token.
    pub fn new(mut document: InventoryDocument) -> Self {
        document.revision = next_revision(1);
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(MemoryState { document, generation: 1 }),
            changes,
            writes: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    pub async fn snapshot(&self) -> InventoryDocument {
        self.state.lock().await.document.clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

fn next_revision(generation: u64) -> Revision {
    Revision::new(format!("{}-{}", generation, Uuid::new_v4().simple()))
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn fetch(&self) -> Result<InventoryDocument, StoreError> {
        Ok(self.snapshot().await)
    }

    async fn write_conditional(
        &self,
        document: &InventoryDocument,
        revision: &Revision,
    ) -> Result<InventoryDocument, StoreError> {
        let mut state = self.state.lock().await;

        if state.document.revision != *revision {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                doc_id: state.document.id.clone(),
                revision: revision.clone(),
            });
        }

        state.generation += 1;
        let mut stored = document.clone();
        stored.id = state.document.id.clone();
        stored.revision = next_revision(state.generation);
        state.document = stored.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);

        let row = serde_json::json!({
            "seq": state.generation,
            "id": stored.id,
            "changes": [{ "rev": stored.revision }],
            "doc": stored,
        });
        match serde_json::to_vec(&row) {
            Ok(mut line) => {
                line.push(b'\n');
                // No subscribers is fine.
                let _ = self.changes.send(Bytes::from(line));
            }
            Err(e) => warn!("Failed to encode change row: {}", e),
        }

        Ok(stored)
    }
}

#[async_trait]
impl ChangeSource for MemoryInventoryStore {
    async fn subscribe(&self, doc_id: &str) -> Result<ChunkStream, StoreError> {
        let own_id = self.state.lock().await.document.id.clone();
        if own_id != doc_id {
            return Err(StoreError::Status {
                status: 404,
                body: format!("missing document {}", doc_id),
            });
        }

        info!(doc_id, "Memory change feed subscribed");
        let stream = BroadcastStream::new(self.changes.subscribe())
            .filter_map(|item| async move {
                match item {
                    Ok(bytes) => Some(Ok(bytes)),
                    Err(e) => {
                        warn!("Memory change feed lagged: {}", e);
                        None
                    }
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_core::{Category, MealInventory, SeatId};

    fn store() -> MemoryInventoryStore {
        let mut doc = InventoryDocument::new("economyinventory", Revision::new("0-seed"));
        doc.items.dinner.push(MealInventory::new("economymeal7", 2));
        MemoryInventoryStore::new(doc)
    }

    #[tokio::test]
    async fn test_stale_revision_is_a_conflict() {
        let store = store();
        let doc = store.fetch().await.unwrap();
        assert!(doc.revision.as_str().starts_with("1-"));

        let mut next = doc.clone();
        next.meal_mut(Category::Dinner, "economymeal7")
            .unwrap()
            .reserve(&SeatId::new("seat-a").unwrap());
        let written = store.write_conditional(&next, &doc.revision).await.unwrap();
        assert!(written.revision.as_str().starts_with("2-"));

        let err = store.write_conditional(&next, &doc.revision).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.conflict_count(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_published_as_rows() {
        let store = store();
        let mut feed = store.subscribe("economyinventory").await.unwrap();

        let doc = store.fetch().await.unwrap();
        store.write_conditional(&doc, &doc.revision).await.unwrap();

        let chunk = feed.next().await.unwrap().unwrap();
        assert_eq!(chunk.last(), Some(&b'\n'));
        let row: serde_json::Value = serde_json::from_slice(&chunk).unwrap();
        assert_eq!(row["id"], "economyinventory");
        assert_eq!(row["seq"], 2);
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_document() {
        let store = store();
        assert!(store.subscribe("businessinventory").await.is_err());
    }
}
