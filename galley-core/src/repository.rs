use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::time::Duration;

use crate::inventory::{InventoryDocument, Revision};
use crate::menu::MenuDocument;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The supplied revision is stale: another writer committed first.
    #[error("Revision conflict on {doc_id}: {revision} is no longer current")]
    Conflict { doc_id: String, revision: Revision },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Store responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Request/response access to one cabin's inventory document.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Current document; its `revision` is the token for the next write.
    async fn fetch(&self) -> Result<InventoryDocument, StoreError>;

    /// Replaces the document if `revision` is still current. The returned
    /// document carries the new revision.
    async fn write_conditional(
        &self,
        document: &InventoryDocument,
        revision: &Revision,
    ) -> Result<InventoryDocument, StoreError>;
}

/// Raw chunks of a continuous change feed. Chunk boundaries carry no meaning.
pub type ChunkStream = BoxStream<'static, Result<Bytes, StoreError>>;

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Opens a change subscription filtered to `doc_id`. Resolves once the
    /// connection is established.
    async fn subscribe(&self, doc_id: &str) -> Result<ChunkStream, StoreError>;
}

/// Read-only access to a cabin's menu document.
#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn fetch_menu(&self) -> Result<MenuDocument, StoreError>;
}
