//! HTTP client for the inventory document store (CouchDB / Sync Gateway API).

use async_trait::async_trait;
use futures_util::StreamExt;
use galley_core::{
    CabinClass, ChangeSource, ChunkStream, InventoryDocument, InventoryStore, MenuDocument,
    MenuSource, Revision, StoreError,
};
use galley_shared::Masked;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::app_config::{FeedConfig, StoreConfig};

/// Response body of a successful document PUT.
#[derive(Debug, Deserialize)]
struct WriteAck {
    #[serde(default)]
    ok: bool,
    rev: Revision,
}

#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
    database: String,
    doc_id: String,
    menu_doc_id: String,
    username: String,
    password: Masked<String>,
    request_timeout: Duration,
    heartbeat_ms: u64,
}

impl HttpInventoryClient {
    pub fn new(store: &StoreConfig, feed: &FeedConfig, cabin: CabinClass) -> Result<Self, StoreError> {
        // No client-wide timeout: it would also cut off the change feed body.
        let client = Client::builder()
            .connect_timeout(store.request_timeout())
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: store.base_url.trim_end_matches('/').to_string(),
            database: store.database.clone(),
            doc_id: cabin.inventory_doc_id().to_string(),
            menu_doc_id: cabin.menu_doc_id().to_string(),
            username: store.username.clone(),
            password: store.password.clone(),
            request_timeout: store.request_timeout(),
            heartbeat_ms: feed.heartbeat_ms,
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose()))
    }

    fn transport(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.request_timeout)
        } else {
            StoreError::Transport(err.to_string())
        }
    }

    async fn error_for_status(
        &self,
        response: reqwest::Response,
        revision: Option<&Revision>,
    ) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match (status, revision) {
            (StatusCode::CONFLICT, Some(rev)) => StoreError::Conflict {
                doc_id: self.doc_id.clone(),
                revision: rev.clone(),
            },
            _ => StoreError::Status {
                status: status.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl InventoryStore for HttpInventoryClient {
    async fn fetch(&self) -> Result<InventoryDocument, StoreError> {
        let request = self
            .authorized(self.client.get(self.url(&self.doc_id)))
            .timeout(self.request_timeout);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        if !response.status().is_success() {
            return Err(self.error_for_status(response, None).await);
        }

        let document: InventoryDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        debug!(doc_id = %self.doc_id, revision = %document.revision, "Fetched inventory");
        Ok(document)
    }

    async fn write_conditional(
        &self,
        document: &InventoryDocument,
        revision: &Revision,
    ) -> Result<InventoryDocument, StoreError> {
        let request = self
            .authorized(self.client.put(self.url(&self.doc_id)))
            .query(&[("rev", revision.as_str())])
            .json(document)
            .timeout(self.request_timeout);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        if !response.status().is_success() {
            return Err(self.error_for_status(response, Some(revision)).await);
        }

        let ack: WriteAck = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if !ack.ok {
            return Err(StoreError::Decode("write acknowledged without ok flag".to_string()));
        }

        debug!(doc_id = %self.doc_id, from = %revision, to = %ack.rev, "Inventory written");
        let mut written = document.clone();
        written.revision = ack.rev;
        Ok(written)
    }
}

#[async_trait]
impl MenuSource for HttpInventoryClient {
    async fn fetch_menu(&self) -> Result<MenuDocument, StoreError> {
        let request = self
            .authorized(self.client.get(self.url(&self.menu_doc_id)))
            .timeout(self.request_timeout);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        if !response.status().is_success() {
            return Err(self.error_for_status(response, None).await);
        }

        let menu: MenuDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        debug!(doc_id = %self.menu_doc_id, "Fetched menu");
        Ok(menu)
    }
}

#[async_trait]
impl ChangeSource for HttpInventoryClient {
    async fn subscribe(&self, doc_id: &str) -> Result<ChunkStream, StoreError> {
        let doc_ids = serde_json::to_string(&[doc_id])
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let heartbeat = self.heartbeat_ms.to_string();

        let request = self
            .authorized(self.client.get(self.url("_changes")))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("feed", "continuous"),
                ("include_docs", "true"),
                ("heartbeat", heartbeat.as_str()),
                ("since", "now"),
                ("filter", "_doc_ids"),
                ("doc_ids", doc_ids.as_str()),
            ]);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        if !response.status().is_success() {
            return Err(self.error_for_status(response, None).await);
        }

        info!(doc_id, "Change feed connected");
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StoreError::Transport(e.to_string())))
            .boxed();
        Ok(stream)
    }
}
