//! Firestore REST document store
//!
//! Reads go through `documents:runQuery`, writes through `documents:commit`
//! so server timestamps can be applied as `REQUEST_TIME` transforms. The
//! REST surface has no push channel, so `listen` polls the ordered query
//! and emits a snapshot whenever the result changes.

mod codec;

use super::{CollectionRef, DocumentStore, RecordQuery, SnapshotStream};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Client;
use serde_json::{Value, json};
use shared::error::{StoreError, StoreErrorCode, StoreResult};
use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch};
use std::time::Duration;
use uuid::Uuid;

/// Firestore connection settings
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Service root (e.g., "https://firestore.googleapis.com")
    pub base_url: String,
    /// GCP project id
    pub project_id: String,
    /// Database id
    pub database: String,
    /// Web API key, sent as `?key=`
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Poll interval backing `listen`
    pub poll_interval: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: "https://firestore.googleapis.com".to_string(),
            project_id: project_id.into(),
            database: "(default)".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `projects/{p}/databases/{db}/documents`
    fn documents_path(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.documents_path()
        )
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_path(), collection, id)
    }
}

/// Document store backed by the Firestore REST API
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// POST a JSON body to `documents:{method}`
    async fn call(&self, method: &str, body: &Value) -> StoreResult<Value> {
        let url = format!("{}:{}", self.config.documents_url(), method);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(codec::decode_error(status.as_u16(), &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| StoreError::internal(format!("Invalid response: {e}")))
    }

    async fn commit(&self, write: Value) -> StoreResult<()> {
        self.call("commit", &json!({ "writes": [write] })).await?;
        Ok(())
    }

    async fn run_query(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<Vec<SalesRecord>> {
        let mut structured = json!({
            "from": [{ "collectionId": collection.name }],
            "orderBy": [{ "field": { "fieldPath": "date" }, "direction": "DESCENDING" }],
        });
        if let Some(limit) = query.limit {
            structured["limit"] = json!(limit);
        }
        let body = self
            .call("runQuery", &json!({ "structuredQuery": structured }))
            .await?;
        Ok(codec::decode_query_response(&body))
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    let code = if err.is_timeout() {
        StoreErrorCode::DeadlineExceeded
    } else if err.is_connect() {
        StoreErrorCode::Unavailable
    } else {
        StoreErrorCode::Unknown
    };
    StoreError::new(code, err.to_string())
}

fn server_time(field: &str) -> Value {
    json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" })
}

struct Poller {
    store: FirestoreStore,
    collection: CollectionRef,
    query: RecordQuery,
    last: Option<Vec<SalesRecord>>,
    done: bool,
}

async fn poll_snapshot(mut poller: Poller) -> Option<(StoreResult<Vec<SalesRecord>>, Poller)> {
    if poller.done {
        return None;
    }
    loop {
        if poller.last.is_some() {
            tokio::time::sleep(poller.store.config.poll_interval).await;
        }
        match poller.store.run_query(&poller.collection, poller.query).await {
            Ok(records) if poller.last.as_ref() == Some(&records) => continue,
            Ok(records) => {
                poller.last = Some(records.clone());
                return Some((Ok(records), poller));
            }
            Err(err) => {
                poller.done = true;
                return Some((Err(err), poller));
            }
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn check_connection(&self) -> bool {
        // 任何 HTTP 响应都说明服务可达
        match self.client.head(&self.config.base_url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }

    fn sdk_ready(&self) -> bool {
        !self.config.project_id.trim().is_empty()
    }

    async fn open(&self, collection: &str) -> StoreResult<CollectionRef> {
        if collection.is_empty() || collection.contains('/') {
            return Err(StoreError::new(
                StoreErrorCode::InvalidArgument,
                format!("Invalid collection id: {collection:?}"),
            ));
        }
        Ok(CollectionRef::new(self.config.project_id.clone(), collection))
    }

    async fn query(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<Vec<SalesRecord>> {
        self.run_query(collection, query).await
    }

    async fn add(
        &self,
        collection: &CollectionRef,
        record: &NewSalesRecord,
    ) -> StoreResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let write = json!({
            "update": {
                "name": self.config.document_name(&collection.name, &id),
                "fields": codec::encode_fields(record),
            },
            "currentDocument": { "exists": false },
            "updateTransforms": [server_time("createdAt"), server_time("updatedAt")],
        });
        self.commit(write).await?;
        Ok(id)
    }

    async fn update(
        &self,
        collection: &CollectionRef,
        id: &str,
        patch: &SalesRecordPatch,
    ) -> StoreResult<()> {
        let write = json!({
            "update": {
                "name": self.config.document_name(&collection.name, id),
                "fields": codec::encode_patch(patch),
            },
            "updateMask": { "fieldPaths": patch.field_paths() },
            "currentDocument": { "exists": true },
            "updateTransforms": [server_time("updatedAt")],
        });
        self.commit(write).await
    }

    async fn delete(&self, collection: &CollectionRef, id: &str) -> StoreResult<()> {
        let write = json!({ "delete": self.config.document_name(&collection.name, id) });
        self.commit(write).await
    }

    async fn listen(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<SnapshotStream> {
        let poller = Poller {
            store: self.clone(),
            collection: collection.clone(),
            query,
            last: None,
            done: false,
        };
        Ok(stream::unfold(poller, poll_snapshot).boxed())
    }
}
