// tally-client/src/store/mod.rs
// 文档存储抽象 - 远程集合的读写与实时监听

mod firestore;
mod memory;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::{CallCounts, Faults, MemoryStore};

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::error::StoreResult;
use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch};

/// Push feed of full snapshots, newest day first
///
/// An `Err` item ends the feed; the store does not resume it.
pub type SnapshotStream = BoxStream<'static, StoreResult<Vec<SalesRecord>>>;

/// Handle to a named collection inside an opened backend app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    /// Backend app / project the collection lives in
    pub app: String,
    /// Collection id
    pub name: String,
}

impl CollectionRef {
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }
}

/// Ordered query over the collection (always `date` descending)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub limit: Option<usize>,
}

impl RecordQuery {
    /// Every record
    pub fn all() -> Self {
        Self { limit: None }
    }

    /// The `n` newest records
    pub fn latest(n: usize) -> Self {
        Self { limit: Some(n) }
    }
}

/// Remote document store
///
/// The connector drives the handshake through `check_connection`,
/// `sdk_ready` and `open`; record calls and `listen` take the
/// [`CollectionRef`] returned by `open`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Reachability probe
    async fn check_connection(&self) -> bool;

    /// Whether the client side of the backend is loaded and usable
    fn sdk_ready(&self) -> bool;

    /// Construct the app / database / collection handles
    async fn open(&self, collection: &str) -> StoreResult<CollectionRef>;

    /// One-shot ordered read
    async fn query(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<Vec<SalesRecord>>;

    /// Create a document; the backend assigns the id and both timestamps
    async fn add(&self, collection: &CollectionRef, record: &NewSalesRecord)
    -> StoreResult<String>;

    /// Merge fields into an existing document and stamp `updatedAt`
    async fn update(
        &self,
        collection: &CollectionRef,
        id: &str,
        patch: &SalesRecordPatch,
    ) -> StoreResult<()>;

    /// Hard delete
    async fn delete(&self, collection: &CollectionRef, id: &str) -> StoreResult<()>;

    /// Live feed of the ordered query; yields the current state first
    async fn listen(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<SnapshotStream>;
}
