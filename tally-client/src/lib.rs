//! Tally Client - 销售数据同步客户端
//!
//! Connects to the remote sales collection, keeps a live local mirror of it
//! and drives the sales desk on top of that mirror.

pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod notify;
pub mod store;
pub mod sync;
pub mod view;

pub use cache::{CacheWriter, SalesCache};
pub use config::{ConnectorConfig, SyncConfig};
pub use connector::{ConnectionManager, Session};
pub use error::{SyncError, SyncResult};
pub use notify::{Notification, Notifier, Severity, TOAST_TTL, Toast};
pub use store::{DocumentStore, FirestoreConfig, FirestoreStore, MemoryStore};
pub use sync::{SnapshotHandler, Subscription, SubscriptionState, SyncCoordinator, Unsubscribe};
pub use view::{ConfirmAction, ConfirmDialog, CsvExport, DeskView, SalesDesk, SalesForm, SubmitOutcome};

// Re-export shared types for convenience
pub use shared::error::{StoreError, StoreErrorCode};
pub use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch};
