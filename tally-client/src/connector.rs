//! Backend connector - 连接握手、重试与会话管理
//!
//! A [`Session`] is established by a four step handshake:
//! reachability probe, SDK readiness wait, collection open, and a trial
//! read of one record. Retryable failures repeat the whole sequence with a
//! growing delay; permission and SDK failures surface immediately.
//!
//! Record operations run against the cached session and never tear it down.

use crate::config::ConnectorConfig;
use crate::error::{SyncError, SyncResult};
use crate::notify::Notifier;
use crate::store::{CollectionRef, DocumentStore, RecordQuery};
use chrono::{DateTime, Utc};
use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// Established handle to the backend collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// 第几次成功握手 (从 1 开始)
    pub generation: u64,
    pub collection: CollectionRef,
    pub established_at: DateTime<Utc>,
}

/// Owns the backend session
///
/// `connect()` is idempotent: once a session exists it is returned without a
/// new handshake. Concurrent callers are serialized on the handshake lock and
/// the later ones get the session the first one established.
pub struct ConnectionManager {
    store: Arc<dyn DocumentStore>,
    config: ConnectorConfig,
    notifier: Notifier,
    session: RwLock<Option<Session>>,
    handshake_lock: Mutex<()>,
    generations: AtomicU64,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: ConnectorConfig, notifier: Notifier) -> Self {
        Self {
            store,
            config,
            notifier,
            session: RwLock::new(None),
            handshake_lock: Mutex::new(()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Current session, if established
    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    /// Drop the cached session; the next `connect()` runs a full handshake
    pub fn invalidate(&self) {
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = previous {
            tracing::info!(generation = session.generation, "Session invalidated");
        }
    }

    /// Establish (or return) the session
    pub async fn connect(&self) -> SyncResult<Session> {
        let _guard = self.handshake_lock.lock().await;
        if let Some(session) = self.session() {
            return Ok(session);
        }

        let max_attempts = self.config.max_connect_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tracing::info!(attempt, max_attempts, "正在连接后端...");

            match self.handshake().await {
                Ok(collection) => {
                    let session = Session {
                        generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
                        collection,
                        established_at: Utc::now(),
                    };
                    tracing::info!(
                        generation = session.generation,
                        collection = %session.collection.name,
                        "后端连接成功"
                    );
                    *self.session.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(session.clone());
                    return Ok(session);
                }
                Err(err) if !err.is_retryable() || attempt >= max_attempts => {
                    tracing::error!(attempt, error = %err, "后端连接失败");
                    self.report_failure(&err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.config.retry_base_delay * attempt;
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Handshake failed, retrying"
                    );
                    self.notifier.warning(format!(
                        "连接失败，{}秒后重试... ({}/{})",
                        delay.as_secs_f64(),
                        attempt,
                        max_attempts
                    ));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn handshake(&self) -> SyncResult<CollectionRef> {
        if !self.store.check_connection().await {
            return Err(SyncError::Network("后端服务不可达".into()));
        }

        self.wait_for_sdk().await?;

        let collection = self
            .store
            .open(&self.config.collection)
            .await
            .map_err(SyncError::from_handshake)?;

        // 试读一条记录，验证访问权限
        let trial = self
            .store
            .query(&collection, RecordQuery::latest(1))
            .await
            .map_err(SyncError::from_handshake)?;
        tracing::debug!(count = trial.len(), "Trial read succeeded");

        Ok(collection)
    }

    /// Poll `sdk_ready` until it reports ready or the poll budget runs out
    async fn wait_for_sdk(&self) -> SyncResult<()> {
        let attempts = self.config.sdk_poll_attempts;
        let mut polls = 0u32;
        while !self.store.sdk_ready() {
            if polls >= attempts {
                return Err(SyncError::SdkLoad(format!(
                    "SDK not ready after {} polls",
                    attempts
                )));
            }
            tokio::time::sleep(self.config.sdk_poll_interval).await;
            polls += 1;
            tracing::debug!("等待 SDK 加载... ({}/{})", polls, attempts);
        }
        Ok(())
    }

    fn report_failure(&self, err: &SyncError) {
        match err {
            SyncError::Permission(_) => self.notifier.error("后端访问被拒绝，请检查安全规则"),
            SyncError::SdkLoad(_) => self.notifier.error("SDK 加载失败，请检查网络连接"),
            other => self.notifier.error(format!("连接失败: {other}")),
        }
    }

    fn require_session(&self) -> SyncResult<Session> {
        self.session()
            .ok_or_else(|| SyncError::NotReady("未连接到后端".into()))
    }

    /// Create a record; the backend assigns the id
    pub async fn create(&self, record: &NewSalesRecord) -> SyncResult<String> {
        let session = self.require_session()?;
        let id = self
            .store
            .add(&session.collection, record)
            .await
            .map_err(SyncError::from_operation)?;
        tracing::info!(id = %id, date = %record.date, "Record created");
        Ok(id)
    }

    /// Merge `patch` into record `id`
    pub async fn update(&self, id: &str, patch: &SalesRecordPatch) -> SyncResult<()> {
        let session = self.require_session()?;
        self.store
            .update(&session.collection, id, patch)
            .await
            .map_err(SyncError::from_operation)?;
        tracing::info!(id = %id, "Record updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let session = self.require_session()?;
        self.store
            .delete(&session.collection, id)
            .await
            .map_err(SyncError::from_operation)?;
        tracing::info!(id = %id, "Record deleted");
        Ok(())
    }

    /// One-shot ordered read of the whole collection
    pub async fn fetch_all(&self) -> SyncResult<Vec<SalesRecord>> {
        let session = self.require_session()?;
        self.store
            .query(&session.collection, RecordQuery::all())
            .await
            .map_err(SyncError::from_operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Severity;
    use crate::store::{Faults, MemoryStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn manager(store: &MemoryStore) -> ConnectionManager {
        ConnectionManager::new(
            Arc::new(store.clone()),
            ConnectorConfig::default(),
            Notifier::default(),
        )
    }

    fn new_record(day: u32) -> NewSalesRecord {
        NewSalesRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            sales: Decimal::new(1005, 1),
            wechat: 3,
            samples: 5,
            notes: String::new(),
            timestamp: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.generation, 1);
        assert_eq!(store.calls().probes, 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_new_handshake() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        manager.connect().await.unwrap();
        manager.invalidate();
        assert!(!manager.is_connected());

        let session = manager.connect().await.unwrap();
        assert_eq!(session.generation, 2);
        assert_eq!(store.calls().probes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_warnings_then_terminal_error() {
        let store = MemoryStore::with_faults(Faults {
            probe_failures: 10,
            ..Default::default()
        });
        let manager = manager(&store);
        let mut rx = manager.notifier().subscribe();

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(store.calls().probes, 3);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.severity, Severity::Warning);
        assert_eq!(first.message, "连接失败，3秒后重试... (1/3)");
        assert_eq!(rx.recv().await.unwrap().message, "连接失败，6秒后重试... (2/3)");
        assert_eq!(rx.recv().await.unwrap().severity, Severity::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sdk_timeout_is_not_retried() {
        let store = MemoryStore::with_faults(Faults {
            sdk_ready_after: u32::MAX,
            ..Default::default()
        });
        let manager = manager(&store);

        let started = tokio::time::Instant::now();
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::SdkLoad(_)));
        assert_eq!(store.calls().probes, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sdk_becomes_ready_while_waiting() {
        let store = MemoryStore::with_faults(Faults {
            sdk_ready_after: 4,
            ..Default::default()
        });
        let manager = manager(&store);

        let started = tokio::time::Instant::now();
        manager.connect().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_record_ops_require_session() {
        let store = MemoryStore::new();
        let manager = manager(&store);

        let err = manager.create(&new_record(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotReady(_)));
        assert!(matches!(manager.fetch_all().await, Err(SyncError::NotReady(_))));
        assert_eq!(store.calls().adds, 0);
    }

    #[tokio::test]
    async fn test_record_ops_roundtrip() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        manager.connect().await.unwrap();

        let id = manager.create(&new_record(1)).await.unwrap();
        manager.create(&new_record(2)).await.unwrap();

        let patch = SalesRecordPatch {
            wechat: Some(9),
            ..Default::default()
        };
        manager.update(&id, &patch).await.unwrap();

        let all = manager.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date.to_string(), "2024-01-02");
        assert_eq!(all[1].wechat, 9);

        manager.delete(&id).await.unwrap();
        assert_eq!(manager.fetch_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_session() {
        let store = MemoryStore::new();
        let manager = manager(&store);
        manager.connect().await.unwrap();

        store.update_faults(|f| f.deny_writes = true);
        let err = manager.create(&new_record(1)).await.unwrap_err();
        assert!(err.is_permission());
        assert!(manager.is_connected());

        store.update_faults(|f| {
            f.deny_writes = false;
            f.write_failures = 1;
        });
        let err = manager.delete("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::Operation(_)));
        assert!(manager.is_connected());
    }
}
