//! Sync coordinator - 实时订阅与断线重订阅
//!
//! At most one subscription is live at a time. Each push carries the full
//! ordered record set. A failed feed is re-established after
//! [`SyncConfig::resubscribe_delay`] by invalidating the session, running a
//! fresh handshake and re-opening the listen stream, except for
//! permission failures which end the subscription as [`SubscriptionState::Denied`].

use crate::config::SyncConfig;
use crate::connector::ConnectionManager;
use crate::error::{SyncError, SyncResult};
use crate::notify::Notifier;
use crate::store::{RecordQuery, SnapshotStream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared::error::StoreError;
use shared::models::SalesRecord;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Subscription lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Feed is live (or re-establishing after a failure)
    Active,
    /// Canceled or superseded by a newer subscription
    Unsubscribed,
    /// Backend rejected the read, no retry
    Denied,
    /// Resubscribe cap reached
    Exhausted,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Receiver of pushed snapshots
pub trait SnapshotHandler: Send + 'static {
    fn on_snapshot(&mut self, records: Vec<SalesRecord>);
}

impl<F> SnapshotHandler for F
where
    F: FnMut(Vec<SalesRecord>) + Send + 'static,
{
    fn on_snapshot(&mut self, records: Vec<SalesRecord>) {
        self(records)
    }
}

/// Shared control block of one feed
#[derive(Debug, Clone)]
struct FeedHandle {
    cancel: CancellationToken,
    state: Arc<watch::Sender<SubscriptionState>>,
}

impl FeedHandle {
    fn new() -> Self {
        let (state, _) = watch::channel(SubscriptionState::Active);
        Self {
            cancel: CancellationToken::new(),
            state: Arc::new(state),
        }
    }

    fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Move out of `Active`; terminal states never change again
    fn finish(&self, next: SubscriptionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SubscriptionState::Active {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn cancel(&self) {
        self.finish(SubscriptionState::Unsubscribed);
        self.cancel.cancel();
    }
}

/// Live feed of full snapshots
///
/// Ends once the subscription reaches a terminal state and never restarts.
/// Dropping it cancels the feed.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Vec<SalesRecord>>,
    handle: FeedHandle,
}

impl Subscription {
    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Wait until the subscription leaves `Active`
    pub async fn terminated(&self) -> SubscriptionState {
        let mut rx = self.handle.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.handle.state(),
        }
    }
}

impl Stream for Subscription {
    type Item = Vec<SalesRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Handle returned by [`SyncCoordinator::start`]
#[derive(Debug)]
pub struct Unsubscribe {
    handle: FeedHandle,
    task: JoinHandle<()>,
}

impl Unsubscribe {
    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    /// Cancel the feed and wait for the handler task to finish
    pub async fn unsubscribe(self) -> SubscriptionState {
        self.handle.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Snapshot handler task failed");
        }
        self.handle.state()
    }
}

/// State a feed task needs, detached from the coordinator
#[derive(Clone)]
struct FeedContext {
    connector: Arc<ConnectionManager>,
    notifier: Notifier,
    config: SyncConfig,
    retry_count: Arc<AtomicU32>,
}

/// Owns the single live subscription
pub struct SyncCoordinator {
    connector: Arc<ConnectionManager>,
    config: SyncConfig,
    active: Mutex<Option<FeedHandle>>,
    setup_lock: tokio::sync::Mutex<()>,
    retry_count: Arc<AtomicU32>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .field("retry_count", &self.retry_count())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(connector: Arc<ConnectionManager>, config: SyncConfig) -> Self {
        Self {
            connector,
            config,
            active: Mutex::new(None),
            setup_lock: tokio::sync::Mutex::new(()),
            retry_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn connector(&self) -> &Arc<ConnectionManager> {
        &self.connector
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Consecutive feed failures since the last push
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| handle.state() == SubscriptionState::Active)
    }

    /// Cancel the active subscription; no-op when none is active
    pub fn stop(&self) {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(handle) => {
                handle.cancel();
                tracing::info!("数据订阅已取消");
            }
            None => tracing::debug!("No active subscription to stop"),
        }
    }

    /// Open a new subscription, canceling any prior one
    pub async fn subscribe(&self) -> SyncResult<Subscription> {
        let _guard = self.setup_lock.lock().await;
        self.stop();

        let session = self
            .connector
            .session()
            .ok_or_else(|| SyncError::NotReady("后端未完全初始化".into()))?;

        tracing::info!(collection = %session.collection.name, "设置实时数据监听...");
        let stream = self
            .connector
            .store()
            .listen(&session.collection, RecordQuery::all())
            .await
            .map_err(SyncError::from_operation)?;

        self.retry_count.store(0, Ordering::Relaxed);
        let handle = FeedHandle::new();
        let (tx, rx) = mpsc::channel(self.config.snapshot_buffer.max(1));
        let ctx = FeedContext {
            connector: self.connector.clone(),
            notifier: self.connector.notifier().clone(),
            config: self.config.clone(),
            retry_count: self.retry_count.clone(),
        };
        tokio::spawn(run_feed(ctx, stream, tx, handle.clone()));

        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        Ok(Subscription { rx, handle })
    }

    /// Subscribe and feed every snapshot to `handler`
    pub async fn start<H: SnapshotHandler>(&self, mut handler: H) -> SyncResult<Unsubscribe> {
        let mut subscription = self.subscribe().await?;
        let handle = subscription.handle.clone();
        let cancel = handle.cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = subscription.next() => match next {
                        Some(records) => handler.on_snapshot(records),
                        None => break,
                    },
                }
            }
        });

        Ok(Unsubscribe { handle, task })
    }
}

/// Pump pushes into `tx`, re-establishing the feed after failures
async fn run_feed(
    ctx: FeedContext,
    mut stream: SnapshotStream,
    tx: mpsc::Sender<Vec<SalesRecord>>,
    handle: FeedHandle,
) {
    loop {
        let failure = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return,
            failure = pump(&ctx, &mut stream, &tx) => failure,
        };
        let Some(failure) = failure else {
            // 消费端已关闭
            handle.cancel();
            return;
        };

        if failure.is_permission_denied() {
            tracing::error!(error = %failure, "实时数据监听被拒绝");
            ctx.notifier.error("没有数据访问权限，请检查安全规则");
            handle.finish(SubscriptionState::Denied);
            return;
        }

        tracing::error!(error = %failure, "实时数据监听错误");
        ctx.notifier.error(format!("数据同步失败: {}", failure.message));

        let outcome = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return,
            outcome = resubscribe(&ctx) => outcome,
        };
        match outcome {
            Ok(next) => stream = next,
            Err(state) => {
                handle.finish(state);
                return;
            }
        }
    }
}

/// Forward snapshots until the stream fails; `None` when the consumer is gone
async fn pump(
    ctx: &FeedContext,
    stream: &mut SnapshotStream,
    tx: &mpsc::Sender<Vec<SalesRecord>>,
) -> Option<StoreError> {
    loop {
        match stream.next().await {
            Some(Ok(records)) => {
                tracing::debug!(count = records.len(), "收到实时数据更新");
                ctx.retry_count.store(0, Ordering::Relaxed);
                if tx.send(records).await.is_err() {
                    return None;
                }
            }
            Some(Err(err)) => return Some(err),
            None => return Some(StoreError::unavailable("Snapshot stream ended")),
        }
    }
}

/// Reconnect and re-open the listen stream until it works
async fn resubscribe(ctx: &FeedContext) -> Result<SnapshotStream, SubscriptionState> {
    let max = ctx.config.max_resubscribe_attempts;
    loop {
        let round = ctx.retry_count.fetch_add(1, Ordering::Relaxed) + 1;
        if max > 0 && round > max {
            tracing::error!(max, "Resubscribe attempts exhausted");
            ctx.notifier.error("数据同步失败，已达到最大重试次数");
            return Err(SubscriptionState::Exhausted);
        }

        tokio::time::sleep(ctx.config.resubscribe_delay).await;
        tracing::info!(round, "重新建立数据监听");
        ctx.connector.invalidate();

        match reopen(ctx).await {
            Ok(stream) => return Ok(stream),
            Err(err) if err.is_permission() => {
                ctx.notifier.error("没有数据访问权限，请检查安全规则");
                return Err(SubscriptionState::Denied);
            }
            Err(err) => tracing::warn!(round, error = %err, "重新订阅失败"),
        }
    }
}

async fn reopen(ctx: &FeedContext) -> SyncResult<SnapshotStream> {
    let session = ctx.connector.connect().await?;
    ctx.connector
        .store()
        .listen(&session.collection, RecordQuery::all())
        .await
        .map_err(SyncError::from_operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::store::{Faults, MemoryStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use shared::models::SALES_COLLECTION;
    use std::time::Duration;

    fn record(id: &str, day: u32) -> SalesRecord {
        SalesRecord {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            sales: Decimal::from(100),
            wechat: 1,
            samples: 1,
            notes: String::new(),
            timestamp: None,
            created_at: None,
            updated_at: None,
        }
    }

    async fn connected(store: &MemoryStore, config: SyncConfig) -> SyncCoordinator {
        let connector = Arc::new(ConnectionManager::new(
            Arc::new(store.clone()),
            ConnectorConfig::default(),
            Notifier::default(),
        ));
        connector.connect().await.unwrap();
        SyncCoordinator::new(connector, config)
    }

    #[tokio::test]
    async fn test_subscribe_requires_session() {
        let store = MemoryStore::new();
        let connector = Arc::new(ConnectionManager::new(
            Arc::new(store),
            ConnectorConfig::default(),
            Notifier::default(),
        ));
        let sync = SyncCoordinator::new(connector, SyncConfig::default());

        let err = sync.subscribe().await.unwrap_err();
        assert!(matches!(err, SyncError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_stop_without_subscription_is_noop() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;
        sync.stop();
        sync.stop();
        assert!(!sync.is_active());
    }

    #[tokio::test]
    async fn test_first_push_is_current_state() {
        let store = MemoryStore::new();
        store.seed(SALES_COLLECTION, [record("a", 1), record("b", 2)]);
        let sync = connected(&store, SyncConfig::default()).await;

        let mut sub = sync.subscribe().await.unwrap();
        let first = sub.next().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].id, "b");
        assert_eq!(sub.state(), SubscriptionState::Active);
    }

    #[tokio::test]
    async fn test_new_subscription_supersedes_previous() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;

        let mut first = sync.subscribe().await.unwrap();
        let second = sync.subscribe().await.unwrap();

        assert_eq!(first.state(), SubscriptionState::Unsubscribed);
        assert_eq!(second.state(), SubscriptionState::Active);
        // 被取代的订阅流最终结束且不再重启
        while first.next().await.is_some() {}
        assert!(first.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_resolves_unsubscribed() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = sync
            .start(move |records: Vec<SalesRecord>| sink.lock().unwrap().push(records.len()))
            .await
            .unwrap();
        assert!(handle.is_active());

        assert_eq!(handle.unsubscribe().await, SubscriptionState::Unsubscribed);
        assert!(!sync.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_failure_is_denied() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;
        let mut sub = sync.subscribe().await.unwrap();
        sub.next().await.unwrap();

        store.fail_listeners(StoreError::permission_denied("rules"));
        assert_eq!(sub.terminated().await, SubscriptionState::Denied);
        assert!(sub.next().await.is_none());
        assert_eq!(store.calls().listens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_after_stream_failure() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;
        let mut sub = sync.subscribe().await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        store.fail_listeners(StoreError::unavailable("stream reset"));
        store.seed(SALES_COLLECTION, [record("a", 1)]);

        let started = tokio::time::Instant::now();
        let next = sub.next().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(next.len(), 1);
        assert_eq!(sub.state(), SubscriptionState::Active);
        assert_eq!(store.calls().listens, 2);
        assert_eq!(store.calls().probes, 2);
        assert_eq!(sync.retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_cap() {
        let store = MemoryStore::new();
        let sync = connected(
            &store,
            SyncConfig::default().with_max_resubscribe_attempts(2),
        )
        .await;
        let mut sub = sync.subscribe().await.unwrap();
        sub.next().await.unwrap();

        store.update_faults(|f| f.listen_failures = 10);
        store.fail_listeners(StoreError::unavailable("stream reset"));

        assert_eq!(sub.terminated().await, SubscriptionState::Exhausted);
        assert!(sub.next().await.is_none());
        assert_eq!(store.calls().listens, 3);
    }

    #[tokio::test]
    async fn test_setup_failure_denied() {
        let store = MemoryStore::new();
        let sync = connected(&store, SyncConfig::default()).await;
        store.update_faults(|f| f.deny_reads = true);

        let err = sync.subscribe().await.unwrap_err();
        assert!(err.is_permission());
        assert!(!sync.is_active());
    }
}
