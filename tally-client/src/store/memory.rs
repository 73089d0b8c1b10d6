// tally-client/src/store/memory.rs
// 内存文档存储 (同进程) - 用于测试和离线演示

use super::{CollectionRef, DocumentStore, RecordQuery, SnapshotStream};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use shared::error::{StoreError, StoreResult};
use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch, sort_by_date_desc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

const APP_NAME: &str = "memory";
const DENIED: &str = "Missing or insufficient permissions.";

#[derive(Debug, Clone)]
enum StoreEvent {
    Changed(String),
    Failed(StoreError),
    Closed,
}

/// Injected failures
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// 接下来 N 次连通性探测失败
    pub probe_failures: u32,
    /// SDK 在第 N 次轮询时才就绪 (`u32::MAX` 表示永不就绪)
    pub sdk_ready_after: u32,
    /// 所有读取 (query / listen) 返回 permission-denied
    pub deny_reads: bool,
    /// 所有写入返回 permission-denied
    pub deny_writes: bool,
    /// 接下来 N 次写入返回 unavailable
    pub write_failures: u32,
    /// 接下来 N 次 listen 调用返回 unavailable
    pub listen_failures: u32,
}

/// Call counters, for asserting which path the client took
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub probes: u32,
    pub opens: u32,
    pub queries: u32,
    pub adds: u32,
    pub updates: u32,
    pub deletes: u32,
    pub listens: u32,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, Vec<SalesRecord>>,
    faults: Faults,
    sdk_polls: u32,
    calls: CallCounts,
    probe_log: Vec<Instant>,
}

/// In-process document store
///
/// Every write pushes a fresh snapshot to all listeners of the collection,
/// the way the remote store's change feed does.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            events,
        }
    }

    /// Store pre-loaded with `faults`
    pub fn with_faults(faults: Faults) -> Self {
        let store = Self::new();
        store.set_faults(faults);
        store
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // 没有监听者时发送失败，忽略
        let _ = self.events.send(event);
    }

    pub fn set_faults(&self, faults: Faults) {
        self.state().faults = faults;
    }

    pub fn update_faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.state().faults);
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Instants of every reachability probe, in call order
    pub fn probe_log(&self) -> Vec<Instant> {
        self.state().probe_log.clone()
    }

    /// Insert stored records directly, bypassing fault injection
    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = SalesRecord>) {
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .extend(records);
        self.emit(StoreEvent::Changed(collection.to_string()));
    }

    /// Current contents, newest day first
    pub fn records(&self, collection: &str) -> Vec<SalesRecord> {
        let mut records = self
            .state()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        sort_by_date_desc(&mut records);
        records
    }

    /// Terminate every open listener with `err`
    pub fn fail_listeners(&self, err: StoreError) {
        self.emit(StoreEvent::Failed(err));
    }

    /// End every open listener without an error
    pub fn close_listeners(&self) {
        self.emit(StoreEvent::Closed);
    }

    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn snapshot(&self, collection: &str, limit: Option<usize>) -> StoreResult<Vec<SalesRecord>> {
        if self.state().faults.deny_reads {
            return Err(StoreError::permission_denied(DENIED));
        }
        let mut records = self.records(collection);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn check_write(&self) -> StoreResult<()> {
        let mut state = self.state();
        if state.faults.deny_writes {
            return Err(StoreError::permission_denied(DENIED));
        }
        if state.faults.write_failures > 0 {
            state.faults.write_failures -= 1;
            return Err(StoreError::unavailable("The service is currently unavailable."));
        }
        Ok(())
    }
}

struct Listener {
    store: MemoryStore,
    collection: String,
    limit: Option<usize>,
    rx: broadcast::Receiver<StoreEvent>,
    primed: bool,
    done: bool,
}

async fn next_snapshot(
    mut listener: Listener,
) -> Option<(StoreResult<Vec<SalesRecord>>, Listener)> {
    if listener.done {
        return None;
    }
    if !listener.primed {
        listener.primed = true;
        let snapshot = listener.store.snapshot(&listener.collection, listener.limit);
        listener.done = snapshot.is_err();
        return Some((snapshot, listener));
    }
    loop {
        match listener.rx.recv().await {
            Ok(StoreEvent::Changed(name)) if name == listener.collection => break,
            Ok(StoreEvent::Changed(_)) => continue,
            Ok(StoreEvent::Failed(err)) => {
                listener.done = true;
                return Some((Err(err), listener));
            }
            Ok(StoreEvent::Closed) | Err(broadcast::error::RecvError::Closed) => return None,
            // 丢失的变更无关紧要，下一个快照是完整的
            Err(broadcast::error::RecvError::Lagged(_)) => break,
        }
    }
    let snapshot = listener.store.snapshot(&listener.collection, listener.limit);
    listener.done = snapshot.is_err();
    Some((snapshot, listener))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn check_connection(&self) -> bool {
        let mut state = self.state();
        state.calls.probes += 1;
        state.probe_log.push(Instant::now());
        if state.faults.probe_failures > 0 {
            state.faults.probe_failures -= 1;
            return false;
        }
        true
    }

    fn sdk_ready(&self) -> bool {
        let mut state = self.state();
        let ready = state.sdk_polls >= state.faults.sdk_ready_after;
        state.sdk_polls = state.sdk_polls.saturating_add(1);
        ready
    }

    async fn open(&self, collection: &str) -> StoreResult<CollectionRef> {
        let mut state = self.state();
        state.calls.opens += 1;
        state.collections.entry(collection.to_string()).or_default();
        Ok(CollectionRef::new(APP_NAME, collection))
    }

    async fn query(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<Vec<SalesRecord>> {
        self.state().calls.queries += 1;
        self.snapshot(&collection.name, query.limit)
    }

    async fn add(
        &self,
        collection: &CollectionRef,
        record: &NewSalesRecord,
    ) -> StoreResult<String> {
        self.state().calls.adds += 1;
        self.check_write()?;

        let id = Uuid::new_v4().simple().to_string();
        let stored = record.clone().into_record(id.clone(), chrono::Utc::now());
        self.state()
            .collections
            .entry(collection.name.clone())
            .or_default()
            .push(stored);
        self.emit(StoreEvent::Changed(collection.name.clone()));
        Ok(id)
    }

    async fn update(
        &self,
        collection: &CollectionRef,
        id: &str,
        patch: &SalesRecordPatch,
    ) -> StoreResult<()> {
        self.state().calls.updates += 1;
        self.check_write()?;

        {
            let mut state = self.state();
            let record = state
                .collections
                .get_mut(&collection.name)
                .and_then(|records| records.iter_mut().find(|r| r.id == id))
                .ok_or_else(|| StoreError::not_found(format!("No document to update: {id}")))?;
            patch.apply(record, chrono::Utc::now());
        }
        self.emit(StoreEvent::Changed(collection.name.clone()));
        Ok(())
    }

    async fn delete(&self, collection: &CollectionRef, id: &str) -> StoreResult<()> {
        self.state().calls.deletes += 1;
        self.check_write()?;

        if let Some(records) = self.state().collections.get_mut(&collection.name) {
            records.retain(|r| r.id != id);
        }
        self.emit(StoreEvent::Changed(collection.name.clone()));
        Ok(())
    }

    async fn listen(
        &self,
        collection: &CollectionRef,
        query: RecordQuery,
    ) -> StoreResult<SnapshotStream> {
        {
            let mut state = self.state();
            state.calls.listens += 1;
            if state.faults.listen_failures > 0 {
                state.faults.listen_failures -= 1;
                return Err(StoreError::unavailable("Listen stream could not be opened."));
            }
            if state.faults.deny_reads {
                return Err(StoreError::permission_denied(DENIED));
            }
        }

        let listener = Listener {
            store: self.clone(),
            collection: collection.name.clone(),
            limit: query.limit,
            rx: self.events.subscribe(),
            primed: false,
            done: false,
        };
        Ok(stream::unfold(listener, next_snapshot).boxed())
    }
}
