//! Local cache - ordered in-memory mirror of the collection
//!
//! The cache always equals the last snapshot pushed by the subscription.
//! [`CacheWriter`] is handed to the sync feed and is the only thing that
//! replaces the contents; views read through [`SalesCache`].

use crate::sync::SnapshotHandler;
use chrono::NaiveDate;
use shared::models::SalesRecord;
use std::sync::Arc;
use tokio::sync::watch;

pub type Snapshot = Arc<[SalesRecord]>;

/// Read side, cheap to clone
#[derive(Debug, Clone)]
pub struct SalesCache {
    rx: watch::Receiver<Snapshot>,
}

/// Write side, fed by the subscription
#[derive(Debug, Clone)]
pub struct CacheWriter {
    tx: Arc<watch::Sender<Snapshot>>,
}

impl SalesCache {
    /// Empty cache and its writer
    pub fn new() -> (CacheWriter, SalesCache) {
        let (tx, rx) = watch::channel(Snapshot::from(Vec::new()));
        (CacheWriter { tx: Arc::new(tx) }, SalesCache { rx })
    }

    /// Current contents, newest day first
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<SalesRecord> {
        self.rx.borrow().iter().find(|r| r.id == id).cloned()
    }

    /// First cached record for `date` (the soft unique key)
    pub fn find_by_date(&self, date: NaiveDate) -> Option<SalesRecord> {
        self.rx.borrow().iter().find(|r| r.date == date).cloned()
    }

    /// Wait for the next replace; `false` once the writer is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl CacheWriter {
    /// Replace the whole contents with a pushed snapshot
    pub fn replace(&self, records: Vec<SalesRecord>) {
        tracing::debug!(count = records.len(), "Cache replaced");
        self.tx.send_replace(Snapshot::from(records));
    }
}

impl SnapshotHandler for CacheWriter {
    fn on_snapshot(&mut self, records: Vec<SalesRecord>) {
        self.replace(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(id: &str, date: &str) -> SalesRecord {
        SalesRecord {
            id: id.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            sales: Decimal::from(10),
            wechat: 1,
            samples: 2,
            notes: String::new(),
            timestamp: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_last_snapshot_wins() {
        let (writer, cache) = SalesCache::new();
        assert!(cache.is_empty());

        writer.replace(vec![record("a", "2024-01-02"), record("b", "2024-01-01")]);
        writer.replace(vec![record("c", "2024-01-03")]);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "c");
        assert!(cache.find_by_id("a").is_none());
    }

    #[test]
    fn test_lookup_by_id_and_date() {
        let (writer, cache) = SalesCache::new();
        writer.replace(vec![record("a", "2024-01-02"), record("b", "2024-01-01")]);

        assert_eq!(cache.find_by_id("b").unwrap().date.to_string(), "2024-01-01");
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(cache.find_by_date(day).unwrap().id, "a");
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_readers_observe_changes() {
        let (mut writer, mut cache) = SalesCache::new();
        let reader = cache.clone();

        writer.on_snapshot(vec![record("a", "2024-01-02")]);
        assert!(cache.changed().await);
        assert_eq!(reader.len(), 1);

        drop(writer);
        assert!(!cache.changed().await);
    }
}
