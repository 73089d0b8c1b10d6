//! Sales desk controller
//!
//! Glues the entry form, the confirm dialog and the cache to the connector
//! and the sync feed. Record operation failures are reported as
//! notifications here and never touch the cache or the subscription; the
//! next push is the only thing that changes what the desk shows.

use super::export::CsvExport;
use super::form::SalesForm;
use super::projection::{
    MonthlySummary, RecentCard, TableRow, format_date_zh, monthly_summary, recent_cards,
    table_rows,
};
use crate::cache::{CacheWriter, SalesCache};
use crate::connector::ConnectionManager;
use crate::error::{SyncError, SyncResult};
use crate::notify::Notifier;
use crate::sync::{SyncCoordinator, Unsubscribe};
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::models::SalesRecordPatch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Answer to a confirm prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Yes,
    No,
    /// Dialog dismissed without an answer
    Close,
}

/// Modal yes/no prompt; only [`ConfirmAction::Yes`] proceeds
#[async_trait]
pub trait ConfirmDialog: Send + Sync {
    async fn confirm(&self, title: &str, message: &str) -> ConfirmAction;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created(String),
    Updated(String),
    /// Overwrite of an existing day was not confirmed
    Declined,
}

/// Everything the desk renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskView {
    pub summary: MonthlySummary,
    pub recent: Vec<RecentCard>,
    pub table: Vec<TableRow>,
}

impl DeskView {
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

pub struct SalesDesk {
    connector: Arc<ConnectionManager>,
    sync: Arc<SyncCoordinator>,
    dialog: Arc<dyn ConfirmDialog>,
    notifier: Notifier,
    cache: SalesCache,
    writer: CacheWriter,
    feed: Mutex<Option<Unsubscribe>>,
}

impl std::fmt::Debug for SalesDesk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesDesk")
            .field("connected", &self.connector.is_connected())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl SalesDesk {
    pub fn new(sync: Arc<SyncCoordinator>, dialog: Arc<dyn ConfirmDialog>) -> Self {
        let connector = sync.connector().clone();
        let notifier = connector.notifier().clone();
        let (writer, cache) = SalesCache::new();
        Self {
            connector,
            sync,
            dialog,
            notifier,
            cache,
            writer,
            feed: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &SalesCache {
        &self.cache
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn connector(&self) -> &Arc<ConnectionManager> {
        &self.connector
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }

    /// Save the form; a day that already exists is overwritten only on confirmation
    pub async fn submit(&self, form: &SalesForm) -> SyncResult<SubmitOutcome> {
        let record = form.parse().inspect_err(|e| self.notifier.error(e.detail()))?;

        let Some(existing) = self.cache.find_by_date(record.date) else {
            let id = self
                .connector
                .create(&record)
                .await
                .inspect_err(|e| self.report("添加", e))?;
            self.notifier.success("数据添加成功！");
            return Ok(SubmitOutcome::Created(id));
        };

        let message = format!("{} 的数据已存在，是否覆盖？", record.date.format("%Y-%m-%d"));
        if self.dialog.confirm("数据已存在", &message).await != ConfirmAction::Yes {
            tracing::debug!(date = %record.date, "Overwrite declined");
            return Ok(SubmitOutcome::Declined);
        }

        self.connector
            .update(&existing.id, &SalesRecordPatch::from(record))
            .await
            .inspect_err(|e| self.report("更新", e))?;
        self.notifier.success("数据更新成功！");
        Ok(SubmitOutcome::Updated(existing.id))
    }

    /// Form pre-filled from cached record `id`
    pub fn edit(&self, id: &str) -> Option<SalesForm> {
        self.cache.find_by_id(id).map(|r| SalesForm::from_record(&r))
    }

    /// Delete after confirmation; `Ok(false)` when unknown or declined
    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        let Some(record) = self.cache.find_by_id(id) else {
            tracing::debug!(id, "Delete of uncached record ignored");
            return Ok(false);
        };

        let message = format!(
            "确定要删除 {} 的数据吗？此操作不可恢复。",
            format_date_zh(record.date)
        );
        if self.dialog.confirm("确认删除", &message).await != ConfirmAction::Yes {
            return Ok(false);
        }

        self.connector
            .delete(id)
            .await
            .inspect_err(|e| self.report("删除", e))?;
        self.notifier.success("数据删除成功！");
        Ok(true)
    }

    /// Render the cache as CSV
    pub fn export(&self) -> SyncResult<CsvExport> {
        CsvExport::build(&self.cache.snapshot(), shared::util::today())
            .inspect_err(|e| self.notifier.error(e.detail()))
    }

    /// Render and write the CSV into `dir`
    pub async fn export_to(&self, dir: &Path) -> SyncResult<PathBuf> {
        let export = self.export()?;
        let path = export
            .write_to(dir)
            .await
            .inspect_err(|e| self.report("导出", e))?;
        self.notifier.success("数据导出成功");
        Ok(path)
    }

    pub fn view(&self) -> DeskView {
        self.view_at(shared::util::today())
    }

    /// View with the monthly summary taken for `today`'s month
    pub fn view_at(&self, today: NaiveDate) -> DeskView {
        let records = self.cache.snapshot();
        DeskView {
            summary: monthly_summary(&records, today),
            recent: recent_cards(&records),
            table: table_rows(&records),
        }
    }

    /// Connect and start the feed into the cache, retrying setup failures
    pub async fn start_sync(&self) -> SyncResult<()> {
        let config = self.sync.config();
        let max_retries = config.max_setup_retries;
        let mut retries = 0u32;
        loop {
            match self.try_start_sync().await {
                Ok(()) => {
                    tracing::info!("数据同步设置成功");
                    self.notifier.success("数据同步已启动");
                    return Ok(());
                }
                Err(err) if retries < max_retries && !err.is_permission() => {
                    retries += 1;
                    let delay = config.setup_retry_step * retries;
                    tracing::warn!(retries, max_retries, error = %err, "数据同步失败，{}秒后重试", delay.as_secs_f64());
                    self.notifier.warning(format!(
                        "数据同步失败，正在重试 ({}/{})",
                        retries, max_retries
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "设置数据同步失败");
                    self.notifier.error(format!("数据同步失败: {}", err.detail()));
                    return Err(err);
                }
            }
        }
    }

    async fn try_start_sync(&self) -> SyncResult<()> {
        self.connector.connect().await?;
        let handle = self.sync.start(self.writer.clone()).await?;
        let previous = self.feed.lock().await.replace(handle);
        if let Some(previous) = previous {
            previous.unsubscribe().await;
        }
        Ok(())
    }

    /// Cancel the feed; the cache keeps its last contents
    pub async fn stop_sync(&self) {
        self.sync.stop();
        if let Some(handle) = self.feed.lock().await.take() {
            handle.unsubscribe().await;
        }
    }

    /// Connectivity came back: restart the sync from scratch
    pub async fn network_restored(&self) -> SyncResult<()> {
        tracing::info!("网络已恢复，尝试重新连接...");
        self.notifier.info("网络已恢复，正在重新连接...");
        self.start_sync().await
    }

    pub fn network_lost(&self) {
        tracing::warn!("网络已断开");
        self.notifier.warning("网络已断开，等待重新连接...");
    }

    fn report(&self, action: &str, err: &SyncError) {
        tracing::error!(action, error = %err, "Record operation failed");
        match err {
            SyncError::Permission(_) => self
                .notifier
                .error(format!("没有{}数据的权限，请检查安全规则", action)),
            other => self
                .notifier
                .error(format!("{}数据失败: {}", action, other.detail())),
        }
    }
}
