mod config;
mod console;
mod logger;

use anyhow::Context;
use config::Config;
use console::{Console, LineFeed, TerminalConfirm};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tally_client::{
    ConnectionManager, ConnectorConfig, DocumentStore, FirestoreStore, MemoryStore, Notifier,
    SalesDesk, SyncConfig, SyncCoordinator, Toast,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 加载 .env 与配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 2. 日志
    logger::init_logger_with_file(&config.log_level, config.log_json, config.log_dir.as_deref())?;
    tracing::info!(backend = config.backend.kind(), collection = %config.collection, "Tally desk starting...");

    // 3. 存储后端
    let store: Arc<dyn DocumentStore> = match config.firestore() {
        Some(firestore) => Arc::new(
            FirestoreStore::new(firestore).context("Failed to create Firestore client")?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    // 4. 组装连接、同步与桌面
    let notifier = Notifier::default();
    let toast = Arc::new(Mutex::new(Toast::default()));
    let printer = console::spawn_notification_printer(notifier.subscribe(), toast.clone());

    let connector = Arc::new(ConnectionManager::new(
        store,
        ConnectorConfig::default().with_collection(config.collection.clone()),
        notifier,
    ));
    let sync = Arc::new(SyncCoordinator::new(connector, SyncConfig::default()));

    let lines = LineFeed::stdin();
    let dialog = Arc::new(TerminalConfirm::new(lines.clone()));
    let desk = Arc::new(SalesDesk::new(sync, dialog));

    // 5. 启动同步；失败时仍可进入控制台，稍后用 online 重试
    if let Err(e) = desk.start_sync().await {
        tracing::error!(error = %e, "Initial sync failed");
    }

    Console::new(desk.clone(), lines, toast, PathBuf::from(&config.export_dir))
        .run()
        .await;

    desk.stop_sync().await;
    printer.abort();
    tracing::info!("Tally desk stopped");
    Ok(())
}
