//! Desk configuration, loaded from the environment

use shared::models::SALES_COLLECTION;
use std::time::Duration;
use tally_client::FirestoreConfig;

/// Which document store backs the desk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// 进程内存储 (演示 / 离线)
    Memory,
    Firestore {
        project_id: String,
        api_key: Option<String>,
        base_url: Option<String>,
    },
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Firestore { .. } => "firestore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    /// 销售数据集合名称
    pub collection: String,
    /// Firestore 轮询间隔 (毫秒)
    pub poll_interval_ms: u64,
    /// 日志级别
    pub log_level: String,
    /// 是否输出 JSON 日志
    pub log_json: bool,
    /// 日志目录 (未设置则只输出到控制台)
    pub log_dir: Option<String>,
    /// CSV 导出目录
    pub export_dir: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend = match var("TALLY_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => Backend::Memory,
            "firestore" => Backend::Firestore {
                project_id: var("FIRESTORE_PROJECT_ID").filter(|p| !p.is_empty()).ok_or_else(
                    || anyhow::anyhow!("FIRESTORE_PROJECT_ID is required for the firestore backend"),
                )?,
                api_key: var("FIRESTORE_API_KEY").filter(|k| !k.is_empty()),
                base_url: var("FIRESTORE_BASE_URL").filter(|u| !u.is_empty()),
            },
            other => anyhow::bail!("Unknown TALLY_BACKEND: {other} (expected memory|firestore)"),
        };

        Ok(Self {
            backend,
            collection: var("SALES_COLLECTION").unwrap_or_else(|| SALES_COLLECTION.into()),
            poll_interval_ms: var("POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_json: var("LOG_JSON")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: var("LOG_DIR").filter(|d| !d.is_empty()),
            export_dir: var("EXPORT_DIR").unwrap_or_else(|| ".".into()),
        })
    }

    /// Firestore store settings, when that backend is selected
    pub fn firestore(&self) -> Option<FirestoreConfig> {
        let Backend::Firestore {
            project_id,
            api_key,
            base_url,
        } = &self.backend
        else {
            return None;
        };

        let mut config = FirestoreConfig::new(project_id.clone())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms));
        if let Some(key) = api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(url) = base_url {
            config = config.with_base_url(url.clone());
        }
        Some(config)
    }
}
