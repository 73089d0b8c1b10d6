//! Client configuration
//!
//! Defaults follow the desk's production behaviour: three connect attempts
//! spaced `attempt * 3s`, a 10 s SDK wait (20 polls of 500 ms), and a
//! 3 s pause before every resubscribe.

use shared::models::SALES_COLLECTION;
use std::time::Duration;

/// Backend connector configuration
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Collection holding the sales records
    pub collection: String,
    /// Maximum handshake attempts per `connect()` call
    pub max_connect_attempts: u32,
    /// Base delay; the wait after attempt `n` is `n * retry_base_delay`
    pub retry_base_delay: Duration,
    /// SDK readiness poll interval
    pub sdk_poll_interval: Duration,
    /// SDK readiness poll count before giving up
    pub sdk_poll_attempts: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            collection: SALES_COLLECTION.to_string(),
            max_connect_attempts: 3,
            retry_base_delay: Duration::from_millis(3000),
            sdk_poll_interval: Duration::from_millis(500),
            sdk_poll_attempts: 20,
        }
    }
}

impl ConnectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置集合名称
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// 设置最大连接尝试次数
    pub fn with_max_connect_attempts(mut self, attempts: u32) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    /// 设置重试基础延迟
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// 设置 SDK 就绪轮询 (间隔, 次数)
    pub fn with_sdk_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.sdk_poll_interval = interval;
        self.sdk_poll_attempts = attempts;
        self
    }
}

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Pause before re-establishing a failed subscription
    pub resubscribe_delay: Duration,
    /// 最大重新订阅次数 (0 表示无限重试)
    pub max_resubscribe_attempts: u32,
    /// Snapshot buffer between the feed task and the consumer
    pub snapshot_buffer: usize,
    /// Retries of the initial subscription setup (desk level)
    pub max_setup_retries: u32,
    /// Setup retry `n` waits `n * setup_retry_step`
    pub setup_retry_step: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resubscribe_delay: Duration::from_millis(3000),
            max_resubscribe_attempts: 0,
            snapshot_buffer: 16,
            max_setup_retries: 3,
            setup_retry_step: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置重新订阅延迟
    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// 设置最大重新订阅次数 (0 表示无限重试)
    pub fn with_max_resubscribe_attempts(mut self, attempts: u32) -> Self {
        self.max_resubscribe_attempts = attempts;
        self
    }

    /// 设置启动重试 (次数, 步长)
    pub fn with_setup_retries(mut self, retries: u32, step: Duration) -> Self {
        self.max_setup_retries = retries;
        self.setup_retry_step = step;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectorConfig::default();
        assert_eq!(config.collection, "salesData");
        assert_eq!(config.max_connect_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_secs(3));
        assert_eq!(config.sdk_poll_attempts, 20);

        let sync = SyncConfig::default();
        assert_eq!(sync.resubscribe_delay, Duration::from_secs(3));
        assert_eq!(sync.max_resubscribe_attempts, 0);
    }

    #[test]
    fn test_config_builder() {
        let config = ConnectorConfig::new()
            .with_collection("trial")
            .with_max_connect_attempts(5)
            .with_retry_base_delay(Duration::from_millis(10));
        assert_eq!(config.collection, "trial");
        assert_eq!(config.max_connect_attempts, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(10));

        let sync = SyncConfig::new().with_max_resubscribe_attempts(2);
        assert_eq!(sync.max_resubscribe_attempts, 2);
    }
}
