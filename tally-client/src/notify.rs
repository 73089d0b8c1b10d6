//! Toast notifications
//!
//! Every component that needs to tell the user something publishes on a
//! shared [`Notifier`]; the front end subscribes and shows the latest one in
//! a [`Toast`] for [`TOAST_TTL`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// How long a toast stays visible
pub const TOAST_TTL: Duration = Duration::from_secs(3);

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    /// Unix millis
    pub issued_at: i64,
}

/// Notification publisher, cheap to clone
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Log and publish a notification
    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Error => tracing::error!(severity = %severity, "[通知] {}", message),
            Severity::Warning => tracing::warn!(severity = %severity, "[通知] {}", message),
            Severity::Success | Severity::Info => {
                tracing::info!(severity = %severity, "[通知] {}", message)
            }
        }

        let notification = Notification {
            severity,
            message,
            issued_at: shared::util::now_millis(),
        };
        if self.tx.send(notification).is_err() {
            tracing::trace!("No notification subscribers");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Severity::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Severity::Error, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(Severity::Warning, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(Severity::Info, message);
    }
}

/// The single visible toast; a newer notification replaces the current one
#[derive(Debug, Clone)]
pub struct Toast {
    current: Option<(Notification, Instant)>,
    ttl: Duration,
}

impl Default for Toast {
    fn default() -> Self {
        Self::new(TOAST_TTL)
    }
}

impl Toast {
    pub fn new(ttl: Duration) -> Self {
        Self { current: None, ttl }
    }

    pub fn show(&mut self, notification: Notification, now: Instant) {
        self.current = Some((notification, now));
    }

    /// The toast still on screen at `now`, if any
    pub fn visible(&self, now: Instant) -> Option<&Notification> {
        self.current
            .as_ref()
            .filter(|(_, shown_at)| now.saturating_duration_since(*shown_at) < self.ttl)
            .map(|(notification, _)| notification)
    }
}
