//! User-facing notifications raised by repositories and the sync engine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Display time for success notifications
pub const SUCCESS_DURATION: Duration = Duration::from_secs(3);
/// Display time for error notifications
pub const ERROR_DURATION: Duration = Duration::from_secs(5);

/// Sink for short user-facing messages
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str, duration: Duration);
}

/// Writes notifications to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(target: "prism::notify", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "prism::notify", "{message}");
    }

    fn info(&self, message: &str, duration: Duration) {
        tracing::info!(target: "prism::notify", duration_ms = duration.as_millis(), "{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
}

/// Bounded in-memory list of recent notifications.
///
/// The oldest entry is evicted once `capacity` is reached.
#[derive(Debug)]
pub struct NotificationCenter {
    entries: Mutex<VecDeque<Notification>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl NotificationCenter {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, kind: NotificationKind, message: &str, duration: Duration) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Notification {
            id,
            kind,
            message: message.to_string(),
            duration,
            created_at: Utc::now(),
        });
        id
    }

    /// Current notifications, oldest first
    pub fn list(&self) -> Vec<Notification> {
        self.entries().iter().cloned().collect()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.entries()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Remove one notification; false if it was already gone
    pub fn dismiss(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|n| n.id != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationCenter {
    fn success(&self, message: &str) {
        self.push(NotificationKind::Success, message, SUCCESS_DURATION);
    }

    fn error(&self, message: &str) {
        self.push(NotificationKind::Error, message, ERROR_DURATION);
    }

    fn info(&self, message: &str, duration: Duration) {
        self.push(NotificationKind::Info, message, duration);
    }
}
