//! In-memory notification bus for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::notification::Notification;
use crate::sink::{NotificationSink, Subscription};

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Best-effort fan-out; dead subscribers are dropped on publish
/// - Keeps a bounded history for inspection
#[derive(Debug)]
pub struct InMemoryNotificationBus {
    subscribers: Mutex<Vec<mpsc::Sender<Notification>>>,
    history: Mutex<Vec<Notification>>,
    history_limit: usize,
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }

    /// Notifications published so far (oldest first, bounded).
    pub fn history(&self) -> Vec<Notification> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            history_limit: 1_000,
        }
    }
}

impl NotificationSink for InMemoryNotificationBus {
    fn notify(&self, notification: Notification) {
        if let Ok(mut history) = self.history.lock() {
            history.push(notification.clone());
            let overflow = history.len().saturating_sub(self.history_limit);
            if overflow > 0 {
                history.drain(..overflow);
            }
        }

        match self.subscribers.lock() {
            Ok(mut subs) => subs.retain(|tx| tx.send(notification.clone()).is_ok()),
            Err(_) => tracing::warn!(topic = notification.topic(), "notification bus lock poisoned"),
        }
    }
}
