//! Notification port.
//!
//! Publishing is fire-and-forget: `notify` returns nothing, and implementations
//! must swallow (and log) their own delivery failures.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::notification::Notification;

/// A subscription to published notifications (broadcast semantics).
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<Notification>,
}

impl Subscription {
    pub fn new(receiver: Receiver<Notification>) -> Self {
        Self { receiver }
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Result<Notification, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a notification.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Notification, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<Notification> {
        self.receiver.try_iter().collect()
    }
}

/// Outbound notification port.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn notify(&self, notification: Notification) {
        tracing::trace!(topic = notification.topic(), "notification dropped (noop sink)");
    }
}
