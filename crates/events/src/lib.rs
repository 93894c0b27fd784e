//! Outbound notifications (completion/failure signals).
//!
//! Notifications are fire-and-forget: core correctness never depends on
//! delivery or on subscriber behaviour.

pub mod in_memory_bus;
pub mod notification;
pub mod sink;

pub use in_memory_bus::InMemoryNotificationBus;
pub use notification::{Notification, NotificationKind};
pub use sink::{NoopNotificationSink, NotificationSink, Subscription};
