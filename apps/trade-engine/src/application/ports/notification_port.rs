//! Notification Port (Driven Port)
//!
//! Receives lifecycle events. Nothing in the core depends on delivery.

use async_trait::async_trait;

use crate::domain::trade_plan::LifecycleEvent;

/// Notification delivery error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    /// The sink refused or could not deliver the event.
    #[error("notification delivery failed: {message}")]
    DeliveryFailed {
        /// Detail.
        message: String,
    },
}

/// Port for reporting lifecycle events.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event: &LifecycleEvent) -> Result<(), NotificationError>;
}

/// No-op notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl NotificationPort for NoOpNotifier {
    async fn notify(&self, _event: &LifecycleEvent) -> Result<(), NotificationError> {
        Ok(())
    }
}
