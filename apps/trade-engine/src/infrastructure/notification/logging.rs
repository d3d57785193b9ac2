//! Notifier that writes lifecycle events to the log.
//!
//! Used in paper mode and whenever no external alerting sink is configured.
//! Failures and rejections log at `warn`, everything else at `info`.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{NotificationError, NotificationPort};
use crate::domain::trade_plan::{LifecycleEvent, LifecycleEventKind, TradePlanStatus};

/// Logs every lifecycle event with structured fields.
#[derive(Debug, Default)]
pub struct LoggingNotifier {
    delivered: Mutex<u64>,
}

impl LoggingNotifier {
    /// Create a notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        *self.delivered.lock()
    }

    fn is_warning(kind: &LifecycleEventKind) -> bool {
        match kind {
            LifecycleEventKind::StatusChanged { to, .. } => *to == TradePlanStatus::Error,
            LifecycleEventKind::ReservationRejected { .. }
            | LifecycleEventKind::EntrySkipped { .. }
            | LifecycleEventKind::ProtectiveOrdersFailed { .. } => true,
            LifecycleEventKind::EntryFilled { .. } | LifecycleEventKind::ExitFilled { .. } => false,
        }
    }
}

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn notify(&self, event: &LifecycleEvent) -> Result<(), NotificationError> {
        let message = event.message();
        if Self::is_warning(&event.kind) {
            tracing::warn!(
                plan_id = %event.plan_id,
                symbol = %event.symbol,
                event = event.event_type(),
                "{message}"
            );
        } else {
            tracing::info!(
                plan_id = %event.plan_id,
                symbol = %event.symbol,
                event = event.event_type(),
                "{message}"
            );
        }
        *self.delivered.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::{PlanId, Symbol};

    #[tokio::test]
    async fn counts_delivered_events() {
        let notifier = LoggingNotifier::new();
        let event = LifecycleEvent::new(
            PlanId::new("AAPL_BREAKOUT"),
            Symbol::new("AAPL"),
            LifecycleEventKind::EntrySkipped {
                reason: "position size rounds to zero shares".to_string(),
            },
        );

        notifier.notify(&event).await.unwrap();
        notifier.notify(&event).await.unwrap();
        assert_eq!(notifier.delivered(), 2);
    }

    #[test]
    fn error_transitions_are_warnings() {
        assert!(LoggingNotifier::is_warning(&LifecycleEventKind::StatusChanged {
            from: TradePlanStatus::AwaitingEntry,
            to: TradePlanStatus::Error,
            reason: "entry fill timed out".to_string(),
        }));
        assert!(!LoggingNotifier::is_warning(&LifecycleEventKind::StatusChanged {
            from: TradePlanStatus::AwaitingEntry,
            to: TradePlanStatus::PositionOpen,
            reason: "entry filled".to_string(),
        }));
    }
}
