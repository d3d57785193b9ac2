//! Notification Dispatcher
//!
//! Decouples the lifecycle from the notification sink. Events go onto a
//! bounded channel drained by a background task; a full channel drops the
//! event with a warning, and sink failures are only logged.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::NotificationPort;
use crate::domain::trade_plan::LifecycleEvent;

/// Handle for queueing lifecycle events.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl NotificationDispatcher {
    /// Start the delivery task. It drains queued events after `shutdown`
    /// fires, then exits.
    pub fn spawn<N>(
        notifier: Arc<N>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        N: NotificationPort + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<LifecycleEvent>(capacity.max(1));

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => match event {
                        Some(event) => deliver(notifier.as_ref(), &event).await,
                        None => break,
                    },
                    () = shutdown.cancelled() => {
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            deliver(notifier.as_ref(), &event).await;
                        }
                        break;
                    }
                }
            }
            tracing::debug!("Notification dispatcher stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue an event. Never blocks.
    pub fn dispatch(&self, event: LifecycleEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    plan_id = %event.plan_id,
                    event_type = event.event_type(),
                    "Notification queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(
                    plan_id = %event.plan_id,
                    event_type = event.event_type(),
                    "Notification dispatcher closed, dropping event"
                );
            }
        }
    }
}

async fn deliver<N: NotificationPort + ?Sized>(notifier: &N, event: &LifecycleEvent) {
    if let Err(e) = notifier.notify(event).await {
        tracing::error!(
            plan_id = %event.plan_id,
            event_type = event.event_type(),
            error = %e,
            "Failed to deliver notification"
        );
    }
}
