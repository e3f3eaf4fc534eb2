use log::{debug, error};
use std::sync::Arc;

use crate::error::Error;
use crate::messenger::Messenger;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::store::{Notification, NotificationQueue};

/// Drains the notification queue in FIFO order, delivering each message
/// through the messaging channel with retry and deleting it only after
/// confirmed delivery. A notification that cannot be delivered stays queued
/// for the next invocation.
pub struct NotificationExecutor {
    queue: Arc<dyn NotificationQueue>,
    messenger: Arc<dyn Messenger>,
    retry: RetryPolicy,
}

impl NotificationExecutor {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        messenger: Arc<dyn Messenger>,
        retry: RetryPolicy,
    ) -> NotificationExecutor {
        NotificationExecutor {
            queue,
            messenger,
            retry,
        }
    }

    /// One drain pass over the pending notifications, oldest first. The
    /// cursor advances past every processed notification whether or not its
    /// delivery succeeded, so one undeliverable message cannot stall the
    /// rest of the queue.
    pub async fn run(&self) -> Result<(), Error> {
        let mut cursor: Option<Notification> = None;
        loop {
            let next = self.queue.next_oldest(cursor.as_ref()).await?;
            let Some(notification) = next else { break };

            debug!(
                "Executing notification {} for {}",
                notification.id, notification.chat_id
            );
            if let Err(err) = self.deliver(&notification).await {
                error!(
                    "Failed to deliver notification {} to {}: {err}",
                    notification.id, notification.chat_id
                );
            }
            cursor = Some(notification);
        }
        Ok(())
    }

    /// Sends with retry, then deletes with retry. A deletion failure is
    /// logged but does not undo the delivery; the store may hand the
    /// notification out again on a later run (accepted at-least-once
    /// semantics).
    async fn deliver(&self, notification: &Notification) -> Result<(), Error> {
        retry_with_backoff(
            &self.retry,
            "notification send",
            Error::is_send_retryable,
            || {
                self.messenger
                    .send(&notification.chat_id, &notification.message)
            },
        )
        .await?;

        if let Err(err) = retry_with_backoff(
            &self.retry,
            "notification delete",
            Error::is_store_retryable,
            || self.queue.delete(notification),
        )
        .await
        {
            error!("Error deleting notification {}: {err}", notification.id);
        }
        Ok(())
    }
}
