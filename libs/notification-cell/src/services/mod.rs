pub mod producer;
pub mod queue;
pub mod sender;
pub mod worker;

pub use producer::NotificationProducer;
pub use queue::{InMemoryNotificationQueue, NotificationQueue, RedisNotificationQueue};
pub use sender::{ConfirmationSender, LogSender, WebhookSender};
pub use worker::NotificationWorker;

use std::sync::Arc;

use shared_config::AppConfig;
use tracing::{info, warn};

use crate::NotificationError;

/// Redis when `REDIS_URL` is set, otherwise an in-process queue.
pub async fn queue_from_config(config: &AppConfig) -> Result<Arc<dyn NotificationQueue>, NotificationError> {
    match config.redis_url.as_deref() {
        Some(url) => Ok(Arc::new(RedisNotificationQueue::new(url).await?)),
        None => {
            warn!("REDIS_URL not set; confirmations are queued in memory and lost on restart");
            Ok(Arc::new(InMemoryNotificationQueue::new()))
        }
    }
}

pub fn sender_from_config(config: &AppConfig) -> Arc<dyn ConfirmationSender> {
    match config.notification_webhook_url.as_deref() {
        Some(url) => {
            info!("Delivering confirmations to webhook {}", url);
            Arc::new(WebhookSender::new(url))
        }
        None => Arc::new(LogSender),
    }
}
