use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::services::queue::NotificationQueue;
use crate::{NotificationError, NotificationJob, DEFAULT_MAX_ATTEMPTS};

/// Enqueue side of the dispatcher, held by the booking path.
pub struct NotificationProducer {
    queue: Arc<dyn NotificationQueue>,
    max_attempts: u32,
}

impl NotificationProducer {
    pub fn new(queue: Arc<dyn NotificationQueue>) -> Self {
        Self { queue, max_attempts: DEFAULT_MAX_ATTEMPTS }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub async fn enqueue_appointment_confirmation(&self, appointment_id: Uuid) -> Result<Uuid, NotificationError> {
        let job = NotificationJob::appointment_confirmation(appointment_id, self.max_attempts);
        self.queue.enqueue(&job).await?;

        debug!("Queued confirmation {} for appointment {}", job.job_id, appointment_id);
        Ok(job.job_id)
    }
}
