use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use shared_database::store::fetch_by_id;
use shared_database::Database;

use crate::services::queue::NotificationQueue;
use crate::services::sender::ConfirmationSender;
use crate::{ConfirmationMessage, JobStatus, NotificationError, NotificationJob};

const APPOINTMENTS_TABLE: &str = "appointments";

/// Drains the notification queue and hands each confirmation to a sender.
pub struct NotificationWorker {
    worker_id: String,
    queue: Arc<dyn NotificationQueue>,
    db: Arc<dyn Database>,
    sender: Arc<dyn ConfirmationSender>,
    is_shutdown: RwLock<bool>,
}

impl NotificationWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<dyn NotificationQueue>,
        db: Arc<dyn Database>,
        sender: Arc<dyn ConfirmationSender>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            db,
            sender,
            is_shutdown: RwLock::new(false),
        }
    }

    /// Start `concurrency` worker loops on the runtime.
    pub fn spawn(self: &Arc<Self>, concurrency: usize) -> Vec<JoinHandle<()>> {
        info!("Starting notification worker {} with {} loops", self.worker_id, concurrency);

        (0..concurrency.max(1))
            .map(|i| {
                let worker = Arc::clone(self);
                let name = format!("{}-{}", self.worker_id, i);
                tokio::spawn(async move { worker.worker_loop(name).await })
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        info!("Stopping notification worker {}", self.worker_id);
        *self.is_shutdown.write().await = true;
    }

    async fn worker_loop(&self, worker_name: String) {
        debug!("Worker loop started: {}", worker_name);

        loop {
            if *self.is_shutdown.read().await {
                break;
            }

            match self.process_next(&worker_name).await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(Duration::from_millis(100)).await,
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Process at most one job. Returns whether a job was taken off the queue.
    pub async fn process_next(&self, worker_name: &str) -> Result<bool, NotificationError> {
        let Some(job) = self.queue.dequeue(worker_name).await? else {
            return Ok(false);
        };

        self.process_job(job).await?;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, appointment_id = %job.appointment_id))]
    async fn process_job(&self, mut job: NotificationJob) -> Result<(), NotificationError> {
        job.attempts += 1;
        job.updated_at = Utc::now();

        match self.deliver(&job).await {
            Ok(()) => {
                job.status = JobStatus::Delivered;
                job.error_message = None;
                job.completed_at = Some(Utc::now());
                self.queue.complete(&job).await?;
                info!("Confirmation delivered after {} attempt(s)", job.attempts);
            }
            Err(NotificationError::AppointmentNotFound(id)) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(format!("Appointment {} no longer exists", id));
                job.completed_at = Some(Utc::now());
                self.queue.complete(&job).await?;
                warn!("Dropping confirmation for missing appointment");
            }
            Err(e) if job.can_retry() => {
                job.status = JobStatus::Queued;
                job.error_message = Some(e.to_string());
                job.worker_id = None;
                self.queue.requeue(&job).await?;
                warn!("Delivery attempt {}/{} failed: {}", job.attempts, job.max_attempts, e);
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(e.to_string());
                job.completed_at = Some(Utc::now());
                self.queue.complete(&job).await?;
                error!("Giving up after {} attempts: {}", job.attempts, e);
            }
        }

        Ok(())
    }

    async fn deliver(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let message: ConfirmationMessage = fetch_by_id(self.db.as_ref(), APPOINTMENTS_TABLE, job.appointment_id)
            .await?
            .ok_or(NotificationError::AppointmentNotFound(job.appointment_id))?;

        self.sender.send(&message).await
    }
}
