use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{JobStatus, NotificationError, NotificationJob};

const PENDING_QUEUE: &str = "notification_queue:pending";
const PROCESSING_QUEUE: &str = "notification_queue:processing";

const JOB_KEY_PREFIX: &str = "notification_job:";

fn job_key(job_id: Uuid) -> String {
    format!("{}{}", JOB_KEY_PREFIX, job_id)
}

/// Durable FIFO of notification jobs shared by producers and workers.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError>;

    /// Claim the oldest pending job, marking it `processing`.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError>;

    /// Store the job's new state and put it back on the pending queue.
    async fn requeue(&self, job: &NotificationJob) -> Result<(), NotificationError>;

    /// Store a terminal state and release the job from the processing queue.
    async fn complete(&self, job: &NotificationJob) -> Result<(), NotificationError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError>;
}

pub struct RedisNotificationQueue {
    pool: Pool,
}

impl RedisNotificationQueue {
    pub async fn new(redis_url: &str) -> Result<Self, NotificationError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| NotificationError::QueueError(format!("Failed to create Redis pool: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| NotificationError::QueueError(format!("Failed to connect to Redis: {}", e)))?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification queue initialized");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, NotificationError> {
        self.pool
            .get()
            .await
            .map_err(|e| NotificationError::QueueError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn store_job(&self, conn: &mut Connection, job: &NotificationJob) -> Result<(), NotificationError> {
        let key = job_key(job.job_id);
        let fields = [
            ("data", serde_json::to_string(job)?),
            ("status", serde_json::to_string(&job.status)?),
            ("updated_at", job.updated_at.to_rfc3339()),
            ("appointment_id", job.appointment_id.to_string()),
        ];

        let _: () = conn.hset_multiple(&key, &fields).await?;
        // Job state is kept for seven days.
        let _: () = conn.expire(&key, 604800).await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;

        self.store_job(&mut conn, job).await?;
        let _: () = conn.lpush(PENDING_QUEUE, job.job_id.to_string()).await?;

        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;

        let job_id: Option<String> = conn.brpoplpush(PENDING_QUEUE, PROCESSING_QUEUE, 1.0).await?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let data: Option<String> = conn.hget(format!("{}{}", JOB_KEY_PREFIX, job_id), "data").await?;
        let Some(data) = data else {
            // Hash expired while the id sat in the queue.
            let _: () = conn.lrem(PROCESSING_QUEUE, 1, &job_id).await?;
            return Ok(None);
        };

        let mut job: NotificationJob = serde_json::from_str(&data)?;
        job.status = JobStatus::Processing;
        job.worker_id = Some(worker_id.to_string());
        job.updated_at = Utc::now();
        self.store_job(&mut conn, &job).await?;

        debug!("Job {} dequeued by worker {}", job.job_id, worker_id);
        Ok(Some(job))
    }

    async fn requeue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;

        self.store_job(&mut conn, job).await?;
        let _: () = conn.lrem(PROCESSING_QUEUE, 1, job.job_id.to_string()).await?;
        let _: () = conn.lpush(PENDING_QUEUE, job.job_id.to_string()).await?;

        Ok(())
    }

    async fn complete(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;

        self.store_job(&mut conn, job).await?;
        let _: () = conn.lrem(PROCESSING_QUEUE, 1, job.job_id.to_string()).await?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;

        let data: Option<String> = conn.hget(job_key(job_id), "data").await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

/// Finished jobs kept for inspection by the in-memory queue.
pub const FINISHED_JOB_RETENTION: usize = 1024;

/// Process-local queue used when Redis is not configured. Finished jobs are
/// evicted oldest first once more than `retention` have accumulated.
pub struct InMemoryNotificationQueue {
    pending: Mutex<VecDeque<Uuid>>,
    jobs: Mutex<HashMap<Uuid, NotificationJob>>,
    finished: Mutex<VecDeque<Uuid>>,
    retention: usize,
}

impl Default for InMemoryNotificationQueue {
    fn default() -> Self {
        Self::with_retention(FINISHED_JOB_RETENTION)
    }
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            finished: Mutex::new(VecDeque::new()),
            retention,
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        self.jobs.lock().await.insert(job.job_id, job.clone());
        self.pending.lock().await.push_front(job.job_id);
        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let Some(job_id) = self.pending.lock().await.pop_back() else {
            return Ok(None);
        };

        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(NotificationError::JobNotFound(job_id))?;
        job.status = JobStatus::Processing;
        job.worker_id = Some(worker_id.to_string());
        job.updated_at = Utc::now();

        Ok(Some(job.clone()))
    }

    async fn requeue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        self.jobs.lock().await.insert(job.job_id, job.clone());
        self.pending.lock().await.push_front(job.job_id);
        Ok(())
    }

    async fn complete(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut jobs = self.jobs.lock().await;
        let mut finished = self.finished.lock().await;

        if jobs.insert(job.job_id, job.clone()).map_or(true, |previous| !previous.status.is_terminal()) {
            finished.push_back(job.job_id);
        }
        while finished.len() > self.retention {
            if let Some(expired) = finished.pop_front() {
                jobs.remove(&expired);
                debug!("Evicted finished job {}", expired);
            }
        }

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }
}
