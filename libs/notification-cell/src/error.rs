use thiserror::Error;
use uuid::Uuid;

use shared_database::DatabaseError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Appointment {0} no longer exists")]
    AppointmentNotFound(Uuid),

    #[error("Delivery failed: {0}")]
    DeliveryError(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
