use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::{
    ConfirmationMessage, ConfirmationSender, InMemoryNotificationQueue, JobStatus, NotificationError,
    NotificationProducer, NotificationQueue, NotificationWorker, WebhookSender,
};
use shared_database::{Database, MemoryDatabase};

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<ConfirmationMessage>>,
}

#[async_trait]
impl ConfirmationSender for RecordingSender {
    async fn send(&self, message: &ConfirmationMessage) -> Result<(), NotificationError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

struct FailingSender;

#[async_trait]
impl ConfirmationSender for FailingSender {
    async fn send(&self, _message: &ConfirmationMessage) -> Result<(), NotificationError> {
        Err(NotificationError::DeliveryError("mail relay unreachable".to_string()))
    }
}

async fn seed_appointment(db: &MemoryDatabase) -> Uuid {
    let id = Uuid::new_v4();
    db.insert(
        "appointments",
        json!({
            "id": id.to_string(),
            "doctor_id": Uuid::new_v4().to_string(),
            "patient_id": Uuid::new_v4().to_string(),
            "appointment_date": "2030-06-03",
            "start_time": "09:00:00",
            "end_time": "09:30:00",
            "status": "scheduled",
            "reason": "Checkup",
            "notes": null,
            "created_at": "2030-05-01T10:00:00Z",
            "updated_at": "2030-05-01T10:00:00Z"
        }),
    )
    .await
    .unwrap();
    id
}

struct Harness {
    queue: Arc<InMemoryNotificationQueue>,
    db: Arc<MemoryDatabase>,
}

impl Harness {
    fn new() -> Self {
        Self {
            queue: Arc::new(InMemoryNotificationQueue::new()),
            db: Arc::new(MemoryDatabase::new()),
        }
    }

    fn producer(&self) -> NotificationProducer {
        NotificationProducer::new(self.queue.clone())
    }

    fn worker(&self, sender: Arc<dyn ConfirmationSender>) -> NotificationWorker {
        NotificationWorker::new("test-worker", self.queue.clone(), self.db.clone(), sender)
    }
}

#[tokio::test]
async fn delivers_confirmation_for_stored_appointment() {
    let harness = Harness::new();
    let appointment_id = seed_appointment(&harness.db).await;
    let job_id = harness.producer().enqueue_appointment_confirmation(appointment_id).await.unwrap();

    let sender = Arc::new(RecordingSender::default());
    let worker = harness.worker(sender.clone());

    assert!(worker.process_next("test-worker-0").await.unwrap());

    let sent = sender.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].appointment_id, appointment_id);
    assert_eq!(sent[0].start_time.to_string(), "09:00:00");

    let job = harness.queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Delivered);
    assert_eq!(job.attempts, 1);
    assert!(job.completed_at.is_some());
    assert_eq!(harness.queue.pending_len().await, 0);
}

#[tokio::test]
async fn empty_queue_reports_no_work() {
    let harness = Harness::new();
    let worker = harness.worker(Arc::new(RecordingSender::default()));

    assert!(!worker.process_next("test-worker-0").await.unwrap());
}

#[tokio::test]
async fn failed_delivery_is_retried_then_marked_failed() {
    let harness = Harness::new();
    let appointment_id = seed_appointment(&harness.db).await;
    let job_id = harness.producer().enqueue_appointment_confirmation(appointment_id).await.unwrap();
    let worker = harness.worker(Arc::new(FailingSender));

    assert!(worker.process_next("w").await.unwrap());
    let job = harness.queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 1);
    assert!(job.error_message.as_deref().unwrap_or_default().contains("mail relay unreachable"));
    assert_eq!(harness.queue.pending_len().await, 1);

    assert!(worker.process_next("w").await.unwrap());
    assert!(worker.process_next("w").await.unwrap());

    let job = harness.queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(harness.queue.pending_len().await, 0);
    assert!(!worker.process_next("w").await.unwrap());
}

#[tokio::test]
async fn missing_appointment_fails_without_retry() {
    let harness = Harness::new();
    let job_id = harness.producer().enqueue_appointment_confirmation(Uuid::new_v4()).await.unwrap();
    let sender = Arc::new(RecordingSender::default());
    let worker = harness.worker(sender.clone());

    assert!(worker.process_next("w").await.unwrap());

    let job = harness.queue.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(harness.queue.pending_len().await, 0);
    assert!(sender.sent.lock().await.is_empty());
}

#[tokio::test]
async fn spawned_workers_drain_queue_and_stop_on_shutdown() {
    let harness = Harness::new();
    let producer = harness.producer();
    let mut job_ids = Vec::new();
    for _ in 0..3 {
        let appointment_id = seed_appointment(&harness.db).await;
        job_ids.push(producer.enqueue_appointment_confirmation(appointment_id).await.unwrap());
    }

    let sender = Arc::new(RecordingSender::default());
    let worker = Arc::new(harness.worker(sender.clone()));
    let handles = worker.spawn(2);

    for _ in 0..50 {
        if sender.sent.lock().await.len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    worker.shutdown().await;
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(sender.sent.lock().await.len(), 3);
    for job_id in job_ids {
        let job = harness.queue.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Delivered);
    }
}

fn sample_message() -> ConfirmationMessage {
    serde_json::from_value(json!({
        "id": Uuid::new_v4().to_string(),
        "doctor_id": Uuid::new_v4().to_string(),
        "patient_id": Uuid::new_v4().to_string(),
        "appointment_date": "2030-06-03",
        "start_time": "14:00:00",
        "end_time": "14:45:00",
        "status": "scheduled",
        "reason": null
    }))
    .unwrap()
}

#[tokio::test]
async fn webhook_sender_posts_confirmation() {
    let server = MockServer::start().await;
    let message = sample_message();

    Mock::given(method("POST"))
        .and(path("/hooks/confirmations"))
        .and(body_partial_json(json!({
            "appointment_id": message.appointment_id.to_string(),
            "start_time": "14:00:00"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let sender = WebhookSender::new(format!("{}/hooks/confirmations", server.uri()));
    sender.send(&message).await.unwrap();
}

#[tokio::test]
async fn webhook_sender_reports_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&server)
        .await;

    let sender = WebhookSender::new(server.uri());
    let err = sender.send(&sample_message()).await.unwrap_err();

    assert_matches!(err, NotificationError::DeliveryError(msg) if msg.contains("503"));
}
