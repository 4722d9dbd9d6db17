use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{ConfirmationMessage, NotificationError};

#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send(&self, message: &ConfirmationMessage) -> Result<(), NotificationError>;
}

/// Emits the confirmation as a structured log event.
pub struct LogSender;

#[async_trait]
impl ConfirmationSender for LogSender {
    async fn send(&self, message: &ConfirmationMessage) -> Result<(), NotificationError> {
        info!(
            appointment_id = %message.appointment_id,
            doctor_id = %message.doctor_id,
            patient_id = %message.patient_id,
            date = %message.appointment_date,
            start = %message.start_time,
            end = %message.end_time,
            "Appointment confirmation"
        );
        Ok(())
    }
}

/// POSTs the confirmation as JSON to a configured endpoint.
pub struct WebhookSender {
    client: Client,
    url: String,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ConfirmationSender for WebhookSender {
    async fn send(&self, message: &ConfirmationMessage) -> Result<(), NotificationError> {
        debug!("Posting confirmation for {} to {}", message.appointment_id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotificationError::DeliveryError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::DeliveryError(format!("Webhook returned {}: {}", status, body)));
        }

        Ok(())
    }
}
