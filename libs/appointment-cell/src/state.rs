use std::sync::Arc;

use notification_cell::NotificationProducer;
use shared_utils::AppState;

use crate::services::locks::SlotLocks;

/// Router state for appointment endpoints: the shared app state plus the
/// confirmation producer and the per-doctor booking locks.
#[derive(Clone)]
pub struct AppointmentState {
    pub app: AppState,
    pub producer: Arc<NotificationProducer>,
    pub locks: Arc<SlotLocks>,
}

impl AppointmentState {
    pub fn new(app: AppState, producer: Arc<NotificationProducer>) -> Self {
        Self {
            app,
            producer,
            locks: Arc::new(SlotLocks::new()),
        }
    }
}
