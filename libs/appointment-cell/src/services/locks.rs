use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Serializes check-then-write per doctor within this process. Entries are
/// never removed, so the map holds at most one lock per doctor.
#[derive(Default)]
pub struct SlotLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, doctor_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(doctor_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}
