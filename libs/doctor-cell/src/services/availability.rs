use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::store::fetch_all;
use shared_database::{Database, Query};
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{AvailabilityWindow, CreateAvailabilityRequest, DayOfWeek, AVAILABILITY_TABLE};
use crate::services::doctor::DoctorService;

pub struct AvailabilityService {
    db: Arc<dyn Database>,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self { db: state.db.clone() }
    }

    pub fn from_db(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// All windows of a doctor in weekday order.
    pub async fn list_availability(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityWindow>, AppError> {
        DoctorService::from_db(self.db.clone()).get_doctor(doctor_id).await?;

        let query = Query::new()
            .eq("doctor_id", doctor_id.to_string())
            .order_by("start_time", false);
        let mut windows: Vec<AvailabilityWindow> = fetch_all(self.db.as_ref(), AVAILABILITY_TABLE, &query).await?;
        windows.sort_by_key(|w| (w.day, w.start_time));
        Ok(windows)
    }

    /// Windows of a doctor on one weekday, including those marked unavailable.
    pub async fn windows_for_day(&self, doctor_id: Uuid, day: DayOfWeek) -> Result<Vec<AvailabilityWindow>, AppError> {
        let query = Query::new()
            .eq("doctor_id", doctor_id.to_string())
            .eq("day", day.as_str());
        Ok(fetch_all(self.db.as_ref(), AVAILABILITY_TABLE, &query).await?)
    }

    pub async fn create_availability(
        &self,
        user: &User,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilityWindow, AppError> {
        debug!("Creating availability for doctor: {}", doctor_id);

        let doctor = DoctorService::from_db(self.db.clone()).get_doctor(doctor_id).await?;
        DoctorService::ensure_can_manage(user, &doctor)?;
        request.validate()?;

        let row = Self::window_row(doctor_id, &request);
        let stored = self.db.insert(AVAILABILITY_TABLE, row).await?;
        let window: AvailabilityWindow = serde_json::from_value(stored)
            .map_err(|e| AppError::Database(format!("Invalid availability row: {}", e)))?;

        info!("Added {} window {}-{} for doctor {}", window.day, window.start_time, window.end_time, doctor_id);
        Ok(window)
    }

    /// Every window is validated before anything is written; the rows are
    /// then stored in a single insert so either all land or none do.
    pub async fn create_bulk_availability(
        &self,
        user: &User,
        doctor_id: Uuid,
        requests: Vec<CreateAvailabilityRequest>,
    ) -> Result<Vec<AvailabilityWindow>, AppError> {
        debug!("Creating {} availability windows for doctor: {}", requests.len(), doctor_id);

        let doctor = DoctorService::from_db(self.db.clone()).get_doctor(doctor_id).await?;
        DoctorService::ensure_can_manage(user, &doctor)?;

        if requests.is_empty() {
            return Err(AppError::ValidationError("At least one availability window is required".to_string()));
        }
        for (index, request) in requests.iter().enumerate() {
            request.validate().map_err(|e| match e {
                AppError::ValidationError(msg) => AppError::ValidationError(format!("availabilities[{}]: {}", index, msg)),
                other => other,
            })?;
        }

        let rows: Vec<Value> = requests.iter().map(|r| Self::window_row(doctor_id, r)).collect();
        let stored = self.db.insert_many(AVAILABILITY_TABLE, rows).await?;

        let windows = stored
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| AppError::Database(format!("Invalid availability row: {}", e)))?;

        info!("Added {} availability windows for doctor {}", windows.len(), doctor_id);
        Ok(windows)
    }

    fn window_row(doctor_id: Uuid, request: &CreateAvailabilityRequest) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "day": request.day,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_available": request.is_available.unwrap_or(true),
            "created_at": Utc::now(),
        })
    }
}
