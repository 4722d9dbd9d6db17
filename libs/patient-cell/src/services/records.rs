use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::store::{fetch_all, fetch_by_id, insert_as, update_as};
use shared_database::{Database, Query};
use shared_models::auth::User;
use shared_utils::AppState;

use crate::models::{
    MedicalRecord, MedicalRecordRequest, MedicalRecordView, PatientError, UpdateMedicalRecordRequest,
    MEDICAL_RECORDS_TABLE,
};
use crate::services::patient::PatientService;

pub struct MedicalRecordService {
    db: Arc<dyn Database>,
}

impl MedicalRecordService {
    pub fn new(state: &AppState) -> Self {
        Self { db: state.db.clone() }
    }

    pub fn from_db(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Records of a patient, newest first by date and then creation time.
    pub async fn records_for(&self, patient_id: Uuid, limit: Option<usize>) -> Result<Vec<MedicalRecord>, PatientError> {
        let mut query = Query::new()
            .eq("patient_id", patient_id.to_string())
            .order_by("date", true)
            .order_by("created_at", true);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        Ok(fetch_all(self.db.as_ref(), MEDICAL_RECORDS_TABLE, &query).await?)
    }

    /// Attaches the patient's display name to records of a single patient.
    pub async fn to_views(
        &self,
        patient_id: Uuid,
        records: Vec<MedicalRecord>,
    ) -> Result<Vec<MedicalRecordView>, PatientError> {
        let patient_name = PatientService::from_db(self.db.clone()).display_name(patient_id).await?;
        Ok(Self::named(records, &patient_name))
    }

    pub async fn to_view(&self, record: MedicalRecord) -> Result<MedicalRecordView, PatientError> {
        let patient_name = PatientService::from_db(self.db.clone()).display_name(record.patient_id).await?;
        Ok(MedicalRecordView { record, patient_name })
    }

    pub fn named(records: Vec<MedicalRecord>, patient_name: &str) -> Vec<MedicalRecordView> {
        records
            .into_iter()
            .map(|record| MedicalRecordView {
                record,
                patient_name: patient_name.to_string(),
            })
            .collect()
    }

    pub async fn list_records(&self, user: &User, patient_id: Uuid) -> Result<Vec<MedicalRecord>, PatientError> {
        let patient = PatientService::from_db(self.db.clone()).get_patient(patient_id).await?;
        PatientService::ensure_can_view(user, &patient)?;

        self.records_for(patient.id, None).await
    }

    pub async fn get_record(&self, user: &User, patient_id: Uuid, record_id: Uuid) -> Result<MedicalRecord, PatientError> {
        let patient = PatientService::from_db(self.db.clone()).get_patient(patient_id).await?;
        PatientService::ensure_can_view(user, &patient)?;

        self.find_record(patient_id, record_id).await
    }

    pub async fn create_record(
        &self,
        patient_id: Uuid,
        request: MedicalRecordRequest,
    ) -> Result<MedicalRecord, PatientError> {
        debug!("Adding medical record for patient: {}", patient_id);

        PatientService::from_db(self.db.clone()).get_patient(patient_id).await?;
        if request.diagnosis.trim().is_empty() {
            return Err(PatientError::Validation("Diagnosis is required".to_string()));
        }

        let now = Utc::now();
        let row = json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "diagnosis": request.diagnosis,
            "prescription": request.prescription,
            "notes": request.notes,
            "date": request.date.unwrap_or_else(|| now.date_naive()),
            "created_at": now,
            "updated_at": now,
        });

        let record: MedicalRecord = insert_as(self.db.as_ref(), MEDICAL_RECORDS_TABLE, row).await?;
        info!("Created medical record {} for patient {}", record.id, patient_id);
        Ok(record)
    }

    pub async fn update_record(
        &self,
        patient_id: Uuid,
        record_id: Uuid,
        request: UpdateMedicalRecordRequest,
    ) -> Result<MedicalRecord, PatientError> {
        self.find_record(patient_id, record_id).await?;

        let mut update_data = Map::new();
        if let Some(diagnosis) = request.diagnosis {
            if diagnosis.trim().is_empty() {
                return Err(PatientError::Validation("Diagnosis is required".to_string()));
            }
            update_data.insert("diagnosis".to_string(), json!(diagnosis));
        }
        if let Some(prescription) = request.prescription {
            update_data.insert("prescription".to_string(), json!(prescription));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        if let Some(date) = request.date {
            update_data.insert("date".to_string(), json!(date));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now()));

        update_as(self.db.as_ref(), MEDICAL_RECORDS_TABLE, record_id, Value::Object(update_data))
            .await?
            .ok_or(PatientError::RecordNotFound)
    }

    pub async fn delete_record(&self, patient_id: Uuid, record_id: Uuid) -> Result<(), PatientError> {
        self.find_record(patient_id, record_id).await?;
        self.db.delete(MEDICAL_RECORDS_TABLE, record_id).await?;
        info!("Deleted medical record {}", record_id);
        Ok(())
    }

    async fn find_record(&self, patient_id: Uuid, record_id: Uuid) -> Result<MedicalRecord, PatientError> {
        let record: MedicalRecord = fetch_by_id(self.db.as_ref(), MEDICAL_RECORDS_TABLE, record_id)
            .await?
            .ok_or(PatientError::RecordNotFound)?;
        if record.patient_id != patient_id {
            return Err(PatientError::RecordNotFound);
        }
        Ok(record)
    }
}
