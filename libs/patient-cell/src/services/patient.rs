use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use auth_cell::models::{Account, ACCOUNTS_TABLE};
use auth_cell::services::account::AccountService;
use shared_database::store::{fetch_all, fetch_by_id, fetch_one, insert_as, update_as};
use shared_database::{Condition, Database, Query};
use shared_models::auth::{Role, User};
use shared_utils::AppState;

use crate::models::{
    CreatePatientRequest, MedicalRecord, Patient, PatientDetail, PatientError, PatientListQuery, PatientView,
    UpdatePatientRequest, MEDICAL_RECORDS_TABLE, PATIENTS_TABLE, RECENT_RECORDS_LIMIT,
};
use crate::services::records::MedicalRecordService;

pub struct PatientService {
    db: Arc<dyn Database>,
}

impl PatientService {
    pub fn new(state: &AppState) -> Self {
        Self { db: state.db.clone() }
    }

    pub fn from_db(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn list_patients(&self, params: PatientListQuery) -> Result<Vec<Patient>, PatientError> {
        let mut query = Query::new();

        if let Some(blood_type) = params.blood_type {
            query = query.eq("blood_type", blood_type.as_str());
        }
        if let Some(term) = params.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let account_ids = AccountService::find_ids_by_name(self.db.as_ref(), term).await?;
            query = query.or(vec![
                Condition::ilike("insurance_policy_number", term),
                Condition::in_list("account_id", account_ids.iter().map(Uuid::to_string)),
            ]);
        }

        let query = query
            .ordering(params.ordering.as_deref(), &["created_at"])
            .map_err(PatientError::InvalidQuery)?
            .paginate(params.limit, params.offset);

        Ok(fetch_all(self.db.as_ref(), PATIENTS_TABLE, &query).await?)
    }

    pub async fn get_patient(&self, id: Uuid) -> Result<Patient, PatientError> {
        fetch_by_id(self.db.as_ref(), PATIENTS_TABLE, id)
            .await?
            .ok_or(PatientError::NotFound)
    }

    /// Patient profile plus the most recent medical records, for callers allowed to see it.
    pub async fn get_patient_detail(&self, user: &User, id: Uuid) -> Result<PatientDetail, PatientError> {
        let patient = self.get_patient(id).await?;
        Self::ensure_can_view(user, &patient)?;

        let records = MedicalRecordService::from_db(self.db.clone())
            .records_for(patient.id, Some(RECENT_RECORDS_LIMIT))
            .await?;

        let patient = self.to_view(patient).await?;
        let patient_name = patient.user.as_ref().map(Account::full_name).unwrap_or_default();
        let recent_records = MedicalRecordService::named(records, &patient_name);

        Ok(PatientDetail { patient, recent_records })
    }

    pub async fn to_view(&self, patient: Patient) -> Result<PatientView, PatientError> {
        let user = fetch_by_id(self.db.as_ref(), ACCOUNTS_TABLE, patient.account_id).await?;
        Ok(PatientView { patient, user })
    }

    /// Embeds owning accounts with a single lookup for the whole page.
    pub async fn to_views(&self, patients: Vec<Patient>) -> Result<Vec<PatientView>, PatientError> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }

        let query = Query::new().in_list("id", patients.iter().map(|p| p.account_id.to_string()));
        let accounts: Vec<Account> = fetch_all(self.db.as_ref(), ACCOUNTS_TABLE, &query).await?;
        let mut by_id: HashMap<Uuid, Account> = accounts.into_iter().map(|a| (a.id, a)).collect();

        Ok(patients
            .into_iter()
            .map(|patient| {
                let user = by_id.remove(&patient.account_id);
                PatientView { patient, user }
            })
            .collect())
    }

    /// Full name of the patient's account holder, empty when unknown.
    pub async fn display_name(&self, patient_id: Uuid) -> Result<String, PatientError> {
        let patient = self.get_patient(patient_id).await?;
        let account: Option<Account> = fetch_by_id(self.db.as_ref(), ACCOUNTS_TABLE, patient.account_id).await?;
        Ok(account.as_ref().map(Account::full_name).unwrap_or_default())
    }

    pub async fn find_by_account(&self, account_id: Uuid) -> Result<Option<Patient>, PatientError> {
        let query = Query::new().eq("account_id", account_id.to_string());
        Ok(fetch_one(self.db.as_ref(), PATIENTS_TABLE, &query).await?)
    }

    pub async fn create_patient(&self, user: &User, request: CreatePatientRequest) -> Result<Patient, PatientError> {
        let account_id = request.account_id.unwrap_or(user.id);
        debug!("Creating patient profile for account: {}", account_id);

        if !user.is_staff() && account_id != user.id {
            return Err(PatientError::Unauthorized(
                "Patients may only create their own profile".to_string(),
            ));
        }

        let account: Account = fetch_by_id(self.db.as_ref(), ACCOUNTS_TABLE, account_id)
            .await?
            .ok_or_else(|| PatientError::Validation("Account does not exist".to_string()))?;
        if account.role != Role::Patient {
            return Err(PatientError::Validation("Account is not a patient account".to_string()));
        }
        if self.find_by_account(account_id).await?.is_some() {
            return Err(PatientError::AlreadyExists);
        }

        let now = Utc::now();
        let row = json!({
            "id": Uuid::new_v4(),
            "account_id": account_id,
            "blood_type": request.blood_type,
            "allergies": request.allergies,
            "chronic_conditions": request.chronic_conditions,
            "emergency_contact_name": request.emergency_contact_name,
            "emergency_contact_phone": request.emergency_contact_phone,
            "insurance_provider": request.insurance_provider,
            "insurance_policy_number": request.insurance_policy_number,
            "created_at": now,
            "updated_at": now,
        });

        let patient: Patient = insert_as(self.db.as_ref(), PATIENTS_TABLE, row).await?;
        info!("Created patient profile {} for account {}", patient.id, account_id);
        Ok(patient)
    }

    pub async fn update_patient(
        &self,
        user: &User,
        id: Uuid,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient profile: {}", id);

        let patient = self.get_patient(id).await?;
        Self::ensure_can_view(user, &patient)?;

        let mut update_data = Map::new();

        if let Some(blood_type) = request.blood_type {
            update_data.insert("blood_type".to_string(), json!(blood_type));
        }
        if let Some(allergies) = request.allergies {
            update_data.insert("allergies".to_string(), json!(allergies));
        }
        if let Some(conditions) = request.chronic_conditions {
            update_data.insert("chronic_conditions".to_string(), json!(conditions));
        }
        if let Some(name) = request.emergency_contact_name {
            update_data.insert("emergency_contact_name".to_string(), json!(name));
        }
        if let Some(phone) = request.emergency_contact_phone {
            update_data.insert("emergency_contact_phone".to_string(), json!(phone));
        }
        if let Some(provider) = request.insurance_provider {
            update_data.insert("insurance_provider".to_string(), json!(provider));
        }
        if let Some(policy) = request.insurance_policy_number {
            update_data.insert("insurance_policy_number".to_string(), json!(policy));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now()));

        update_as(self.db.as_ref(), PATIENTS_TABLE, id, Value::Object(update_data))
            .await?
            .ok_or(PatientError::NotFound)
    }

    pub async fn delete_patient(&self, id: Uuid) -> Result<(), PatientError> {
        let patient = self.get_patient(id).await?;

        let records: Vec<MedicalRecord> = fetch_all(
            self.db.as_ref(),
            MEDICAL_RECORDS_TABLE,
            &Query::new().eq("patient_id", patient.id.to_string()),
        )
        .await?;
        for record in records {
            self.db.delete(MEDICAL_RECORDS_TABLE, record.id).await?;
        }

        self.db.delete(PATIENTS_TABLE, patient.id).await?;
        info!("Deleted patient profile {}", patient.id);
        Ok(())
    }

    /// A patient sees only their own profile; doctors and admins see all.
    pub fn ensure_can_view(user: &User, patient: &Patient) -> Result<(), PatientError> {
        if user.role == Role::Patient && patient.account_id != user.id {
            return Err(PatientError::Unauthorized(
                "Patients may only access their own profile".to_string(),
            ));
        }
        Ok(())
    }
}
