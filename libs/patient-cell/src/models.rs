use std::ops::Deref;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use auth_cell::models::Account;
use shared_database::DatabaseError;
use shared_models::error::AppError;

pub const PATIENTS_TABLE: &str = "patients";
pub const MEDICAL_RECORDS_TABLE: &str = "medical_records";

/// Number of records embedded in a patient detail response.
pub const RECENT_RECORDS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub account_id: Uuid,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Patient profile as returned by the API, with the owning account embedded.
#[derive(Debug, Clone, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    /// `None` only if the account row has gone missing.
    pub user: Option<Account>,
}

impl Deref for PatientView {
    type Target = Patient;

    fn deref(&self) -> &Patient {
        &self.patient
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub patient: PatientView,
    pub recent_records: Vec<MedicalRecordView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MedicalRecordView {
    #[serde(flatten)]
    pub record: MedicalRecord,
    pub patient_name: String,
}

impl Deref for MedicalRecordView {
    type Target = MedicalRecord;

    fn deref(&self) -> &MedicalRecord {
        &self.record
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePatientRequest {
    /// Defaults to the caller's own account.
    pub account_id: Option<Uuid>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatientRequest {
    pub blood_type: Option<BloodType>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientListQuery {
    pub blood_type: Option<BloodType>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicalRecordRequest {
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMedicalRecordRequest {
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Medical record not found")]
    RecordNotFound,

    #[error("Account already has a patient profile")]
    AlreadyExists,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid filter: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound | PatientError::RecordNotFound => AppError::NotFound(err.to_string()),
            PatientError::AlreadyExists => AppError::Conflict(err.to_string()),
            PatientError::Unauthorized(msg) => AppError::Forbidden(msg),
            PatientError::Validation(msg) | PatientError::InvalidQuery(msg) => AppError::ValidationError(msg),
            PatientError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blood_type_uses_clinical_notation() {
        assert_eq!(serde_json::to_value(BloodType::AbNegative).unwrap(), "AB-");
        let parsed: BloodType = serde_json::from_value(serde_json::json!("O+")).unwrap();
        assert_eq!(parsed, BloodType::OPositive);
        assert!(serde_json::from_value::<BloodType>(serde_json::json!("C+")).is_err());
    }
}
