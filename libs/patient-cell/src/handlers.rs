use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::policy::{authorize, Action, Resource};
use shared_utils::AppState;

use crate::models::{
    CreatePatientRequest, MedicalRecordRequest, MedicalRecordView, PatientDetail, PatientListQuery, PatientView,
    UpdateMedicalRecordRequest, UpdatePatientRequest,
};
use crate::services::{patient::PatientService, records::MedicalRecordService};

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<PatientListQuery>,
) -> Result<Json<Vec<PatientView>>, AppError> {
    authorize(&user, Resource::Patient, Action::List)?;
    let service = PatientService::new(&state);
    let patients = service.list_patients(params).await?;
    Ok(Json(service.to_views(patients).await?))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<PatientView>), AppError> {
    authorize(&user, Resource::Patient, Action::Create)?;
    let service = PatientService::new(&state);
    let patient = service.create_patient(&user, request).await?;
    Ok((StatusCode::CREATED, Json(service.to_view(patient).await?)))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<PatientDetail>, AppError> {
    authorize(&user, Resource::Patient, Action::Read)?;
    Ok(Json(PatientService::new(&state).get_patient_detail(&user, id).await?))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<PatientView>, AppError> {
    authorize(&user, Resource::Patient, Action::Update)?;
    let service = PatientService::new(&state);
    let patient = service.update_patient(&user, id, request).await?;
    Ok(Json(service.to_view(patient).await?))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    authorize(&user, Resource::Patient, Action::Delete)?;
    PatientService::new(&state).delete_patient(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn list_records(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Vec<MedicalRecordView>>, AppError> {
    authorize(&user, Resource::MedicalRecord, Action::List)?;
    let service = MedicalRecordService::new(&state);
    let records = service.list_records(&user, patient_id).await?;
    Ok(Json(service.to_views(patient_id, records).await?))
}

#[axum::debug_handler]
pub async fn create_record(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<MedicalRecordRequest>,
) -> Result<(StatusCode, Json<MedicalRecordView>), AppError> {
    authorize(&user, Resource::MedicalRecord, Action::Create)?;
    let service = MedicalRecordService::new(&state);
    let record = service.create_record(patient_id, request).await?;
    Ok((StatusCode::CREATED, Json(service.to_view(record).await?)))
}

#[axum::debug_handler]
pub async fn get_record(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((patient_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<MedicalRecordView>, AppError> {
    authorize(&user, Resource::MedicalRecord, Action::Read)?;
    let service = MedicalRecordService::new(&state);
    let record = service.get_record(&user, patient_id, record_id).await?;
    Ok(Json(service.to_view(record).await?))
}

#[axum::debug_handler]
pub async fn update_record(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((patient_id, record_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateMedicalRecordRequest>,
) -> Result<Json<MedicalRecordView>, AppError> {
    authorize(&user, Resource::MedicalRecord, Action::Update)?;
    let service = MedicalRecordService::new(&state);
    let record = service.update_record(patient_id, record_id, request).await?;
    Ok(Json(service.to_view(record).await?))
}

#[axum::debug_handler]
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((patient_id, record_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    authorize(&user, Resource::MedicalRecord, Action::Delete)?;
    MedicalRecordService::new(&state).delete_record(patient_id, record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
