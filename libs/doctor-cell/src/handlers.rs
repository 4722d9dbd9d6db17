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
    AvailabilityWindow, BulkAvailabilityRequest, CreateAvailabilityRequest, CreateDoctorRequest, Doctor,
    DoctorListQuery, Specialization, SpecializationRequest, UpdateDoctorRequest,
};
use crate::services::{
    availability::AvailabilityService, doctor::DoctorService, specialization::SpecializationService,
};

// ==============================================================================
// SPECIALIZATIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_specializations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Specialization>>, AppError> {
    authorize(&user, Resource::Specialization, Action::List)?;
    Ok(Json(SpecializationService::new(&state).list().await?))
}

#[axum::debug_handler]
pub async fn create_specialization(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<SpecializationRequest>,
) -> Result<(StatusCode, Json<Specialization>), AppError> {
    authorize(&user, Resource::Specialization, Action::Create)?;
    let specialization = SpecializationService::new(&state).create(request).await?;
    Ok((StatusCode::CREATED, Json(specialization)))
}

#[axum::debug_handler]
pub async fn get_specialization(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Specialization>, AppError> {
    authorize(&user, Resource::Specialization, Action::Read)?;
    Ok(Json(SpecializationService::new(&state).get(id).await?))
}

#[axum::debug_handler]
pub async fn update_specialization(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<SpecializationRequest>,
) -> Result<Json<Specialization>, AppError> {
    authorize(&user, Resource::Specialization, Action::Update)?;
    Ok(Json(SpecializationService::new(&state).update(id, request).await?))
}

#[axum::debug_handler]
pub async fn delete_specialization(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    authorize(&user, Resource::Specialization, Action::Delete)?;
    SpecializationService::new(&state).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// DOCTOR PROFILES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<DoctorListQuery>,
) -> Result<Json<Vec<Doctor>>, AppError> {
    authorize(&user, Resource::Doctor, Action::List)?;
    Ok(Json(DoctorService::new(&state).list_doctors(params).await?))
}

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Doctor>), AppError> {
    authorize(&user, Resource::Doctor, Action::Create)?;
    let doctor = DoctorService::new(&state).create_doctor(&user, request).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Doctor>, AppError> {
    authorize(&user, Resource::Doctor, Action::Read)?;
    Ok(Json(DoctorService::new(&state).get_doctor(doctor_id).await?))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Doctor>, AppError> {
    authorize(&user, Resource::Doctor, Action::Update)?;
    let doctor = DoctorService::new(&state).update_doctor(&user, doctor_id, request).await?;
    Ok(Json(doctor))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    authorize(&user, Resource::Doctor, Action::Delete)?;
    DoctorService::new(&state).delete_doctor(doctor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Vec<AvailabilityWindow>>, AppError> {
    authorize(&user, Resource::Availability, Action::List)?;
    Ok(Json(AvailabilityService::new(&state).list_availability(doctor_id).await?))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<AvailabilityWindow>), AppError> {
    authorize(&user, Resource::Availability, Action::Create)?;
    let window = AvailabilityService::new(&state)
        .create_availability(&user, doctor_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(window)))
}

#[axum::debug_handler]
pub async fn create_bulk_availability(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<BulkAvailabilityRequest>,
) -> Result<(StatusCode, Json<Vec<AvailabilityWindow>>), AppError> {
    authorize(&user, Resource::Availability, Action::Create)?;
    let windows = AvailabilityService::new(&state)
        .create_bulk_availability(&user, doctor_id, request.availabilities)
        .await?;
    Ok((StatusCode::CREATED, Json(windows)))
}
