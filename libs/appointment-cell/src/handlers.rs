use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::policy::{authorize, Action, Resource};

use crate::models::{
    AppointmentListQuery, AppointmentView, CreateAppointmentRequest, StatusUpdateRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentService;
use crate::state::AppointmentState;

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(params): Query<AppointmentListQuery>,
) -> Result<Json<Vec<AppointmentView>>, AppError> {
    authorize(&user, Resource::Appointment, Action::List)?;
    let service = AppointmentService::new(&state);
    let appointments = service.list_appointments(&user, params).await?;
    Ok(Json(service.to_views(appointments).await?))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentView>), AppError> {
    authorize(&user, Resource::Appointment, Action::Create)?;
    let service = AppointmentService::new(&state);
    let appointment = service.create_appointment(&user, request).await?;
    Ok((StatusCode::CREATED, Json(service.to_view(appointment).await?)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<AppointmentView>, AppError> {
    authorize(&user, Resource::Appointment, Action::Read)?;
    let service = AppointmentService::new(&state);
    let appointment = service.get_appointment(&user, id).await?;
    Ok(Json(service.to_view(appointment).await?))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentView>, AppError> {
    authorize(&user, Resource::Appointment, Action::Update)?;
    let service = AppointmentService::new(&state);
    let appointment = service.update_appointment(&user, id, request).await?;
    Ok(Json(service.to_view(appointment).await?))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<AppointmentView>, AppError> {
    authorize(&user, Resource::AppointmentStatus, Action::Update)?;
    let service = AppointmentService::new(&state);
    let appointment = service.update_status(&user, id, request).await?;
    Ok(Json(service.to_view(appointment).await?))
}
