use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use futures::future::join_all;
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use appointment_cell::AppointmentState;
use doctor_cell::models::{CreateAvailabilityRequest, CreateDoctorRequest, DayOfWeek, Doctor, SpecializationRequest};
use doctor_cell::services::availability::AvailabilityService;
use doctor_cell::services::doctor::DoctorService;
use doctor_cell::services::specialization::SpecializationService;
use notification_cell::{
    InMemoryNotificationQueue, NotificationError, NotificationJob, NotificationProducer, NotificationQueue,
};
use patient_cell::models::{CreatePatientRequest, Patient};
use patient_cell::services::patient::PatientService;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::test_utils::{TestConfig, TestUser};
use shared_utils::AppState;

fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 4).unwrap()
}

struct UnreachableQueue;

#[async_trait]
impl NotificationQueue for UnreachableQueue {
    async fn enqueue(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        Err(NotificationError::QueueError("connection refused".to_string()))
    }

    async fn dequeue(&self, _worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        Ok(None)
    }

    async fn requeue(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn complete(&self, _job: &NotificationJob) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn get_job(&self, _job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        Ok(None)
    }
}

struct Fixture {
    state: AppointmentState,
    queue: Arc<InMemoryNotificationQueue>,
    admin: User,
    doctor_user: User,
    doctor: Doctor,
    patient_user: User,
    patient: Patient,
}

async fn seed_doctor(app: &AppState, admin: &User, username: &str, license: &str) -> (User, Doctor) {
    let doctor_user = TestUser::doctor(username).seed_account(app, "Gregory", username).await;
    let specialization = SpecializationService::new(app)
        .create(SpecializationRequest {
            name: format!("Diagnostics {}", license),
            description: None,
        })
        .await
        .unwrap();

    let doctor = DoctorService::new(app)
        .create_doctor(
            admin,
            CreateDoctorRequest {
                account_id: Some(doctor_user.id),
                specialization_id: specialization.id,
                license_number: license.to_string(),
                years_of_experience: 12,
                consultation_fee: 150.0,
                is_available: Some(true),
            },
        )
        .await
        .unwrap();

    // Monday 09:00-17:00
    AvailabilityService::new(app)
        .create_availability(
            admin,
            doctor.id,
            CreateAvailabilityRequest {
                day: DayOfWeek::Monday,
                start_time: t(9, 0),
                end_time: t(17, 0),
                is_available: Some(true),
            },
        )
        .await
        .unwrap();

    (doctor_user, doctor)
}

async fn fixture_with_queue(queue: Arc<dyn NotificationQueue>) -> (AppointmentState, User, User, Doctor, User, Patient) {
    let app = TestConfig::default().to_state();
    let admin = TestUser::admin("root").to_user();
    let (doctor_user, doctor) = seed_doctor(&app, &admin, "house", "LIC-1001").await;

    let patient_user = TestUser::patient("jane").seed_account(&app, "Jane", "Doe").await;
    let patient = PatientService::new(&app)
        .create_patient(&patient_user, CreatePatientRequest::default())
        .await
        .unwrap();

    let state = AppointmentState::new(app, Arc::new(NotificationProducer::new(queue)));
    (state, admin, doctor_user, doctor, patient_user, patient)
}

async fn fixture() -> Fixture {
    let queue = Arc::new(InMemoryNotificationQueue::new());
    let (state, admin, doctor_user, doctor, patient_user, patient) = fixture_with_queue(queue.clone()).await;
    Fixture { state, queue, admin, doctor_user, doctor, patient_user, patient }
}

fn booking(doctor_id: Uuid, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        doctor_id,
        patient_id: None,
        appointment_date: date,
        start_time: start,
        end_time: end,
        reason: Some("Persistent cough".to_string()),
        notes: None,
    }
}

async fn book(f: &Fixture, start: NaiveTime, end: NaiveTime) -> Result<Appointment, AppError> {
    create_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Json(booking(f.doctor.id, monday(), start, end)),
    )
    .await
    .map(|(_, Json(view))| view.appointment)
}

async fn set_status(f: &Fixture, user: &User, id: Uuid, status: AppointmentStatus) -> Result<Appointment, AppError> {
    update_appointment_status(
        State(f.state.clone()),
        Extension(user.clone()),
        Path(id),
        Json(StatusUpdateRequest { status, notes: None }),
    )
    .await
    .map(|Json(view)| view.appointment)
}

#[tokio::test]
async fn test_booking_inside_window_is_accepted_and_reads_back() {
    let f = fixture().await;

    let (status, Json(created)) = create_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Json(booking(f.doctor.id, monday(), t(10, 0), t(11, 0))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let Json(fetched) = get_appointment(State(f.state.clone()), Extension(f.patient_user.clone()), Path(created.id))
        .await
        .unwrap();

    assert_eq!(fetched.doctor_id, f.doctor.id);
    assert_eq!(fetched.patient_id, f.patient.id);
    assert_eq!(fetched.appointment_date, monday());
    assert_eq!((fetched.start_time, fetched.end_time), (t(10, 0), t(11, 0)));
    assert_eq!(fetched.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_booking_on_day_without_window_is_rejected() {
    let f = fixture().await;

    let result = create_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Json(booking(f.doctor.id, tuesday(), t(10, 0), t(11, 0))),
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), "doctor_not_available");
    assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_booking_spilling_past_window_is_rejected() {
    let f = fixture().await;
    let err = book(&f, t(16, 30), t(17, 30)).await.unwrap_err();
    assert_eq!(err.code(), "doctor_not_available");

    let listing = list_appointments(
        State(f.state.clone()),
        Extension(f.admin.clone()),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();
    assert!(listing.0.is_empty());
}

#[tokio::test]
async fn test_overlap_rejected_adjacent_accepted() {
    let f = fixture().await;
    book(&f, t(10, 0), t(11, 0)).await.unwrap();

    let err = book(&f, t(10, 30), t(11, 30)).await.unwrap_err();
    assert_eq!(err.code(), "slot_already_booked");
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    let adjacent = book(&f, t(11, 0), t(12, 0)).await.unwrap();
    assert_eq!(adjacent.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_cancelled_appointment_frees_the_slot() {
    let f = fixture().await;
    let first = book(&f, t(10, 0), t(11, 0)).await.unwrap();

    let cancelled = set_status(&f, &f.doctor_user, first.id, AppointmentStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    book(&f, t(10, 30), t(11, 30)).await.unwrap();
}

#[tokio::test]
async fn test_reactivating_cancelled_appointment_rechecks_the_slot() {
    let f = fixture().await;
    let first = book(&f, t(10, 0), t(11, 0)).await.unwrap();
    set_status(&f, &f.doctor_user, first.id, AppointmentStatus::Cancelled).await.unwrap();
    let replacement = book(&f, t(10, 0), t(11, 0)).await.unwrap();

    let via_status = set_status(&f, &f.doctor_user, first.id, AppointmentStatus::Scheduled).await;
    assert_matches!(via_status, Err(AppError::BusinessRule { code: "slot_already_booked", .. }));

    let via_update = update_appointment(
        State(f.state.clone()),
        Extension(f.admin.clone()),
        Path(first.id),
        Json(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        }),
    )
    .await;
    assert_matches!(via_update, Err(AppError::BusinessRule { code: "slot_already_booked", .. }));

    let Json(active) = list_appointments(
        State(f.state.clone()),
        Extension(f.admin.clone()),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();
    let active: Vec<Uuid> = active.iter().filter(|a| a.status.is_active()).map(|a| a.id).collect();
    assert_eq!(active, vec![replacement.id]);

    // Once the slot is free again the original can come back.
    set_status(&f, &f.doctor_user, replacement.id, AppointmentStatus::NoShow).await.unwrap();
    let restored = set_status(&f, &f.doctor_user, first.id, AppointmentStatus::Scheduled).await.unwrap();
    assert_eq!(restored.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_patient_cannot_set_status_through_update() {
    let f = fixture().await;
    let appointment = book(&f, t(10, 0), t(11, 0)).await.unwrap();

    let result = update_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(appointment.id),
        Json(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Completed),
            notes: Some("Done already".to_string()),
            ..Default::default()
        }),
    )
    .await;
    assert_matches!(result, Err(AppError::Forbidden(_)));

    let Json(unchanged) = get_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(appointment.id),
    )
    .await
    .unwrap();
    assert_eq!(unchanged.status, AppointmentStatus::Scheduled);
    assert_eq!(unchanged.notes, None);

    let Json(confirmed) = update_appointment(
        State(f.state.clone()),
        Extension(f.doctor_user.clone()),
        Path(appointment.id),
        Json(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_responses_embed_doctor_and_patient_details() {
    let f = fixture().await;
    let (_, Json(created)) = create_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Json(booking(f.doctor.id, monday(), t(10, 0), t(11, 0))),
    )
    .await
    .unwrap();

    let doctor = created.doctor_details.as_ref().unwrap();
    assert_eq!(doctor.doctor.id, f.doctor.id);
    assert_eq!(doctor.user.as_ref().map(|u| u.id), Some(f.doctor_user.id));
    let patient = created.patient_details.as_ref().unwrap();
    assert_eq!(patient.id, f.patient.id);
    assert_eq!(patient.user.as_ref().map(|u| u.full_name()).as_deref(), Some("Jane Doe"));

    let Json(listing) = list_appointments(
        State(f.state.clone()),
        Extension(f.doctor_user.clone()),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();
    let body = serde_json::to_value(&listing).unwrap();
    assert_eq!(body[0]["id"], created.id.to_string());
    assert_eq!(body[0]["doctor_details"]["license_number"], "LIC-1001");
    assert_eq!(body[0]["patient_details"]["user"]["username"], "jane");
    assert!(body[0]["patient_details"]["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_completed_status_is_final() {
    let f = fixture().await;
    let appointment = book(&f, t(9, 0), t(9, 30)).await.unwrap();

    set_status(&f, &f.doctor_user, appointment.id, AppointmentStatus::Completed).await.unwrap();

    let err = set_status(&f, &f.doctor_user, appointment.id, AppointmentStatus::Scheduled)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_status_transition");

    let again = set_status(&f, &f.doctor_user, appointment.id, AppointmentStatus::Completed).await.unwrap();
    assert_eq!(again.status, AppointmentStatus::Completed);

    let via_update = update_appointment(
        State(f.state.clone()),
        Extension(f.admin.clone()),
        Path(appointment.id),
        Json(UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        }),
    )
    .await;
    assert_matches!(via_update, Err(AppError::BusinessRule { code: "invalid_status_transition", .. }));
}

#[tokio::test]
async fn test_only_involved_doctor_or_admin_changes_status() {
    let f = fixture().await;
    let appointment = book(&f, t(14, 0), t(15, 0)).await.unwrap();

    let patient_attempt = set_status(&f, &f.patient_user, appointment.id, AppointmentStatus::Confirmed).await;
    assert_matches!(patient_attempt, Err(AppError::Forbidden(_)));

    let (other_doctor, _) = seed_doctor(&f.state.app, &f.admin, "wilson", "LIC-2002").await;
    let stranger = set_status(&f, &other_doctor, appointment.id, AppointmentStatus::Confirmed).await;
    assert_matches!(stranger, Err(AppError::Forbidden(_)));

    let confirmed = set_status(&f, &f.admin, appointment.id, AppointmentStatus::Confirmed).await.unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_reversed_interval_is_a_validation_error() {
    let f = fixture().await;
    let err = book(&f, t(11, 0), t(10, 0)).await.unwrap_err();
    assert_matches!(err, AppError::ValidationError(_));
}

#[tokio::test]
async fn test_unknown_doctor_is_not_found() {
    let f = fixture().await;
    let result = create_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Json(booking(Uuid::new_v4(), monday(), t(10, 0), t(11, 0))),
    )
    .await;
    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_staff_must_name_the_patient() {
    let f = fixture().await;

    let missing = create_appointment(
        State(f.state.clone()),
        Extension(f.admin.clone()),
        Json(booking(f.doctor.id, monday(), t(10, 0), t(11, 0))),
    )
    .await;
    assert_matches!(missing, Err(AppError::ValidationError(_)));

    let mut request = booking(f.doctor.id, monday(), t(10, 0), t(11, 0));
    request.patient_id = Some(f.patient.id);
    let (_, Json(created)) = create_appointment(State(f.state.clone()), Extension(f.admin.clone()), Json(request))
        .await
        .unwrap();
    assert_eq!(created.patient_id, f.patient.id);
}

#[tokio::test]
async fn test_patient_cannot_book_for_someone_else() {
    let f = fixture().await;
    let mut request = booking(f.doctor.id, monday(), t(10, 0), t(11, 0));
    request.patient_id = Some(Uuid::new_v4());

    let result = create_appointment(State(f.state.clone()), Extension(f.patient_user.clone()), Json(request)).await;
    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_reschedule_revalidates_excluding_itself() {
    let f = fixture().await;
    let first = book(&f, t(10, 0), t(11, 0)).await.unwrap();
    let second = book(&f, t(12, 0), t(13, 0)).await.unwrap();

    // Shifting within its own slot only overlaps itself.
    let Json(shifted) = update_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(first.id),
        Json(UpdateAppointmentRequest {
            start_time: Some(t(10, 30)),
            end_time: Some(t(11, 30)),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(shifted.start_time, t(10, 30));

    let clash = update_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(second.id),
        Json(UpdateAppointmentRequest {
            start_time: Some(t(11, 0)),
            ..Default::default()
        }),
    )
    .await;
    assert_matches!(clash, Err(AppError::BusinessRule { code: "slot_already_booked", .. }));

    let off_hours = update_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(second.id),
        Json(UpdateAppointmentRequest {
            appointment_date: Some(tuesday()),
            ..Default::default()
        }),
    )
    .await;
    assert_matches!(off_hours, Err(AppError::BusinessRule { code: "doctor_not_available", .. }));
}

#[tokio::test]
async fn test_confirmation_queued_on_create_only() {
    let f = fixture().await;
    let appointment = book(&f, t(10, 0), t(11, 0)).await.unwrap();

    let jobs = f.queue.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].appointment_id, appointment.id);

    update_appointment(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Path(appointment.id),
        Json(UpdateAppointmentRequest {
            notes: Some("Bring previous X-rays".to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    set_status(&f, &f.doctor_user, appointment.id, AppointmentStatus::Confirmed).await.unwrap();

    assert_eq!(f.queue.jobs().await.len(), 1);
    assert_eq!(f.queue.pending_len().await, 1);
}

#[tokio::test]
async fn test_queue_failure_does_not_fail_booking() {
    let (state, _, _, doctor, patient_user, _) = fixture_with_queue(Arc::new(UnreachableQueue)).await;

    let (status, Json(created)) = create_appointment(
        State(state.clone()),
        Extension(patient_user.clone()),
        Json(booking(doctor.id, monday(), t(10, 0), t(11, 0))),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let Json(fetched) = get_appointment(State(state), Extension(patient_user), Path(created.id))
        .await
        .unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn test_listing_is_scoped_to_the_caller() {
    let f = fixture().await;
    book(&f, t(10, 0), t(11, 0)).await.unwrap();
    let later = book(&f, t(15, 0), t(16, 0)).await.unwrap();
    set_status(&f, &f.doctor_user, later.id, AppointmentStatus::Confirmed).await.unwrap();

    let outsider = TestUser::patient("john").seed_account(&f.state.app, "John", "Roe").await;
    PatientService::new(&f.state.app)
        .create_patient(&outsider, CreatePatientRequest::default())
        .await
        .unwrap();

    let Json(own) = list_appointments(
        State(f.state.clone()),
        Extension(f.patient_user.clone()),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();
    assert_eq!(own.len(), 2);
    assert!(own[0].start_time < own[1].start_time);

    let Json(theirs) = list_appointments(
        State(f.state.clone()),
        Extension(outsider.clone()),
        Query(AppointmentListQuery::default()),
    )
    .await
    .unwrap();
    assert!(theirs.is_empty());

    let Json(confirmed) = list_appointments(
        State(f.state.clone()),
        Extension(f.doctor_user.clone()),
        Query(AppointmentListQuery {
            status: Some(AppointmentStatus::Confirmed),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].id, later.id);

    let hidden = get_appointment(State(f.state.clone()), Extension(outsider), Path(later.id)).await;
    assert_matches!(hidden, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_concurrent_bookings_for_same_slot_admit_one() {
    let f = fixture().await;

    let attempts = (0..8).map(|_| {
        let state = f.state.clone();
        let user = f.patient_user.clone();
        let request = booking(f.doctor.id, monday(), t(10, 0), t(11, 0));
        tokio::spawn(async move { create_appointment(State(state), Extension(user), Json(request)).await })
    });

    let mut accepted = 0;
    let mut rejected = 0;
    for outcome in join_all(attempts).await {
        match outcome.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => {
                assert_eq!(err.code(), "slot_already_booked");
                rejected += 1;
            }
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(rejected, 7);
}
