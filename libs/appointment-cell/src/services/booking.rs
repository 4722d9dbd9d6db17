use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use auth_cell::models::{Account, ACCOUNTS_TABLE};
use doctor_cell::models::{DayOfWeek, Doctor, DOCTORS_TABLE};
use doctor_cell::services::availability::AvailabilityService;
use doctor_cell::services::doctor::DoctorService;
use notification_cell::NotificationProducer;
use patient_cell::models::{Patient, PatientView, PATIENTS_TABLE};
use patient_cell::services::patient::PatientService;
use shared_database::store::{fetch_all, fetch_by_id, insert_as, update_as};
use shared_database::{Database, DatabaseError, Query};
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, AppointmentView, CreateAppointmentRequest,
    DoctorDetails, StatusUpdateRequest, UpdateAppointmentRequest, APPOINTMENTS_TABLE,
};
use crate::services::conflict::{check_availability, check_conflicts, validate_interval};
use crate::services::lifecycle::{reclaims_slot, validate_status_transition};
use crate::services::locks::SlotLocks;
use crate::state::AppointmentState;

/// Doctor or patient profile behind the calling account, if any.
#[derive(Debug, Default, Clone, Copy)]
struct CallerProfile {
    doctor_id: Option<Uuid>,
    patient_id: Option<Uuid>,
}

pub struct AppointmentService {
    db: Arc<dyn Database>,
    producer: Arc<NotificationProducer>,
    locks: Arc<SlotLocks>,
}

impl AppointmentService {
    pub fn new(state: &AppointmentState) -> Self {
        Self {
            db: state.app.db.clone(),
            producer: state.producer.clone(),
            locks: state.locks.clone(),
        }
    }

    /// Appointments visible to the caller: patients and doctors see their own,
    /// admins see all.
    pub async fn list_appointments(
        &self,
        user: &User,
        params: AppointmentListQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for {} ({})", user.id, user.role);

        let mut query = Query::new();
        match user.role {
            Role::Admin => {}
            Role::Doctor | Role::Patient => {
                let profile = self.caller_profile(user).await?;
                query = match (user.role, profile) {
                    (Role::Doctor, CallerProfile { doctor_id: Some(id), .. }) => query.eq("doctor_id", id.to_string()),
                    (Role::Patient, CallerProfile { patient_id: Some(id), .. }) => query.eq("patient_id", id.to_string()),
                    _ => return Ok(Vec::new()),
                };
            }
        }

        if let Some(status) = params.status {
            query = query.eq("status", status.as_str());
        }
        if let Some(date) = params.date {
            query = query.eq("appointment_date", date.to_string());
        }
        if let Some(doctor_id) = params.doctor_id {
            query = query.eq("doctor_id", doctor_id.to_string());
        }
        if let Some(patient_id) = params.patient_id {
            query = query.eq("patient_id", patient_id.to_string());
        }

        let query = query
            .order_by("appointment_date", false)
            .order_by("start_time", false)
            .paginate(params.limit, params.offset);

        Ok(fetch_all(self.db.as_ref(), APPOINTMENTS_TABLE, &query).await?)
    }

    pub async fn get_appointment(&self, user: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.find(id).await?;
        self.ensure_participant(user, &appointment).await?;
        Ok(appointment)
    }

    pub async fn create_appointment(
        &self,
        user: &User,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking doctor {} on {} {}-{}",
            request.doctor_id, request.appointment_date, request.start_time, request.end_time
        );

        validate_interval(request.start_time, request.end_time)?;
        let patient_id = self.resolve_patient(user, request.patient_id).await?;
        let doctor = self.find_doctor(request.doctor_id).await?;

        let appointment = {
            let _guard = self.locks.acquire(doctor.id).await;

            self.validate_slot(doctor.id, request.appointment_date, request.start_time, request.end_time, None)
                .await?;

            let now = Utc::now();
            let row = json!({
                "id": Uuid::new_v4(),
                "doctor_id": doctor.id,
                "patient_id": patient_id,
                "appointment_date": request.appointment_date,
                "start_time": request.start_time,
                "end_time": request.end_time,
                "status": AppointmentStatus::Scheduled,
                "reason": request.reason,
                "notes": request.notes,
                "created_at": now,
                "updated_at": now,
            });

            insert_as::<Appointment>(self.db.as_ref(), APPOINTMENTS_TABLE, row)
                .await
                .map_err(slot_conflict)?
        };

        info!("Booked appointment {} for patient {}", appointment.id, patient_id);

        if let Err(e) = self.producer.enqueue_appointment_confirmation(appointment.id).await {
            warn!("Failed to queue confirmation for appointment {}: {}", appointment.id, e);
        }

        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        user: &User,
        id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", id);

        let current = self.find(id).await?;
        self.ensure_participant(user, &current).await?;

        if let Some(status) = request.status {
            self.ensure_status_authority(user, &current).await?;
            validate_status_transition(current.status, status)?;
        }

        let status = request.status.unwrap_or(current.status);
        let date = request.appointment_date.unwrap_or(current.appointment_date);
        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);

        let mut changes = Map::new();
        if let Some(reason) = request.reason.clone() {
            changes.insert("reason".to_string(), Value::String(reason));
        }
        if let Some(notes) = request.notes.clone() {
            changes.insert("notes".to_string(), Value::String(notes));
        }
        if request.status.is_some() {
            changes.insert("status".to_string(), json!(status));
        }
        if request.changes_schedule() {
            validate_interval(start, end)?;
            changes.insert("appointment_date".to_string(), json!(date));
            changes.insert("start_time".to_string(), json!(start));
            changes.insert("end_time".to_string(), json!(end));
        }

        let _guard = if request.changes_schedule() || reclaims_slot(current.status, status) {
            let guard = self.locks.acquire(current.doctor_id).await;
            self.validate_slot(current.doctor_id, date, start, end, Some(current.id)).await?;
            Some(guard)
        } else {
            None
        };

        let updated = self.apply(id, changes).await?;
        info!("Updated appointment {}", id);
        Ok(updated)
    }

    /// Status change by the appointment's doctor or an admin.
    pub async fn update_status(
        &self,
        user: &User,
        id: Uuid,
        request: StatusUpdateRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Setting appointment {} to {}", id, request.status);

        let current = self.find(id).await?;
        self.ensure_status_authority(user, &current).await?;
        validate_status_transition(current.status, request.status)?;

        let mut changes = Map::new();
        changes.insert("status".to_string(), json!(request.status));
        if let Some(notes) = request.notes {
            changes.insert("notes".to_string(), Value::String(notes));
        }

        let _guard = if reclaims_slot(current.status, request.status) {
            let guard = self.locks.acquire(current.doctor_id).await;
            self.validate_slot(
                current.doctor_id,
                current.appointment_date,
                current.start_time,
                current.end_time,
                Some(current.id),
            )
            .await?;
            Some(guard)
        } else {
            None
        };

        let updated = self.apply(id, changes).await?;
        info!("Appointment {} is now {}", id, updated.status);
        Ok(updated)
    }

    pub async fn to_view(&self, appointment: Appointment) -> Result<AppointmentView, AppointmentError> {
        self.to_views(vec![appointment])
            .await?
            .pop()
            .ok_or(AppointmentError::NotFound)
    }

    /// Embeds doctor and patient details, one lookup per table for the whole page.
    pub async fn to_views(&self, appointments: Vec<Appointment>) -> Result<Vec<AppointmentView>, AppointmentError> {
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let doctor_ids: HashSet<Uuid> = appointments.iter().map(|a| a.doctor_id).collect();
        let patient_ids: HashSet<Uuid> = appointments.iter().map(|a| a.patient_id).collect();

        let doctors: Vec<Doctor> = fetch_all(
            self.db.as_ref(),
            DOCTORS_TABLE,
            &Query::new().in_list("id", doctor_ids.iter().map(Uuid::to_string)),
        )
        .await?;
        let accounts: Vec<Account> = fetch_all(
            self.db.as_ref(),
            ACCOUNTS_TABLE,
            &Query::new().in_list("id", doctors.iter().map(|d| d.account_id.to_string())),
        )
        .await?;
        let mut accounts: HashMap<Uuid, Account> = accounts.into_iter().map(|a| (a.id, a)).collect();
        let doctors: HashMap<Uuid, DoctorDetails> = doctors
            .into_iter()
            .map(|doctor| {
                let user = accounts.remove(&doctor.account_id);
                (doctor.id, DoctorDetails { doctor, user })
            })
            .collect();

        let patients: Vec<Patient> = fetch_all(
            self.db.as_ref(),
            PATIENTS_TABLE,
            &Query::new().in_list("id", patient_ids.iter().map(Uuid::to_string)),
        )
        .await?;
        let patients: HashMap<Uuid, PatientView> = PatientService::from_db(self.db.clone())
            .to_views(patients)
            .await
            .map_err(AppError::from)?
            .into_iter()
            .map(|view| (view.id, view))
            .collect();

        Ok(appointments
            .into_iter()
            .map(|appointment| AppointmentView {
                doctor_details: doctors.get(&appointment.doctor_id).cloned(),
                patient_details: patients.get(&appointment.patient_id).cloned(),
                appointment,
            })
            .collect())
    }

    /// Availability and double-booking checks for a proposed slot. Callers
    /// hold the doctor's slot lock.
    async fn validate_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let windows = AvailabilityService::from_db(self.db.clone())
            .windows_for_day(doctor_id, DayOfWeek::from_date(date))
            .await?;
        check_availability(&windows, start, end)?;

        let mut query = Query::new()
            .eq("doctor_id", doctor_id.to_string())
            .eq("appointment_date", date.to_string())
            .in_list("status", AppointmentStatus::ACTIVE.iter().map(AppointmentStatus::as_str));
        if let Some(id) = exclude_appointment_id {
            query = query.neq("id", id.to_string());
        }

        let existing: Vec<Appointment> = fetch_all(self.db.as_ref(), APPOINTMENTS_TABLE, &query).await?;
        check_conflicts(&existing, start, end, exclude_appointment_id)
    }

    async fn find(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        fetch_by_id(self.db.as_ref(), APPOINTMENTS_TABLE, id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    async fn find_doctor(&self, id: Uuid) -> Result<Doctor, AppointmentError> {
        fetch_by_id(self.db.as_ref(), DOCTORS_TABLE, id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)
    }

    async fn apply(&self, id: Uuid, mut changes: Map<String, Value>) -> Result<Appointment, AppointmentError> {
        changes.insert("updated_at".to_string(), json!(Utc::now()));
        update_as(self.db.as_ref(), APPOINTMENTS_TABLE, id, Value::Object(changes))
            .await
            .map_err(slot_conflict)?
            .ok_or(AppointmentError::NotFound)
    }

    /// Patients book for their own profile; staff name the patient explicitly.
    async fn resolve_patient(&self, user: &User, requested: Option<Uuid>) -> Result<Uuid, AppointmentError> {
        if user.role == Role::Patient {
            let own = self
                .caller_profile(user)
                .await?
                .patient_id
                .ok_or_else(|| AppointmentError::Validation("Create a patient profile before booking".to_string()))?;

            return match requested {
                Some(id) if id != own => Err(AppointmentError::Unauthorized(
                    "Patients can only book appointments for themselves".to_string(),
                )),
                _ => Ok(own),
            };
        }

        let id = requested.ok_or_else(|| AppointmentError::Validation("patient_id is required".to_string()))?;
        let patient: Option<Patient> = fetch_by_id(self.db.as_ref(), PATIENTS_TABLE, id).await?;
        patient.map(|p| p.id).ok_or(AppointmentError::PatientNotFound)
    }

    async fn ensure_status_authority(&self, user: &User, appointment: &Appointment) -> Result<(), AppointmentError> {
        if user.role == Role::Admin {
            return Ok(());
        }

        let profile = self.caller_profile(user).await?;
        if profile.doctor_id == Some(appointment.doctor_id) {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized(
                "Only the appointment's doctor can change its status".to_string(),
            ))
        }
    }

    async fn ensure_participant(&self, user: &User, appointment: &Appointment) -> Result<(), AppointmentError> {
        if user.role == Role::Admin {
            return Ok(());
        }

        let profile = self.caller_profile(user).await?;
        if appointment.involves(profile.doctor_id, profile.patient_id) {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized(
                "Not authorized to access this appointment".to_string(),
            ))
        }
    }

    async fn caller_profile(&self, user: &User) -> Result<CallerProfile, AppointmentError> {
        let profile = match user.role {
            Role::Doctor => CallerProfile {
                doctor_id: DoctorService::from_db(self.db.clone())
                    .find_by_account(user.id)
                    .await?
                    .map(|d| d.id),
                patient_id: None,
            },
            Role::Patient => CallerProfile {
                doctor_id: None,
                patient_id: PatientService::from_db(self.db.clone())
                    .find_by_account(user.id)
                    .await
                    .map_err(AppError::from)?
                    .map(|p| p.id),
            },
            Role::Admin => CallerProfile::default(),
        };
        Ok(profile)
    }
}

/// A constraint violation on write means another booking won the slot.
fn slot_conflict(err: DatabaseError) -> AppointmentError {
    match err {
        DatabaseError::Conflict(_) => AppointmentError::SlotAlreadyBooked,
        other => other.into(),
    }
}
