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
use shared_models::error::AppError;
use shared_utils::AppState;

use crate::models::{
    AvailabilityWindow, CreateDoctorRequest, Doctor, DoctorListQuery, Specialization, UpdateDoctorRequest,
    AVAILABILITY_TABLE, DOCTORS_TABLE, SPECIALIZATIONS_TABLE,
};

pub struct DoctorService {
    db: Arc<dyn Database>,
}

impl DoctorService {
    pub fn new(state: &AppState) -> Self {
        Self { db: state.db.clone() }
    }

    pub fn from_db(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn list_doctors(&self, params: DoctorListQuery) -> Result<Vec<Doctor>, AppError> {
        let mut query = Query::new();

        if let Some(specialization_id) = params.specialization_id {
            query = query.eq("specialization_id", specialization_id.to_string());
        }
        if let Some(is_available) = params.is_available {
            query = query.eq("is_available", is_available);
        }
        if let Some(term) = params.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let account_ids = AccountService::find_ids_by_name(self.db.as_ref(), term).await?;
            query = query.or(vec![
                Condition::ilike("license_number", term),
                Condition::in_list("account_id", account_ids.iter().map(Uuid::to_string)),
            ]);
        }

        let query = query
            .ordering(params.ordering.as_deref(), &["years_of_experience", "consultation_fee"])
            .map_err(AppError::ValidationError)?
            .paginate(params.limit, params.offset);

        Ok(fetch_all(self.db.as_ref(), DOCTORS_TABLE, &query).await?)
    }

    pub async fn get_doctor(&self, id: Uuid) -> Result<Doctor, AppError> {
        fetch_by_id(self.db.as_ref(), DOCTORS_TABLE, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
    }

    pub async fn find_by_account(&self, account_id: Uuid) -> Result<Option<Doctor>, AppError> {
        let query = Query::new().eq("account_id", account_id.to_string());
        Ok(fetch_one(self.db.as_ref(), DOCTORS_TABLE, &query).await?)
    }

    pub async fn create_doctor(&self, user: &User, request: CreateDoctorRequest) -> Result<Doctor, AppError> {
        let account_id = request.account_id.unwrap_or(user.id);
        debug!("Creating doctor profile for account: {}", account_id);

        if !user.is_staff() && account_id != user.id {
            return Err(AppError::Forbidden("Doctors may only create their own profile".to_string()));
        }

        let account: Account = fetch_by_id(self.db.as_ref(), ACCOUNTS_TABLE, account_id)
            .await?
            .ok_or_else(|| AppError::ValidationError("Account does not exist".to_string()))?;
        if account.role != Role::Doctor {
            return Err(AppError::ValidationError("Account is not a doctor account".to_string()));
        }
        if self.find_by_account(account_id).await?.is_some() {
            return Err(AppError::Conflict("Account already has a doctor profile".to_string()));
        }

        self.ensure_specialization_exists(request.specialization_id).await?;
        validate_license(&request.license_number)?;
        validate_experience(request.years_of_experience)?;
        validate_fee(request.consultation_fee)?;
        self.ensure_license_free(&request.license_number, None).await?;

        let now = Utc::now();
        let row = json!({
            "id": Uuid::new_v4(),
            "account_id": account_id,
            "specialization_id": request.specialization_id,
            "license_number": request.license_number.trim(),
            "years_of_experience": request.years_of_experience,
            "consultation_fee": request.consultation_fee,
            "is_available": request.is_available.unwrap_or(true),
            "created_at": now,
            "updated_at": now,
        });

        let doctor: Doctor = insert_as(self.db.as_ref(), DOCTORS_TABLE, row).await?;
        info!("Created doctor profile {} for account {}", doctor.id, account_id);
        Ok(doctor)
    }

    pub async fn update_doctor(
        &self,
        user: &User,
        id: Uuid,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, AppError> {
        debug!("Updating doctor profile: {}", id);

        let doctor = self.get_doctor(id).await?;
        Self::ensure_can_manage(user, &doctor)?;

        let mut update_data = Map::new();

        if let Some(specialization_id) = request.specialization_id {
            self.ensure_specialization_exists(specialization_id).await?;
            update_data.insert("specialization_id".to_string(), json!(specialization_id));
        }
        if let Some(license) = request.license_number {
            validate_license(&license)?;
            self.ensure_license_free(&license, Some(id)).await?;
            update_data.insert("license_number".to_string(), json!(license.trim()));
        }
        if let Some(years) = request.years_of_experience {
            validate_experience(years)?;
            update_data.insert("years_of_experience".to_string(), json!(years));
        }
        if let Some(fee) = request.consultation_fee {
            validate_fee(fee)?;
            update_data.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(is_available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(is_available));
        }

        update_data.insert("updated_at".to_string(), json!(Utc::now()));

        update_as(self.db.as_ref(), DOCTORS_TABLE, id, Value::Object(update_data))
            .await?
            .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
    }

    /// Removes the profile together with its availability windows.
    pub async fn delete_doctor(&self, id: Uuid) -> Result<(), AppError> {
        let doctor = self.get_doctor(id).await?;

        let windows: Vec<AvailabilityWindow> = fetch_all(
            self.db.as_ref(),
            AVAILABILITY_TABLE,
            &Query::new().eq("doctor_id", doctor.id.to_string()),
        )
        .await?;
        for window in windows {
            self.db.delete(AVAILABILITY_TABLE, window.id).await?;
        }

        self.db.delete(DOCTORS_TABLE, doctor.id).await?;
        info!("Deleted doctor profile {}", doctor.id);
        Ok(())
    }

    /// Admins manage every profile; a doctor only their own.
    pub fn ensure_can_manage(user: &User, doctor: &Doctor) -> Result<(), AppError> {
        if user.is_staff() || doctor.account_id == user.id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not authorized to manage this doctor profile".to_string()))
        }
    }

    async fn ensure_specialization_exists(&self, id: Uuid) -> Result<(), AppError> {
        let specialization: Option<Specialization> =
            fetch_by_id(self.db.as_ref(), SPECIALIZATIONS_TABLE, id).await?;
        if specialization.is_none() {
            return Err(AppError::ValidationError("Specialization does not exist".to_string()));
        }
        Ok(())
    }

    async fn ensure_license_free(&self, license: &str, except: Option<Uuid>) -> Result<(), AppError> {
        let mut query = Query::new().eq("license_number", license.trim());
        if let Some(id) = except {
            query = query.neq("id", id.to_string());
        }

        let existing: Option<Doctor> = fetch_one(self.db.as_ref(), DOCTORS_TABLE, &query).await?;
        if existing.is_some() {
            return Err(AppError::Conflict("A doctor with this license number already exists".to_string()));
        }
        Ok(())
    }
}

fn validate_license(license: &str) -> Result<(), AppError> {
    if license.trim().is_empty() {
        return Err(AppError::ValidationError("License number is required".to_string()));
    }
    Ok(())
}

fn validate_experience(years: i32) -> Result<(), AppError> {
    if years < 0 {
        return Err(AppError::ValidationError("Years of experience cannot be negative".to_string()));
    }
    Ok(())
}

fn validate_fee(fee: f64) -> Result<(), AppError> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(AppError::ValidationError("Consultation fee must be a non-negative amount".to_string()));
    }
    Ok(())
}
