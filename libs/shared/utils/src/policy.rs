//! Role-based access table. Each handler asks `authorize` once; ownership
//! rules ("own profile", "involved doctor") are enforced by the services.

use shared_models::auth::{Role, User};
use shared_models::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The caller's own account.
    Profile,
    /// Every account, for administration.
    AccountDirectory,
    Specialization,
    Doctor,
    Availability,
    Patient,
    MedicalRecord,
    Appointment,
    AppointmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
}

use Action::*;
use Resource::*;
use Role::{Admin, Doctor as DoctorRole, Patient as PatientRole};

const ALL: &[Role] = &[PatientRole, DoctorRole, Admin];
const CLINICAL: &[Role] = &[DoctorRole, Admin];
const PATIENT_OR_ADMIN: &[Role] = &[PatientRole, Admin];
const ADMIN: &[Role] = &[Admin];

static POLICY: &[(Resource, Action, &[Role])] = &[
    (Profile, Read, ALL),
    (Profile, Update, ALL),
    (AccountDirectory, List, ADMIN),
    (Specialization, List, ALL),
    (Specialization, Read, ALL),
    (Specialization, Create, ADMIN),
    (Specialization, Update, ADMIN),
    (Specialization, Delete, ADMIN),
    (Doctor, List, ALL),
    (Doctor, Read, ALL),
    (Doctor, Create, CLINICAL),
    (Doctor, Update, CLINICAL),
    (Doctor, Delete, ADMIN),
    (Availability, List, ALL),
    (Availability, Create, CLINICAL),
    (Patient, List, CLINICAL),
    (Patient, Read, ALL),
    (Patient, Create, PATIENT_OR_ADMIN),
    (Patient, Update, PATIENT_OR_ADMIN),
    (Patient, Delete, ADMIN),
    (MedicalRecord, List, ALL),
    (MedicalRecord, Read, ALL),
    (MedicalRecord, Create, CLINICAL),
    (MedicalRecord, Update, CLINICAL),
    (MedicalRecord, Delete, CLINICAL),
    (Appointment, List, ALL),
    (Appointment, Read, ALL),
    (Appointment, Create, ALL),
    (Appointment, Update, ALL),
    (AppointmentStatus, Update, CLINICAL),
];

pub fn is_allowed(role: Role, resource: Resource, action: Action) -> bool {
    POLICY
        .iter()
        .any(|(r, a, roles)| *r == resource && *a == action && roles.contains(&role))
}

pub fn authorize(user: &User, resource: Resource, action: Action) -> Result<(), AppError> {
    if is_allowed(user.role, resource, action) {
        Ok(())
    } else {
        tracing::warn!("{} {} denied {:?} on {:?}", user.role, user.id, action, resource);
        Err(AppError::Forbidden(format!(
            "You do not have permission to perform this action as {}",
            user.role
        )))
    }
}
